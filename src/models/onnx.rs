//! ONNX Runtime backed classifier

use crate::error::ModelFailure;
use crate::models::classifier::{ClassOutput, Classifier};
use crate::models::loader::ModelManifest;
use ort::memory::Allocator;
use ort::session::Session;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Classifier exported to ONNX (e.g. a scikit-learn forest via skl2onnx).
///
/// Exports carry two outputs: the predicted label as an int64 tensor, and
/// class probabilities as either a `[1, n_classes]` float tensor or a
/// `seq(map(int64, float))` (ZipMap).
#[derive(Debug)]
pub struct OnnxClassifier {
    manifest: ModelManifest,
    /// Running a session needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    label_output: String,
    proba_output: String,
}

impl OnnxClassifier {
    pub fn new(
        manifest: ModelManifest,
        session: Session,
        input_name: String,
        label_output: String,
        proba_output: String,
    ) -> Self {
        Self {
            manifest,
            session: Mutex::new(session),
            input_name,
            label_output,
            proba_output,
        }
    }

    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    fn run(&self, row: &[f32]) -> Result<ClassOutput, ModelFailure> {
        // Prepare input tensor - shape [1, num_features]
        let shape = vec![1_i64, row.len() as i64];
        let input_tensor = Tensor::from_array((shape, row.to_vec()))?;

        let mut session = lock_recovering(&self.session);

        let outputs = session.run(ort::inputs![&self.input_name => input_tensor])?;

        let label_value = outputs
            .get(self.label_output.as_str())
            .ok_or_else(|| format!("missing output `{}`", self.label_output))?;
        let (_, labels) = label_value.try_extract_tensor::<i64>()?;
        let class = *labels.first().ok_or("empty label output")?;

        let proba_value = outputs
            .get(self.proba_output.as_str())
            .ok_or_else(|| format!("missing output `{}`", self.proba_output))?;
        let probabilities = extract_probabilities(proba_value)?;

        debug!(
            model = %self.manifest.name,
            class = class,
            probabilities = ?probabilities,
            "ONNX inference complete"
        );

        Ok(ClassOutput {
            class,
            probabilities,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn input_dim(&self) -> usize {
        self.manifest.input_dim
    }

    fn fraud_class(&self) -> i64 {
        self.manifest.fraud_class
    }

    fn predict_class(&self, row: &[f32]) -> Result<i64, ModelFailure> {
        Ok(self.run(row)?.class)
    }

    fn predict_proba(&self, row: &[f32]) -> Result<Vec<f64>, ModelFailure> {
        Ok(self.run(row)?.probabilities)
    }

    fn classify(&self, row: &[f32]) -> Result<ClassOutput, ModelFailure> {
        self.run(row)
    }
}

/// Per-class probabilities for the first (only) row of the batch.
fn extract_probabilities(output: &DynValue) -> Result<Vec<f64>, ModelFailure> {
    let dtype = output.dtype();

    if DynSequenceValueType::can_downcast(&dtype) {
        return extract_from_sequence_map(output);
    }

    let (shape, data) = output.try_extract_tensor::<f32>()?;
    let dims: Vec<i64> = shape.iter().copied().collect();
    let num_classes = match dims.as_slice() {
        [_batch, classes] => *classes as usize,
        [classes] => *classes as usize,
        _ => return Err(format!("unexpected probability shape {:?}", dims).into()),
    };

    if data.len() < num_classes {
        return Err("probability tensor shorter than its shape".into());
    }

    Ok(data[..num_classes].iter().map(|&p| p as f64).collect())
}

/// Probabilities from `seq(map(int64, float))`, ordered by class index.
fn extract_from_sequence_map(output: &DynValue) -> Result<Vec<f64>, ModelFailure> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| format!("Failed to downcast to sequence: {}", e))?;

    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
    let map_value = maps.first().ok_or("empty probability sequence")?;

    let mut kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;
    kv_pairs.sort_by_key(|(class_id, _)| *class_id);

    let mut probabilities = Vec::with_capacity(kv_pairs.len());
    for (idx, (class_id, prob)) in kv_pairs.into_iter().enumerate() {
        if class_id != idx as i64 {
            return Err(format!("non-contiguous class ids in probability map (found {})", class_id).into());
        }
        probabilities.push(prob as f64);
    }

    Ok(probabilities)
}

/// Lock the session even if an earlier run panicked while holding it.
/// A session keeps no per-request state, so a poisoned guard is still usable.
fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_lock_survives_panicked_holder() {
        let shared = Arc::new(Mutex::new(0_u32));

        let poisoner = shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("model blew up mid-run");
        })
        .join();
        assert!(shared.is_poisoned());

        *lock_recovering(&*shared) += 1;
        *lock_recovering(&*shared) += 1;
        assert_eq!(*lock_recovering(&*shared), 2);
    }
}
