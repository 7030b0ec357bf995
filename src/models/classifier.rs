//! Classifier interface and the single-row predictor

use crate::error::{ModelFailure, PredictError};
use crate::features::FeatureVector;
use crate::types::prediction::{FraudLabel, Prediction};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Class index plus per-class probabilities for one row
#[derive(Debug, Clone, PartialEq)]
pub struct ClassOutput {
    pub class: i64,
    /// Indexed by class index
    pub probabilities: Vec<f64>,
}

/// A pre-trained binary classifier, shared read-only across callers.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    /// Number of features the model was trained on
    fn input_dim(&self) -> usize;

    /// Class index that means "fraud"
    fn fraud_class(&self) -> i64 {
        1
    }

    fn predict_class(&self, row: &[f32]) -> Result<i64, ModelFailure>;

    fn predict_proba(&self, row: &[f32]) -> Result<Vec<f64>, ModelFailure>;

    /// Both outputs for one row. Backends that produce them in a single
    /// pass should override this.
    fn classify(&self, row: &[f32]) -> Result<ClassOutput, ModelFailure> {
        Ok(ClassOutput {
            class: self.predict_class(row)?,
            probabilities: self.predict_proba(row)?,
        })
    }
}

/// Score a feature vector against a model.
///
/// The model is never invoked when the vector length disagrees with
/// `input_dim`. Errors and panics raised by the model surface as
/// [`PredictError::PredictionFailed`].
pub fn predict(vector: &FeatureVector, model: &dyn Classifier) -> Result<Prediction, PredictError> {
    let expected = model.input_dim();
    if vector.len() != expected {
        return Err(PredictError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }

    let failed = |source: ModelFailure| PredictError::PredictionFailed {
        model: model.name().to_string(),
        source,
    };

    let output = panic::catch_unwind(AssertUnwindSafe(|| model.classify(vector.as_slice())))
        .unwrap_or_else(|payload| Err(panic_message(payload).into()))
        .map_err(failed)?;

    let score = usize::try_from(model.fraud_class())
        .ok()
        .and_then(|idx| output.probabilities.get(idx).copied())
        .ok_or_else(|| {
            failed(
                format!(
                    "no probability for fraud class {} ({} classes returned)",
                    model.fraud_class(),
                    output.probabilities.len()
                )
                .into(),
            )
        })?;

    if !(0.0..=1.0).contains(&score) {
        return Err(failed(format!("fraud probability {} outside [0, 1]", score).into()));
    }

    let label = if output.class == model.fraud_class() {
        FraudLabel::Fraud
    } else {
        FraudLabel::Legitimate
    };

    Ok(Prediction { label, score })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("model panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("model panicked: {}", msg)
    } else {
        "model panicked".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{AmountClassifier, BrokenClassifier};
    use super::*;
    use std::error::Error as _;

    fn vector(amount: f32) -> FeatureVector {
        let mut values = vec![0.0_f32; 12];
        values[0] = amount;
        FeatureVector::from(values)
    }

    #[test]
    fn test_predict_label_and_score() {
        let model = AmountClassifier::new(12);

        let high = predict(&vector(9000.0), &model).unwrap();
        assert_eq!(high.label, FraudLabel::Fraud);
        assert!((high.score - 0.9).abs() < 1e-6);

        let low = predict(&vector(500.0), &model).unwrap();
        assert_eq!(low.label, FraudLabel::Legitimate);
        assert!((0.0..=1.0).contains(&low.score));
    }

    #[test]
    fn test_dimension_mismatch_skips_model() {
        let model = AmountClassifier::new(12);
        let short = FeatureVector::from(vec![1.0_f32; 11]);

        let err = predict(&short, &model).unwrap_err();
        assert!(matches!(
            err,
            PredictError::DimensionMismatch {
                expected: 12,
                actual: 11
            }
        ));
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn test_predict_is_idempotent() {
        let model = AmountClassifier::new(12);
        let input = vector(4321.0);

        let first = predict(&input, &model).unwrap();
        let second = predict(&input, &model).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_model_error_is_wrapped() {
        let err = predict(&vector(1.0), &BrokenClassifier { panics: false }).unwrap_err();

        assert_eq!(err.kind(), "prediction_failed");
        assert_eq!(
            err.source().unwrap().to_string(),
            "incompatible dtype: expected float"
        );
    }

    #[test]
    fn test_model_panic_is_wrapped() {
        let err = predict(&vector(1.0), &BrokenClassifier { panics: true }).unwrap_err();

        match err {
            PredictError::PredictionFailed { model, source } => {
                assert_eq!(model, "broken");
                assert!(source.to_string().contains("tensor dtype mismatch"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    struct OneClassModel;

    impl Classifier for OneClassModel {
        fn name(&self) -> &str {
            "one_class"
        }
        fn input_dim(&self) -> usize {
            12
        }
        fn predict_class(&self, _row: &[f32]) -> Result<i64, ModelFailure> {
            Ok(0)
        }
        fn predict_proba(&self, _row: &[f32]) -> Result<Vec<f64>, ModelFailure> {
            Ok(vec![1.0])
        }
    }

    #[test]
    fn test_missing_fraud_probability() {
        let err = predict(&vector(1.0), &OneClassModel).unwrap_err();
        assert_eq!(err.kind(), "prediction_failed");
    }
}
