//! ONNX model loader and model manifest checks

use crate::error::{ModelError, ModelFailure};
use crate::features::FeatureSpec;
use crate::models::onnx::OnnxClassifier;
use ort::session::{builder::GraphOptimizationLevel, Session};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Sidecar describing what a serialized model was trained on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Model name used in logs and errors
    pub name: String,
    /// Feature spec version used for training
    pub feature_spec_version: u32,
    /// Layout hash of that spec, if recorded at export time
    #[serde(default)]
    pub layout_hash: Option<u32>,
    /// Number of input features
    pub input_dim: usize,
    /// Class index meaning "fraud"
    #[serde(default = "default_fraud_class")]
    pub fraud_class: i64,
}

fn default_fraud_class() -> i64 {
    1
}

impl ModelManifest {
    /// Manifest matching a spec, as written by the export step.
    pub fn for_spec(name: &str, spec: &FeatureSpec) -> Self {
        Self {
            name: name.to_string(),
            feature_spec_version: spec.version,
            layout_hash: Some(spec.layout_hash()),
            input_dim: spec.len(),
            fraud_class: default_fraud_class(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ModelError::ManifestIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ModelError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Refuse models trained against a different feature layout.
    pub fn check(&self, spec: &FeatureSpec) -> Result<(), ModelError> {
        if self.feature_spec_version != spec.version {
            return Err(ModelError::SpecVersionMismatch {
                model: self.feature_spec_version,
                spec: spec.version,
            });
        }

        if let Some(hash) = self.layout_hash {
            let spec_hash = spec.layout_hash();
            if hash != spec_hash {
                return Err(ModelError::LayoutMismatch {
                    model: hash,
                    spec: spec_hash,
                });
            }
        }

        if self.input_dim != spec.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.input_dim,
                actual: spec.len(),
            });
        }

        Ok(())
    }
}

/// Loader for ONNX classifiers
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load a model and its manifest, checking both against `spec`.
    pub fn load<P: AsRef<Path>, M: AsRef<Path>>(
        &self,
        model_path: P,
        manifest_path: M,
        spec: &FeatureSpec,
    ) -> Result<OnnxClassifier, ModelError> {
        let model_path = model_path.as_ref();

        let manifest = ModelManifest::load(manifest_path)?;
        manifest.check(spec)?;

        if !model_path.exists() {
            return Err(ModelError::NotFound(model_path.to_path_buf()));
        }

        info!(
            model = %manifest.name,
            path = %model_path.display(),
            threads = self.onnx_threads,
            spec_version = manifest.feature_spec_version,
            "Loading ONNX model"
        );

        let session = self
            .build_session(model_path)
            .map_err(|source| ModelError::Session {
                path: model_path.to_path_buf(),
                source,
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let label_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("label"))
            .or_else(|| session.outputs.first())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "output_label".to_string());

        let proba_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob") || (o.name.contains("output") && o.name != label_output))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "output_probability".to_string());

        info!(
            model = %manifest.name,
            input = %input_name,
            label_output = %label_output,
            proba_output = %proba_output,
            "Model loaded successfully"
        );

        Ok(OnnxClassifier::new(
            manifest,
            session,
            input_name,
            label_output,
            proba_output,
        ))
    }

    fn build_session(&self, path: &Path) -> Result<Session, ModelFailure> {
        Ok(Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)?)
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}
