//! Inference engine: one feature spec plus one model, shared read-only.

use crate::config::AppConfig;
use crate::error::{EncodeError, ModelError, PredictError, ScoringError};
use crate::features::{encode, Encoded, FeatureSpec, FeatureVector, ParseWarning};
use crate::models::classifier::{self, Classifier};
use crate::models::loader::ModelLoader;
use crate::types::input::RawInput;
use crate::types::prediction::Prediction;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Result of scoring one raw input
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub prediction: Prediction,
    /// Numeric fields that were defaulted during encoding
    pub warnings: Vec<ParseWarning>,
}

/// Encoder and model loaded once at startup and shared by every request.
#[derive(Clone)]
pub struct InferenceEngine {
    spec: Arc<FeatureSpec>,
    model: Arc<dyn Classifier>,
}

impl InferenceEngine {
    /// Resolve the feature spec and load the model named in the configuration.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let spec = match &config.features.spec_path {
            Some(path) => FeatureSpec::load(path)?,
            None => FeatureSpec::fraud_default(),
        };
        spec.validate().context("Feature spec is invalid")?;

        info!(
            spec_version = spec.version,
            layout_hash = format!("{:#010x}", spec.layout_hash()),
            features = spec.len(),
            "Feature spec resolved"
        );

        let loader = ModelLoader::with_threads(config.model.onnx_threads);
        let model = loader
            .load(&config.model.path, &config.model.manifest_path, &spec)
            .with_context(|| format!("Failed to load model from {}", config.model.path))?;

        let engine = Self::from_parts(Arc::new(spec), Arc::new(model))?;

        info!(
            model = %engine.model_name(),
            input_dim = engine.model.input_dim(),
            "Inference engine initialized"
        );

        Ok(engine)
    }

    /// Build an engine around an already-loaded classifier.
    pub fn from_parts(
        spec: Arc<FeatureSpec>,
        model: Arc<dyn Classifier>,
    ) -> Result<Self, ModelError> {
        if model.input_dim() != spec.len() {
            return Err(ModelError::DimensionMismatch {
                expected: model.input_dim(),
                actual: spec.len(),
            });
        }
        Ok(Self { spec, model })
    }

    pub fn spec(&self) -> &FeatureSpec {
        &self.spec
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn encode(&self, input: &RawInput) -> Result<Encoded, EncodeError> {
        encode(input, &self.spec)
    }

    pub fn predict(&self, vector: &FeatureVector) -> Result<Prediction, PredictError> {
        classifier::predict(vector, self.model.as_ref())
    }

    /// Bounds check, encode, then predict.
    pub fn score(&self, input: &RawInput) -> Result<Scored, ScoringError> {
        self.spec.check_bounds(input)?;
        let Encoded { vector, warnings } = self.encode(input)?;
        let prediction = self.predict(&vector)?;
        Ok(Scored {
            prediction,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::classifier::testing::AmountClassifier;
    use crate::types::prediction::FraudLabel;

    fn engine() -> InferenceEngine {
        InferenceEngine::from_parts(
            Arc::new(FeatureSpec::fraud_default()),
            Arc::new(AmountClassifier::new(12)),
        )
        .unwrap()
    }

    fn reference_input() -> RawInput {
        RawInput::new()
            .with("Transaction_Amount", "500")
            .with("Transaction_Type_n", "POS")
            .with("Account_Balance", "10000")
            .with("Device_Type_n", "Mobile")
            .with("Merchant_Category_n", "Electronics")
            .with("Previous_Fraudulent_Activity", "0")
            .with("Avg_Transaction_Amount_7d", "450")
            .with("Failed_Transaction_Count_7d", "1")
            .with("Card_Type_n", "Visa")
            .with("Transaction_Distance", "5")
            .with("Authentication_Method_n", "PIN")
            .with("Risk_Score", "0")
    }

    #[test]
    fn test_end_to_end_reference_transaction() {
        let engine = engine();
        let input = reference_input();

        let encoded = engine.encode(&input).unwrap();
        assert_eq!(
            encoded.vector.as_slice(),
            &[500.0, 0.0, 10000.0, 0.0, 1.0, 0.0, 450.0, 1.0, 2.0, 5.0, 1.0, 0.0]
        );

        let scored = engine.score(&input).unwrap();
        assert!(matches!(
            scored.prediction.label,
            FraudLabel::Fraud | FraudLabel::Legitimate
        ));
        assert!((0.0..=1.0).contains(&scored.prediction.score));
        assert!(scored.warnings.is_empty());
    }

    #[test]
    fn test_score_carries_warnings() {
        let input = reference_input().with("Transaction_Amount", "abc");
        let scored = engine().score(&input).unwrap();

        assert_eq!(scored.warnings.len(), 1);
        assert_eq!(scored.warnings[0].field, "Transaction_Amount");
        assert_eq!(scored.prediction.score, 0.0);
    }

    #[test]
    fn test_score_rejects_out_of_range_distance() {
        let input = reference_input().with("Transaction_Distance", "6000");
        let err = engine().score(&input).unwrap_err();

        assert_eq!(err.kind(), "out_of_range");
    }

    #[test]
    fn test_score_rejects_unknown_category() {
        let input = reference_input().with("Transaction_Type_n", "Crypto");
        let err = engine().score(&input).unwrap_err();

        assert!(matches!(
            err,
            ScoringError::Encode(EncodeError::UnknownCategory { .. })
        ));
    }

    #[test]
    fn test_from_parts_rejects_dimension_skew() {
        let result = InferenceEngine::from_parts(
            Arc::new(FeatureSpec::fraud_default()),
            Arc::new(AmountClassifier::new(11)),
        );

        assert!(matches!(
            result,
            Err(ModelError::DimensionMismatch {
                expected: 11,
                actual: 12
            })
        ));
    }

    #[test]
    fn test_engine_is_shareable_across_threads() {
        let engine = Arc::new(engine());
        let input = reference_input();
        let expected = engine.score(&input).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                let input = input.clone();
                std::thread::spawn(move || engine.score(&input).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }
}
