//! Error taxonomy for encoding, prediction and model loading.
//!
//! Every request-scoped failure is a typed value returned to the caller.
//! Binaries wrap these in `anyhow` at the outer edge.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed cause produced by a classifier backend.
pub type ModelFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structural problems in a [`FeatureSpec`](crate::features::FeatureSpec).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpecError {
    #[error("feature spec has no fields")]
    Empty,
    #[error("duplicate field name `{0}`")]
    DuplicateField(String),
    #[error("categorical field `{0}` has an empty code table")]
    EmptyCodeTable(String),
    #[error("categorical field `{field}` assigns code {code} to more than one label")]
    DuplicateCode { field: String, code: u32 },
    #[error("bounded field `{field}` has an invalid range [{min}, {max}]")]
    InvalidRange { field: String, min: f64, max: f64 },
}

/// Failures while turning a raw input into a feature vector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("field `{field}` is missing from the input")]
    MissingField { field: String },
    #[error("unknown category `{label}` for field `{field}`")]
    UnknownCategory { field: String, label: String },
    #[error("field `{field}` value {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl EncodeError {
    pub fn kind(&self) -> &'static str {
        match self {
            EncodeError::MissingField { .. } => "missing_field",
            EncodeError::UnknownCategory { .. } => "unknown_category",
            EncodeError::OutOfRange { .. } => "out_of_range",
        }
    }
}

/// Failures while scoring a feature vector.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("feature vector has {actual} values, model expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("model `{model}` failed to score the input")]
    PredictionFailed {
        model: String,
        #[source]
        source: ModelFailure,
    },
}

impl PredictError {
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::DimensionMismatch { .. } => "dimension_mismatch",
            PredictError::PredictionFailed { .. } => "prediction_failed",
        }
    }
}

/// Failures while loading a model and checking it against a feature spec.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model manifest {path}")]
    ManifestIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse model manifest {path}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("model file {0} not found")]
    NotFound(PathBuf),
    #[error("failed to create ONNX session for {path}")]
    Session {
        path: PathBuf,
        #[source]
        source: ModelFailure,
    },
    #[error("model was trained on feature spec v{model}, active spec is v{spec}")]
    SpecVersionMismatch { model: u32, spec: u32 },
    #[error("model layout hash {model:#010x} does not match spec layout hash {spec:#010x}")]
    LayoutMismatch { model: u32, spec: u32 },
    #[error("model expects {expected} features, feature spec defines {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Umbrella error for the encode-then-predict path.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Predict(#[from] PredictError),
}

impl ScoringError {
    pub fn kind(&self) -> &'static str {
        match self {
            ScoringError::Encode(e) => e.kind(),
            ScoringError::Predict(e) => e.kind(),
        }
    }
}
