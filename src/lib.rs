//! Fraud Screening Library
//!
//! Encodes a twelve-field transaction form into the fixed-order feature
//! vector a pre-trained binary classifier expects, scores it, and reports
//! fraud or legitimate with the fraud-class probability.

pub mod config;
pub mod consumer;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod service;
pub mod types;

pub use config::AppConfig;
pub use error::{EncodeError, ModelError, PredictError, ScoringError};
pub use features::{encode, FeatureEncoder, FeatureSpec, FeatureVector, ParseWarning};
pub use models::classifier::{predict, Classifier};
pub use models::inference::InferenceEngine;
pub use types::{FraudLabel, Prediction, RawInput, RawValue};
