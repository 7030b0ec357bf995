//! Type definitions shared by the encoder, predictor and service

pub mod input;
pub mod prediction;

pub use input::{RawInput, RawValue};
pub use prediction::{FraudLabel, Prediction, ScoringRequest, ScoringResponse};
