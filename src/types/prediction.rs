//! Prediction results and the service wire format

use crate::features::ParseWarning;
use crate::types::input::RawInput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary outcome of a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FraudLabel {
    Fraud,
    Legitimate,
}

impl FraudLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FraudLabel::Fraud => "fraud",
            FraudLabel::Legitimate => "legitimate",
        }
    }

    pub fn is_fraud(&self) -> bool {
        matches!(self, FraudLabel::Fraud)
    }
}

impl fmt::Display for FraudLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label plus the probability mass the model assigns to the fraud class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: FraudLabel,
    /// Fraud-class probability (0.0 - 1.0)
    pub score: f64,
}

/// Scoring request received by the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRequest {
    /// Caller-chosen identifier; generated when absent
    #[serde(default = "new_request_id")]
    pub request_id: String,
    pub fields: RawInput,
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Failure details carried back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub kind: String,
    pub message: String,
}

/// Scoring response published by the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringResponse {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Prediction>,
    #[serde(default)]
    pub warnings: Vec<ParseWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    pub processed_at: DateTime<Utc>,
}

impl ScoringResponse {
    pub fn success(request_id: String, prediction: Prediction, warnings: Vec<ParseWarning>) -> Self {
        Self {
            request_id,
            prediction: Some(prediction),
            warnings,
            error: None,
            processed_at: Utc::now(),
        }
    }

    pub fn failure(request_id: String, kind: &str, message: String) -> Self {
        Self {
            request_id,
            prediction: None,
            warnings: Vec::new(),
            error: Some(ResponseError {
                kind: kind.to_string(),
                message,
            }),
            processed_at: Utc::now(),
        }
    }
}
