//! Feature encoding for fraud model inference.
//!
//! Turns a raw form submission into the fixed-order numeric vector
//! the classifier was trained on. Encoding is pure: recoverable problems
//! come back as [`ParseWarning`]s instead of being logged.

use crate::error::EncodeError;
use crate::features::spec::{FeatureSpec, FieldDescriptor, FieldKind};
use crate::types::input::{RawInput, RawValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Value substituted when a numeric field does not parse
pub const NUMERIC_DEFAULT: f64 = 0.0;

/// Ordered model input, one value per spec field
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// A numeric field that could not be parsed and was defaulted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub field: String,
    /// The offending raw value
    pub value: String,
    /// Value written into the vector instead
    pub substituted: f64,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field `{}`: `{}` is not a valid number, using {}",
            self.field, self.value, self.substituted
        )
    }
}

/// Output of a successful encode
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub vector: FeatureVector,
    pub warnings: Vec<ParseWarning>,
}

/// Encode `input` against `spec`, in spec order.
pub fn encode(input: &RawInput, spec: &FeatureSpec) -> Result<Encoded, EncodeError> {
    let mut values = Vec::with_capacity(spec.len());
    let mut warnings = Vec::new();

    for field in &spec.fields {
        let raw = input.get(&field.name).ok_or_else(|| EncodeError::MissingField {
            field: field.name.clone(),
        })?;

        let value = match &field.kind {
            FieldKind::Numeric => parse_numeric(field, raw, &mut warnings, |v| v),
            FieldKind::BoundedNumeric { min, max } => {
                let (min, max) = (*min, *max);
                parse_numeric(field, raw, &mut warnings, |v| v.max(min).min(max))
            }
            FieldKind::Categorical { .. } => {
                let label = raw.as_label();
                match field.code_for(&label) {
                    Some(code) => code as f64,
                    None => {
                        return Err(EncodeError::UnknownCategory {
                            field: field.name.clone(),
                            label,
                        })
                    }
                }
            }
        };

        values.push(value as f32);
    }

    Ok(Encoded {
        vector: FeatureVector(values),
        warnings,
    })
}

fn parse_numeric(
    field: &FieldDescriptor,
    raw: &RawValue,
    warnings: &mut Vec<ParseWarning>,
    adjust: impl Fn(f64) -> f64,
) -> f64 {
    match raw.as_number() {
        Some(v) => adjust(v),
        None => {
            let substituted = adjust(NUMERIC_DEFAULT);
            warnings.push(ParseWarning {
                field: field.name.clone(),
                value: raw.to_string(),
                substituted,
            });
            substituted
        }
    }
}

/// Encoder bound to one shared feature spec
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    spec: Arc<FeatureSpec>,
}

impl FeatureEncoder {
    pub fn new(spec: Arc<FeatureSpec>) -> Self {
        Self { spec }
    }

    pub fn encode(&self, input: &RawInput) -> Result<Encoded, EncodeError> {
        encode(input, &self.spec)
    }

    pub fn spec(&self) -> &FeatureSpec {
        &self.spec
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        self.spec.len()
    }
}

impl Default for FeatureEncoder {
    fn default() -> Self {
        Self::new(Arc::new(FeatureSpec::fraud_default()))
    }
}
