//! Raw, user-supplied field values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single value as delivered by the form or API layer.
///
/// JSON strings become `Text`, JSON numbers become `Number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Interpret the value as a number that stays finite in an `f32` vector.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) => Some(*n).filter(|v| fits_feature(*v)),
            RawValue::Text(s) => parse_feature_number(s),
        }
    }

    /// Interpret the value as a categorical label.
    pub fn as_label(&self) -> String {
        match self {
            RawValue::Number(n) => n.to_string(),
            RawValue::Text(s) => s.trim().to_string(),
        }
    }
}

/// Parse text as a feature value; `None` unless it is finite once narrowed to `f32`.
pub fn parse_feature_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| fits_feature(*v))
}

fn fits_feature(value: f64) -> bool {
    (value as f32).is_finite()
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Number(n) => write!(f, "{}", n),
            RawValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

/// Mapping from field name to raw value for one prediction request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawInput(BTreeMap<String, RawValue>);

impl RawInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, field: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<RawValue>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&RawValue> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RawValue)> {
        self.0.iter()
    }

    /// Parse a `NAME=VALUE` assignment as given on the command line.
    ///
    /// The value is always kept as text; coercion happens in the encoder.
    pub fn parse_assignment(assignment: &str) -> Option<(String, RawValue)> {
        let (name, value) = assignment.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some((name.to_string(), RawValue::Text(value.to_string())))
    }
}

impl FromIterator<(String, RawValue)> for RawInput {
    fn from_iter<I: IntoIterator<Item = (String, RawValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_input_deserializes_mixed_values() {
        let input: RawInput =
            serde_json::from_str(r#"{"Transaction_Amount": 500, "Card_Type_n": "Visa"}"#).unwrap();

        assert_eq!(input.get("Transaction_Amount"), Some(&RawValue::Number(500.0)));
        assert_eq!(input.get("Card_Type_n"), Some(&RawValue::from("Visa")));
    }

    #[test]
    fn test_as_number() {
        assert_eq!(RawValue::from(" 12.5 ").as_number(), Some(12.5));
        assert_eq!(RawValue::from("abc").as_number(), None);
        assert_eq!(RawValue::from("NaN").as_number(), None);
        assert_eq!(RawValue::Number(f64::INFINITY).as_number(), None);
    }

    #[test]
    fn test_as_number_rejects_values_beyond_f32() {
        assert_eq!(RawValue::from("1e39").as_number(), None);
        assert_eq!(RawValue::Number(-1e39).as_number(), None);
        assert_eq!(parse_feature_number("3.4e38"), Some(3.4e38));
        assert_eq!(parse_feature_number(" inf "), None);
    }

    #[test]
    fn test_as_label() {
        assert_eq!(RawValue::from(" POS ").as_label(), "POS");
        assert_eq!(RawValue::Number(2.0).as_label(), "2");
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            RawInput::parse_assignment("Transaction_Type_n=Bank Transfer"),
            Some(("Transaction_Type_n".to_string(), RawValue::from("Bank Transfer")))
        );
        assert_eq!(RawInput::parse_assignment("no_equals"), None);
        assert_eq!(RawInput::parse_assignment("=5"), None);
    }
}
