//! Feature spec - the ordered schema a model was trained on.
//!
//! Rules for editing the built-in spec:
//! 1. Adding, removing or reordering a field bumps `FRAUD_SPEC_VERSION`.
//! 2. Changing any category code bumps `FRAUD_SPEC_VERSION` and requires
//!    retraining; old models are then refused at load time.

use crate::error::{EncodeError, SpecError};
use crate::types::input::RawInput;
use anyhow::{Context, Result};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Version of the built-in fraud feature layout
pub const FRAUD_SPEC_VERSION: u32 = 1;

/// One label-to-code entry of a categorical table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCode {
    pub label: String,
    pub code: u32,
}

/// How a field's raw value is coerced into a number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Numeric,
    Categorical { codes: Vec<CategoryCode> },
    BoundedNumeric { min: f64, max: f64 },
}

/// A single model input field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn numeric(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Numeric,
        }
    }

    pub fn bounded(name: &str, label: &str, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::BoundedNumeric { min, max },
        }
    }

    /// Categorical field with codes in the given order.
    pub fn categorical(name: &str, label: &str, codes: &[(&str, u32)]) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Categorical {
                codes: codes
                    .iter()
                    .map(|&(label, code)| CategoryCode {
                        label: label.to_string(),
                        code,
                    })
                    .collect(),
            },
        }
    }

    /// Code for a categorical label; `None` for unknown labels or non-categorical fields.
    pub fn code_for(&self, label: &str) -> Option<u32> {
        match &self.kind {
            FieldKind::Categorical { codes } => codes
                .iter()
                .find(|entry| entry.label == label)
                .map(|entry| entry.code),
            _ => None,
        }
    }

    /// Selectable labels, in display order.
    pub fn options(&self) -> Vec<&str> {
        match &self.kind {
            FieldKind::Categorical { codes } => codes.iter().map(|c| c.label.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Ordered, versioned schema of model inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub version: u32,
    pub fields: Vec<FieldDescriptor>,
}

impl FeatureSpec {
    /// The twelve-field transaction layout the fraud classifier is trained on.
    ///
    /// The category codes must be the ones the model's training data was
    /// encoded with. `Online` is 3 here because sharing 2 with
    /// `ATM Withdrawal` would make the two indistinguishable; a model trained
    /// on another mapping must ship its own spec file (`features.spec_path`)
    /// with a new version rather than rely on this table.
    ///
    /// Display labels are English. They only feed prompts and `spec` output
    /// and are not part of [`FeatureSpec::layout_hash`], so a localized spec
    /// file (e.g. Spanish labels) stays compatible with the same model.
    pub fn fraud_default() -> Self {
        Self {
            version: FRAUD_SPEC_VERSION,
            fields: vec![
                FieldDescriptor::numeric("Transaction_Amount", "Transaction amount"),
                FieldDescriptor::categorical(
                    "Transaction_Type_n",
                    "Transaction type",
                    &[
                        ("POS", 0),
                        ("Bank Transfer", 1),
                        ("ATM Withdrawal", 2),
                        ("Online", 3),
                    ],
                ),
                FieldDescriptor::numeric("Account_Balance", "Account balance"),
                FieldDescriptor::categorical(
                    "Device_Type_n",
                    "Device type",
                    &[("Mobile", 0), ("Tablet", 1), ("Laptop", 2)],
                ),
                FieldDescriptor::categorical(
                    "Merchant_Category_n",
                    "Merchant category",
                    &[
                        ("Restaurants", 0),
                        ("Electronics", 1),
                        ("Clothing", 2),
                        ("Travel", 3),
                        ("Groceries", 4),
                    ],
                ),
                FieldDescriptor::numeric(
                    "Previous_Fraudulent_Activity",
                    "Previous fraudulent activity",
                ),
                FieldDescriptor::numeric(
                    "Avg_Transaction_Amount_7d",
                    "Average transaction amount (7 days)",
                ),
                FieldDescriptor::numeric(
                    "Failed_Transaction_Count_7d",
                    "Failed transactions (7 days)",
                ),
                FieldDescriptor::categorical(
                    "Card_Type_n",
                    "Card type",
                    &[("Amex", 0), ("Mastercard", 1), ("Visa", 2), ("Discover", 3)],
                ),
                FieldDescriptor::bounded(
                    "Transaction_Distance",
                    "Transaction distance",
                    0.0,
                    5000.0,
                ),
                FieldDescriptor::categorical(
                    "Authentication_Method_n",
                    "Authentication method",
                    &[("OTP", 0), ("PIN", 1), ("Biometric", 2), ("Password", 3)],
                ),
                FieldDescriptor::numeric("Risk_Score", "Risk score"),
            ],
        }
    }

    /// Load a spec from a JSON file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read feature spec {}", path.display()))?;
        let spec: FeatureSpec = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse feature spec {}", path.display()))?;
        spec.validate()
            .with_context(|| format!("Invalid feature spec {}", path.display()))?;
        Ok(spec)
    }

    /// Check the structural invariants of the spec.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.fields.is_empty() {
            return Err(SpecError::Empty);
        }

        let mut names = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(SpecError::DuplicateField(field.name.clone()));
            }

            match &field.kind {
                FieldKind::Numeric => {}
                FieldKind::Categorical { codes } => {
                    if codes.is_empty() {
                        return Err(SpecError::EmptyCodeTable(field.name.clone()));
                    }
                    let mut seen = HashSet::new();
                    for entry in codes {
                        if !seen.insert(entry.code) {
                            return Err(SpecError::DuplicateCode {
                                field: field.name.clone(),
                                code: entry.code,
                            });
                        }
                    }
                }
                FieldKind::BoundedNumeric { min, max } => {
                    if !min.is_finite() || !max.is_finite() || min > max {
                        return Err(SpecError::InvalidRange {
                            field: field.name.clone(),
                            min: *min,
                            max: *max,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// CRC32 over the version and the ordered field names.
    pub fn layout_hash(&self) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(&self.version.to_le_bytes());
        for field in &self.fields {
            hasher.update(field.name.as_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize()
    }

    /// Reject parseable bounded values that fall outside their range.
    ///
    /// This is the input-collection check; the encoder itself only clamps.
    /// Unparseable or missing values are left for the encoder to report.
    pub fn check_bounds(&self, input: &RawInput) -> Result<(), EncodeError> {
        for field in &self.fields {
            if let FieldKind::BoundedNumeric { min, max } = field.kind {
                let Some(value) = input.get(&field.name).and_then(|v| v.as_number()) else {
                    continue;
                };
                if value < min || value > max {
                    return Err(EncodeError::OutOfRange {
                        field: field.name.clone(),
                        value,
                        min,
                        max,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for FeatureSpec {
    fn default() -> Self {
        Self::fraud_default()
    }
}
