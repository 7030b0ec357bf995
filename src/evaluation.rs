//! Offline model evaluation against a labeled, already-encoded dataset.

use crate::error::{EncodeError, PredictError};
use crate::features::{FeatureSpec, FeatureVector, FieldKind};
use crate::models::inference::InferenceEngine;
use crate::types::input::parse_feature_number;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Default name of the ground-truth column
pub const DEFAULT_LABEL_COLUMN: &str = "Fraud_Label";

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("failed to read dataset {path}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("dataset is missing column `{0}`")]
    MissingColumn(String),
    #[error("row {row}: field `{field}` is not a finite number")]
    InvalidRow { row: usize, field: String },
    #[error("row {row}: label must be 0 or 1")]
    InvalidLabel { row: usize },
    #[error("row {row}: {source}")]
    Encode {
        row: usize,
        #[source]
        source: EncodeError,
    },
    #[error("row {row}: {source}")]
    Predict {
        row: usize,
        #[source]
        source: PredictError,
    },
    #[error("dataset has no rows")]
    Empty,
}

/// Encoded feature rows with their ground-truth labels
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDataset {
    pub rows: Vec<FeatureVector>,
    /// `true` means fraud
    pub labels: Vec<bool>,
}

impl LabeledDataset {
    /// Read a CSV whose header contains every spec field plus `label_column`.
    ///
    /// Categorical columns hold integer codes, which must exist in the
    /// field's table.
    pub fn from_csv<P: AsRef<Path>>(
        path: P,
        spec: &FeatureSpec,
        label_column: &str,
    ) -> Result<Self, EvaluationError> {
        let path = path.as_ref();
        let csv_err = |source| EvaluationError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
        let headers = reader.headers().map_err(csv_err)?.clone();

        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| EvaluationError::MissingColumn(name.to_string()))
        };
        let feature_columns = spec
            .fields
            .iter()
            .map(|f| column(&f.name))
            .collect::<Result<Vec<_>, _>>()?;
        let label_idx = column(label_column)?;

        let mut rows = Vec::new();
        let mut labels = Vec::new();

        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            let row = idx + 1;

            let mut values = Vec::with_capacity(spec.len());
            for (field, &col) in spec.fields.iter().zip(&feature_columns) {
                let cell = record.get(col).unwrap_or("").trim();
                let value = parse_feature_number(cell).ok_or_else(|| EvaluationError::InvalidRow {
                    row,
                    field: field.name.clone(),
                })?;

                if let FieldKind::Categorical { codes } = &field.kind {
                    if !codes.iter().any(|c| c.code as f64 == value) {
                        return Err(EvaluationError::Encode {
                            row,
                            source: EncodeError::UnknownCategory {
                                field: field.name.clone(),
                                label: cell.to_string(),
                            },
                        });
                    }
                }
                values.push(value as f32);
            }

            let label = match record.get(label_idx).map(str::trim) {
                Some("1") | Some("1.0") => true,
                Some("0") | Some("0.0") => false,
                _ => return Err(EvaluationError::InvalidLabel { row }),
            };

            rows.push(FeatureVector::from(values));
            labels.push(label);
        }

        Ok(Self { rows, labels })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Binary confusion matrix, fraud as the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_negative: u64,
    pub false_positive: u64,
    pub false_negative: u64,
    pub true_positive: u64,
}

impl ConfusionMatrix {
    pub fn from_predictions(actual: &[bool], predicted: &[bool]) -> Self {
        let mut matrix = Self::default();
        for (&a, &p) in actual.iter().zip(predicted) {
            match (a, p) {
                (false, false) => matrix.true_negative += 1,
                (false, true) => matrix.false_positive += 1,
                (true, false) => matrix.false_negative += 1,
                (true, true) => matrix.true_positive += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> u64 {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_negative + self.true_positive, self.total())
    }
}

/// Precision, recall and F1 for one class
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

impl ClassMetrics {
    fn new(true_pos: u64, false_pos: u64, false_neg: u64) -> Self {
        let precision = ratio(true_pos, true_pos + false_pos);
        let recall = ratio(true_pos, true_pos + false_neg);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
            support: true_pos + false_neg,
        }
    }
}

/// Per-class report with macro and support-weighted averages
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub legitimate: ClassMetrics,
    pub fraud: ClassMetrics,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn from_confusion(m: &ConfusionMatrix) -> Self {
        let legitimate = ClassMetrics::new(m.true_negative, m.false_negative, m.false_positive);
        let fraud = ClassMetrics::new(m.true_positive, m.false_positive, m.false_negative);
        let total = m.total();

        let average = |f: fn(&ClassMetrics) -> f64| (f(&legitimate) + f(&fraud)) / 2.0;
        let weighted = |f: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                (f(&legitimate) * legitimate.support as f64 + f(&fraud) * fraud.support as f64)
                    / total as f64
            }
        };

        Self {
            legitimate,
            fraud,
            macro_avg: ClassMetrics {
                precision: average(|c| c.precision),
                recall: average(|c| c.recall),
                f1: average(|c| c.f1),
                support: total,
            },
            weighted_avg: ClassMetrics {
                precision: weighted(|c| c.precision),
                recall: weighted(|c| c.recall),
                f1: weighted(|c| c.f1),
                support: total,
            },
        }
    }
}

/// Everything the "evaluate model" action reports
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.confusion;
        writeln!(f, "Accuracy: {:.2}%", self.accuracy * 100.0)?;
        writeln!(f)?;
        writeln!(f, "Confusion matrix (rows = actual, columns = predicted)")?;
        writeln!(f, "{:>12} {:>10} {:>10}", "", "legitimate", "fraud")?;
        writeln!(f, "{:>12} {:>10} {:>10}", "legitimate", c.true_negative, c.false_positive)?;
        writeln!(f, "{:>12} {:>10} {:>10}", "fraud", c.false_negative, c.true_positive)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        let rows = [
            ("legitimate", &self.report.legitimate),
            ("fraud", &self.report.fraud),
            ("macro avg", &self.report.macro_avg),
            ("weighted avg", &self.report.weighted_avg),
        ];
        for (name, m) in rows {
            writeln!(
                f,
                "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        Ok(())
    }
}

/// Predict every row and compare against the labels.
pub fn evaluate(
    engine: &InferenceEngine,
    dataset: &LabeledDataset,
) -> Result<EvaluationReport, EvaluationError> {
    if dataset.is_empty() {
        return Err(EvaluationError::Empty);
    }

    let predicted = dataset
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            engine
                .predict(row)
                .map(|p| p.label.is_fraud())
                .map_err(|source| EvaluationError::Predict {
                    row: idx + 1,
                    source,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let confusion = ConfusionMatrix::from_predictions(&dataset.labels, &predicted);
    let report = EvaluationReport {
        accuracy: confusion.accuracy(),
        confusion,
        report: ClassificationReport::from_confusion(&confusion),
    };

    info!(
        model = %engine.model_name(),
        rows = dataset.len(),
        accuracy = report.accuracy,
        "Evaluation complete"
    );

    Ok(report)
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::classifier::testing::AmountClassifier;
    use std::sync::Arc;

    const HEADER: &str = "Transaction_Amount,Transaction_Type_n,Account_Balance,Device_Type_n,Merchant_Category_n,Previous_Fraudulent_Activity,Avg_Transaction_Amount_7d,Failed_Transaction_Count_7d,Card_Type_n,Transaction_Distance,Authentication_Method_n,Risk_Score,Fraud_Label";

    fn write_csv(rows: &[&str]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut body = String::from(HEADER);
        for row in rows {
            body.push('\n');
            body.push_str(row);
        }
        std::fs::write(file.path(), body).unwrap();
        file
    }

    fn engine() -> InferenceEngine {
        InferenceEngine::from_parts(
            Arc::new(FeatureSpec::fraud_default()),
            Arc::new(AmountClassifier::new(12)),
        )
        .unwrap()
    }

    #[test]
    fn test_confusion_and_report() {
        let actual = [true, true, true, false, false, false, false, false];
        let predicted = [true, true, false, true, false, false, false, false];

        let m = ConfusionMatrix::from_predictions(&actual, &predicted);
        assert_eq!(
            m,
            ConfusionMatrix {
                true_negative: 4,
                false_positive: 1,
                false_negative: 1,
                true_positive: 2,
            }
        );
        assert!((m.accuracy() - 0.75).abs() < 1e-9);

        let report = ClassificationReport::from_confusion(&m);
        assert!((report.fraud.precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((report.fraud.recall - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.fraud.support, 3);
        assert!((report.legitimate.precision - 0.8).abs() < 1e-9);
        assert!((report.legitimate.recall - 0.8).abs() < 1e-9);
        assert_eq!(report.legitimate.support, 5);
        assert!((report.macro_avg.f1 - (0.8 + 2.0 / 3.0) / 2.0).abs() < 1e-9);
        assert!((report.weighted_avg.recall - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_zero_denominators() {
        let m = ConfusionMatrix::from_predictions(&[false, false], &[false, false]);
        let report = ClassificationReport::from_confusion(&m);

        assert_eq!(report.fraud.precision, 0.0);
        assert_eq!(report.fraud.recall, 0.0);
        assert_eq!(report.fraud.f1, 0.0);
        assert_eq!(report.legitimate.recall, 1.0);
    }

    #[test]
    fn test_dataset_and_evaluate() {
        let file = write_csv(&[
            "9000,3,100,0,1,1,50,4,2,900,0,0.9,1",
            "8000,2,200,1,3,0,60,3,1,500,1,0.8,1",
            "100,0,5000,0,0,0,120,0,2,3,1,0.1,0",
            "7000,0,9000,2,4,0,6500,0,0,2,2,0.2,0",
        ]);
        let spec = FeatureSpec::fraud_default();
        let dataset = LabeledDataset::from_csv(file.path(), &spec, DEFAULT_LABEL_COLUMN).unwrap();

        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.labels, vec![true, true, false, false]);
        assert_eq!(dataset.rows[0].as_slice()[0], 9000.0);

        let report = evaluate(&engine(), &dataset).unwrap();
        assert_eq!(report.confusion.true_positive, 2);
        assert_eq!(report.confusion.false_positive, 1);
        assert_eq!(report.confusion.true_negative, 1);
        assert!((report.accuracy - 0.75).abs() < 1e-9);

        let rendered = report.to_string();
        assert!(rendered.contains("Accuracy: 75.00%"));
        assert!(rendered.contains("weighted avg"));
    }

    #[test]
    fn test_dataset_rejects_unknown_code() {
        let file = write_csv(&["100,7,5000,0,0,0,120,0,2,3,1,0.1,0"]);
        let err =
            LabeledDataset::from_csv(file.path(), &FeatureSpec::fraud_default(), "Fraud_Label")
                .unwrap_err();

        match err {
            EvaluationError::Encode { row, source } => {
                assert_eq!(row, 1);
                assert_eq!(
                    source,
                    EncodeError::UnknownCategory {
                        field: "Transaction_Type_n".to_string(),
                        label: "7".to_string(),
                    }
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dataset_rejects_missing_column() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "Transaction_Amount,Fraud_Label\n1,0\n").unwrap();

        let err =
            LabeledDataset::from_csv(file.path(), &FeatureSpec::fraud_default(), "Fraud_Label")
                .unwrap_err();
        assert!(matches!(err, EvaluationError::MissingColumn(name) if name == "Transaction_Type_n"));
    }

    #[test]
    fn test_dataset_rejects_bad_cells() {
        let file = write_csv(&["abc,0,5000,0,0,0,120,0,2,3,1,0.1,0"]);
        let err =
            LabeledDataset::from_csv(file.path(), &FeatureSpec::fraud_default(), "Fraud_Label")
                .unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidRow { row: 1, .. }));

        let file = write_csv(&["1,0,5000,0,0,0,120,0,2,3,1,0.1,yes"]);
        let err =
            LabeledDataset::from_csv(file.path(), &FeatureSpec::fraud_default(), "Fraud_Label")
                .unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidLabel { row: 1 }));
    }

    #[test]
    fn test_dataset_rejects_non_finite_cells() {
        for cell in ["NaN", "inf", "-inf", "1e39"] {
            let row = format!("{cell},0,5000,0,0,0,120,0,2,3,1,0.1,0");
            let file = write_csv(&[row.as_str()]);
            let err =
                LabeledDataset::from_csv(file.path(), &FeatureSpec::fraud_default(), "Fraud_Label")
                    .unwrap_err();

            assert!(
                matches!(&err, EvaluationError::InvalidRow { row: 1, field } if field == "Transaction_Amount"),
                "{cell}: {err}"
            );
        }
    }

    #[test]
    fn test_empty_dataset() {
        let dataset = LabeledDataset {
            rows: vec![],
            labels: vec![],
        };
        assert!(matches!(
            evaluate(&engine(), &dataset),
            Err(EvaluationError::Empty)
        ));
    }
}
