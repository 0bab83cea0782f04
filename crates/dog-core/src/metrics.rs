//! Metrics: per-epoch training records, confusion matrices and F1 scores.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{Error, Result};

/// Index of the largest value, first index on ties. NaN never wins.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Serde adapter for metrics that may be NaN.
///
/// JSON has no NaN, so non-finite values are written as `null` and `null` reads
/// back as NaN.
pub mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        value.is_finite().then_some(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }

    /// Same mapping applied element-wise to a series.
    pub mod vec {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
            values
                .iter()
                .map(|v| v.is_finite().then_some(*v))
                .collect::<Vec<_>>()
                .serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<f64>, D::Error> {
            Ok(Vec::<Option<f64>>::deserialize(deserializer)?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect())
        }
    }
}

/// Metrics recorded for one completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Zero-based epoch index
    pub epoch: usize,
    #[serde(with = "nan_as_null")]
    pub train_loss: f64,
    #[serde(with = "nan_as_null")]
    pub train_accuracy: f64,
    #[serde(with = "nan_as_null")]
    pub val_loss: f64,
    #[serde(with = "nan_as_null")]
    pub val_accuracy: f64,
    /// Support-weighted F1 over the validation split; NaN when it could not be computed
    #[serde(with = "nan_as_null")]
    pub weighted_f1: f64,
    /// Learning rate in effect while this epoch trained
    pub learning_rate: f64,
}

/// Ordered per-epoch history of a training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Epoch with the highest finite validation accuracy (earliest on ties).
    pub fn best_by_val_accuracy(&self) -> Option<&EpochMetrics> {
        self.epochs
            .iter()
            .filter(|m| m.val_accuracy.is_finite())
            .fold(None, |best: Option<&EpochMetrics>, m| match best {
                Some(b) if m.val_accuracy <= b.val_accuracy => Some(b),
                _ => Some(m),
            })
    }

    pub fn curves(&self) -> HistoryCurves {
        HistoryCurves {
            train_loss: self.epochs.iter().map(|m| m.train_loss).collect(),
            val_loss: self.epochs.iter().map(|m| m.val_loss).collect(),
            train_accuracy: self.epochs.iter().map(|m| m.train_accuracy).collect(),
            val_accuracy: self.epochs.iter().map(|m| m.val_accuracy).collect(),
            weighted_f1: self.epochs.iter().map(|m| m.weighted_f1).collect(),
            learning_rate: self.epochs.iter().map(|m| m.learning_rate).collect(),
        }
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::NotFound(format!("history {}: {e}", path.display())))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn export_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut csv = String::from(
            "epoch,train_loss,train_accuracy,val_loss,val_accuracy,weighted_f1,learning_rate\n",
        );
        for m in &self.epochs {
            csv.push_str(&format!(
                "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:e}\n",
                m.epoch + 1,
                m.train_loss,
                m.train_accuracy,
                m.val_loss,
                m.val_accuracy,
                m.weighted_f1,
                m.learning_rate
            ));
        }

        fs::write(path, csv)?;
        Ok(())
    }
}

/// Column view of a history, one series per metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryCurves {
    #[serde(with = "nan_as_null::vec")]
    pub train_loss: Vec<f64>,
    #[serde(with = "nan_as_null::vec")]
    pub val_loss: Vec<f64>,
    #[serde(with = "nan_as_null::vec")]
    pub train_accuracy: Vec<f64>,
    #[serde(with = "nan_as_null::vec")]
    pub val_accuracy: Vec<f64>,
    #[serde(with = "nan_as_null::vec")]
    pub weighted_f1: Vec<f64>,
    pub learning_rate: Vec<f64>,
}

/// Square confusion matrix, rows = true class, columns = predicted class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            counts: vec![vec![0; num_classes]; num_classes],
        }
    }

    pub fn from_predictions(
        predictions: &[usize],
        targets: &[usize],
        num_classes: usize,
    ) -> Result<Self> {
        if predictions.len() != targets.len() {
            return Err(Error::InvalidArgument(format!(
                "{} predictions for {} targets",
                predictions.len(),
                targets.len()
            )));
        }

        let mut matrix = Self::new(num_classes);
        for (&pred, &target) in predictions.iter().zip(targets) {
            matrix.record(target, pred)?;
        }
        Ok(matrix)
    }

    pub fn record(&mut self, target: usize, prediction: usize) -> Result<()> {
        let n = self.num_classes();
        if target >= n || prediction >= n {
            return Err(Error::IndexOutOfRange {
                index: target.max(prediction),
                len: n,
            });
        }
        self.counts[target][prediction] += 1;
        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.counts.len()
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.counts
    }

    pub fn get(&self, target: usize, prediction: usize) -> usize {
        self.counts[target][prediction]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.num_classes()).map(|i| self.counts[i][i]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct() as f64 / total as f64
        }
    }

    /// Precision, recall, F1 and support per class.
    ///
    /// Undefined ratios (no predictions or no support) are reported as 0.
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        let n = self.num_classes();
        (0..n)
            .map(|class_id| {
                let tp = self.counts[class_id][class_id];
                let support: usize = self.counts[class_id].iter().sum();
                let predicted: usize = (0..n).map(|r| self.counts[r][class_id]).sum();

                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1_score = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };

                ClassMetrics {
                    class_id,
                    precision,
                    recall,
                    f1_score,
                    support,
                }
            })
            .collect()
    }

    /// F1 averaged over classes, weighted by support.
    pub fn weighted_f1(&self) -> f64 {
        weighted_average(&self.class_metrics(), |m| m.f1_score)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Support-weighted mean of a per-class quantity; 0 when there is no support.
pub fn weighted_average(metrics: &[ClassMetrics], value: impl Fn(&ClassMetrics) -> f64) -> f64 {
    let total: usize = metrics.iter().map(|m| m.support).sum();
    if total == 0 {
        return 0.0;
    }
    metrics
        .iter()
        .map(|m| value(m) * m.support as f64)
        .sum::<f64>()
        / total as f64
}

/// Unweighted mean of a per-class quantity.
pub fn macro_average(metrics: &[ClassMetrics], value: impl Fn(&ClassMetrics) -> f64) -> f64 {
    if metrics.is_empty() {
        return 0.0;
    }
    metrics.iter().map(value).sum::<f64>() / metrics.len() as f64
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_id: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Weighted F1 of argmax predictions against targets.
pub fn weighted_f1(predictions: &[usize], targets: &[usize], num_classes: usize) -> Result<f64> {
    Ok(ConfusionMatrix::from_predictions(predictions, targets, num_classes)?.weighted_f1())
}
