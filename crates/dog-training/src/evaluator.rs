//! Model evaluation and report artifacts.
//!
//! This module provides:
//! - Per-class precision, recall, F1 and support
//! - Confusion matrix (rows = true class, columns = predicted class)
//! - Accuracy with macro and weighted averages
//! - Optional artifacts: text report, confusion-matrix CSV, report JSON, history JSON/CSV

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use dog_core::{
    argmax, macro_average, weighted_average, ClassMetrics, Classifier, ConfusionMatrix, Error,
    HistoryCurves, LabelSet, Result, TrainingHistory,
};
use dog_dataset::DogDiseaseItem;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Precision/recall/F1 averaged over classes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

impl AveragedMetrics {
    fn macro_of(metrics: &[ClassMetrics]) -> Self {
        Self {
            precision: macro_average(metrics, |m| m.precision),
            recall: macro_average(metrics, |m| m.recall),
            f1_score: macro_average(metrics, |m| m.f1_score),
        }
    }

    fn weighted_of(metrics: &[ClassMetrics]) -> Self {
        Self {
            precision: weighted_average(metrics, |m| m.precision),
            recall: weighted_average(metrics, |m| m.recall),
            f1_score: weighted_average(metrics, |m| m.f1_score),
        }
    }
}

/// Per-class row of the report, carrying the class name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub label: String,
    #[serde(flatten)]
    pub metrics: ClassMetrics,
}

/// Everything known about a model's performance on a held-out split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub per_class: Vec<ClassReport>,
    pub accuracy: f64,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
    pub confusion_matrix: ConfusionMatrix,
    pub total_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<TrainingHistory>,
}

/// Which artifacts [`EvaluationReport::write_artifacts`] produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub classification_report: bool,
    pub confusion_matrix_csv: bool,
    pub json: bool,
    pub history_json: bool,
    pub history_csv: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            classification_report: true,
            confusion_matrix_csv: true,
            json: true,
            history_json: true,
            history_csv: true,
        }
    }
}

impl ReportOptions {
    pub fn none() -> Self {
        Self {
            classification_report: false,
            confusion_matrix_csv: false,
            json: false,
            history_json: false,
            history_csv: false,
        }
    }
}

pub const CLASSIFICATION_REPORT_FILE: &str = "classification_report.txt";
pub const CONFUSION_MATRIX_FILE: &str = "confusion_matrix.csv";
pub const REPORT_JSON_FILE: &str = "evaluation_report.json";
pub const HISTORY_JSON_FILE: &str = "training_history.json";
pub const HISTORY_CSV_FILE: &str = "training_history.csv";

/// Builds [`EvaluationReport`]s for one label set
#[derive(Debug, Clone)]
pub struct EvaluationReporter {
    labels: LabelSet,
}

impl EvaluationReporter {
    pub fn new(labels: LabelSet) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Build a report from one probability vector per sample.
    pub fn report(
        &self,
        probabilities: &[Vec<f32>],
        targets: &[usize],
        history: Option<&TrainingHistory>,
    ) -> Result<EvaluationReport> {
        if probabilities.len() != targets.len() {
            return Err(Error::InvalidArgument(format!(
                "{} probability rows for {} targets",
                probabilities.len(),
                targets.len()
            )));
        }

        let num_classes = self.labels.count();
        let predictions = probabilities
            .iter()
            .map(|probs| {
                self.labels.ensure_matches_outputs(probs.len())?;
                argmax(probs)
                    .ok_or_else(|| Error::InvalidArgument("probability row has no maximum".into()))
            })
            .collect::<Result<Vec<_>>>()?;

        let confusion_matrix = ConfusionMatrix::from_predictions(&predictions, targets, num_classes)?;
        let class_metrics = confusion_matrix.class_metrics();

        let per_class = class_metrics
            .iter()
            .cloned()
            .zip(self.labels.names())
            .map(|(metrics, label)| ClassReport {
                label: label.clone(),
                metrics,
            })
            .collect();

        let report = EvaluationReport {
            per_class,
            accuracy: confusion_matrix.accuracy(),
            macro_avg: AveragedMetrics::macro_of(&class_metrics),
            weighted_avg: AveragedMetrics::weighted_of(&class_metrics),
            total_samples: confusion_matrix.total(),
            confusion_matrix,
            history: history.cloned(),
        };

        info!(
            "Evaluation complete: accuracy={:.4}, macro_f1={:.4}, weighted_f1={:.4}, samples={}",
            report.accuracy,
            report.macro_avg.f1_score,
            report.weighted_avg.f1_score,
            report.total_samples
        );
        Ok(report)
    }

    /// Run `classifier` over `items` in batches, then build the report.
    pub fn report_model(
        &self,
        classifier: &dyn Classifier,
        items: &[DogDiseaseItem],
        batch_size: usize,
        history: Option<&TrainingHistory>,
    ) -> Result<EvaluationReport> {
        if batch_size == 0 {
            return Err(Error::InvalidArgument("batch size must be positive".into()));
        }
        self.labels.ensure_matches_outputs(classifier.num_classes())?;

        info!("Evaluating {} samples", items.len());
        let mut probabilities = Vec::with_capacity(items.len());
        for chunk in items.chunks(batch_size) {
            let images: Vec<_> = chunk.iter().map(|item| item.image.clone()).collect();
            probabilities.extend(classifier.predict_batch(&images)?);
        }
        let targets: Vec<usize> = items.iter().map(|item| item.label).collect();

        self.report(&probabilities, &targets, history)
    }
}

impl EvaluationReport {
    pub fn curves(&self) -> Option<HistoryCurves> {
        self.history.as_ref().map(TrainingHistory::curves)
    }

    /// Text table in the layout of scikit-learn's `classification_report`.
    pub fn render_text(&self) -> String {
        let width = self
            .per_class
            .iter()
            .map(|c| c.label.len())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(12);

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}\n",
            "", "precision", "recall", "f1-score", "support"
        );
        for class in &self.per_class {
            let m = &class.metrics;
            let _ = writeln!(
                out,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                class.label, m.precision, m.recall, m.f1_score, m.support
            );
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.total_samples
        );
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            let _ = writeln!(
                out,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, avg.precision, avg.recall, avg.f1_score, self.total_samples
            );
        }
        out
    }

    /// Confusion matrix as CSV with class names on both axes.
    pub fn confusion_matrix_csv(&self) -> String {
        let names: Vec<&str> = self.per_class.iter().map(|c| c.label.as_str()).collect();
        let mut csv = format!("true\\predicted,{}\n", names.join(","));
        for (name, row) in names.iter().zip(self.confusion_matrix.rows()) {
            let cells: Vec<String> = row.iter().map(usize::to_string).collect();
            csv.push_str(&format!("{},{}\n", name, cells.join(",")));
        }
        csv
    }

    /// Write the selected artifacts into `dir` and return their paths.
    pub fn write_artifacts(&self, dir: &Path, options: &ReportOptions) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();

        if options.classification_report {
            let path = dir.join(CLASSIFICATION_REPORT_FILE);
            fs::write(&path, self.render_text())?;
            written.push(path);
        }
        if options.confusion_matrix_csv {
            let path = dir.join(CONFUSION_MATRIX_FILE);
            fs::write(&path, self.confusion_matrix_csv())?;
            written.push(path);
        }
        if options.json {
            let path = dir.join(REPORT_JSON_FILE);
            fs::write(&path, serde_json::to_string_pretty(self)?)?;
            written.push(path);
        }
        if let Some(history) = &self.history {
            if options.history_json {
                let path = dir.join(HISTORY_JSON_FILE);
                history.save_json(&path)?;
                written.push(path);
            }
            if options.history_csv {
                let path = dir.join(HISTORY_CSV_FILE);
                history.export_csv(&path)?;
                written.push(path);
            }
        }

        info!("Wrote {} evaluation artifact(s) to {:?}", written.len(), dir);
        Ok(written)
    }
}
