//! Evaluation CLI Tool
//!
//! Loads a model artifact, classifies the held-out split of a dataset and writes
//! the requested report artifacts.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use dog_core::{setup_cli_logging, TrainingHistory};
use dog_dataset::{DatasetScanner, DogDiseaseDataset, ImageNormalizer};
use dog_inference::load_model;
use dog_training::backend::{default_device, DefaultBackend};
use dog_training::{EvaluationReporter, ModelArtifact, ReportOptions};
use indicatif::ProgressBar;
use tracing::info;

/// Dog Disease Model Evaluation Tool
#[derive(Parser, Debug)]
#[command(name = "dog-evaluate", version, about = "Evaluate a trained dog disease model")]
struct Args {
    /// Directory holding the model artifact
    #[arg(short, long, value_name = "DIR", default_value = "output")]
    artifact_dir: PathBuf,

    /// Base name of the model artifact
    #[arg(short, long, default_value = "dog_disease_model")]
    model_name: String,

    /// Dataset directory (one sub-directory per class)
    #[arg(short, long, value_name = "DIR", default_value = "data/dog_disease_dataset")]
    data_dir: PathBuf,

    /// Fraction of each class held out; must match training
    #[arg(long, default_value = "0.2")]
    validation_split: f64,

    /// Evaluate every image instead of the held-out split
    #[arg(long)]
    all: bool,

    /// Training history JSON to include in the report
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,

    /// Where to write report artifacts
    #[arg(short, long, value_name = "DIR", default_value = "output/evaluation")]
    output: PathBuf,

    /// Batch size for inference
    #[arg(short, long, default_value = "32")]
    batch_size: usize,

    /// Skip the confusion-matrix CSV
    #[arg(long)]
    no_csv: bool,

    /// Skip the JSON report
    #[arg(long)]
    no_json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_cli_logging(args.verbose)?;

    let artifact = ModelArtifact::new(&args.artifact_dir, &args.model_name);
    let model = load_model::<DefaultBackend>(&artifact, &default_device())
        .context("failed to load model artifact")?;

    let scanned = DatasetScanner::new(&args.data_dir, args.validation_split)
        .scan()
        .context("failed to scan dataset")?;
    if scanned.labels != *model.labels() {
        bail!(
            "dataset classes {:?} do not match the model's classes {:?}",
            scanned.labels.names(),
            model.labels().names()
        );
    }

    let mut samples = scanned.validation.clone();
    if args.all {
        samples.extend(scanned.train.iter().cloned());
    }
    info!("Evaluating {} images", samples.len());

    let normalizer = ImageNormalizer::new(model.classifier().input_dims());
    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message("loading images");
    let dataset = DogDiseaseDataset::load(&samples, &normalizer)?;

    let history = args
        .history
        .as_deref()
        .map(TrainingHistory::load_json)
        .transpose()?;

    spinner.set_message("classifying");
    let report = EvaluationReporter::new(model.labels().clone()).report_model(
        model.classifier(),
        dataset.items(),
        args.batch_size,
        history.as_ref(),
    )?;
    spinner.finish_and_clear();

    let options = ReportOptions {
        confusion_matrix_csv: !args.no_csv,
        json: !args.no_json,
        ..ReportOptions::default()
    };
    let written = report.write_artifacts(&args.output, &options)?;

    println!("{}", "Classification report".green().bold());
    println!("{}", report.render_text());
    for path in written {
        println!("  {} {}", "wrote".cyan(), path.display());
    }
    Ok(())
}
