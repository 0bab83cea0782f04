//! Training CLI Tool
//!
//! Scans a class-per-directory dataset, trains the classifier with the epoch
//! controller and writes the best model artifact plus evaluation reports.

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::optim::AdamConfig;
use clap::Parser;
use colored::Colorize;
use dog_core::{load_toml_config, setup_cli_logging, TrainingConfig};
use dog_dataset::{
    compute_weights, AugmentationPipeline, ClassWeightTable, DatasetScanner, DogDiseaseDataset,
    ImageNormalizer,
};
use dog_training::backend::{backend_name, default_device, TrainingBackend};
use dog_training::{
    ArtifactWriter, BurnEngine, ControllerConfig, ControllerState, DogDiseaseClassifier,
    EngineOptions, EvaluationReporter, ModelArtifact, ModelSetup, NumericEngine, ReportOptions,
    TrainingController,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Dog Disease Classifier Training Tool
#[derive(Parser, Debug)]
#[command(
    name = "dog-train",
    version,
    about = "Train the dog skin and eye disease classifier",
    long_about = "Train the classifier on a directory with one sub-directory per class. \
                  The best model by validation accuracy is written as a model artifact."
)]
struct Args {
    /// Path to training configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override dataset directory
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Override output directory
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Override number of epochs
    #[arg(short, long, value_name = "N")]
    epochs: Option<usize>,

    /// Override batch size
    #[arg(short, long, value_name = "N")]
    batch_size: Option<usize>,

    /// Override initial learning rate
    #[arg(long, value_name = "LR")]
    learning_rate: Option<f64>,

    /// Override random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Disable training-time augmentation
    #[arg(long)]
    no_augmentation: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn training_config(&self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => load_toml_config::<TrainingConfig>(path)?,
            None => TrainingConfig::default(),
        };

        if let Some(dir) = &self.data_dir {
            config.data.data_dir = dir.clone();
        }
        if let Some(dir) = &self.output {
            config.output.output_dir = dir.clone();
        }
        if let Some(epochs) = self.epochs {
            config.training.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.training.batch_size = batch_size;
        }
        if let Some(lr) = self.learning_rate {
            config.training.learning_rate = lr;
        }
        if let Some(seed) = self.seed {
            config.training.seed = seed;
        }
        if self.no_augmentation {
            config.data.augmentation.enabled = false;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_cli_logging(args.verbose)?;

    let config = args.training_config()?;
    println!("{}", "Dog Disease Classifier Training".green().bold());
    info!("Backend: {}", backend_name());
    info!("Data directory: {:?}", config.data.data_dir);

    let scanned = DatasetScanner::new(&config.data.data_dir, config.data.validation_split)
        .scan()
        .context("failed to scan dataset")?;
    let labels = scanned.labels.clone();
    info!(
        "Found {} classes: {} training / {} validation images",
        labels.count(),
        scanned.train.len(),
        scanned.validation.len()
    );

    let normalizer = ImageNormalizer::new(config.image_dimensions());
    let train = DogDiseaseDataset::load(&scanned.train, &normalizer)?;
    let validation = DogDiseaseDataset::load(&scanned.validation, &normalizer)?;

    let class_weights = if config.training.class_weighting {
        compute_weights(&train.labels(), labels.count())
            .context("failed to compute class weights")?
    } else {
        ClassWeightTable::uniform(labels.count())
    };
    for (class_id, name) in labels.iter() {
        info!(
            "  {:<32} count={:>5} weight={:.3}",
            name,
            class_weights.counts().get(class_id).copied().unwrap_or(0),
            class_weights.weight(class_id).unwrap_or(1.0)
        );
    }

    let setup = ModelSetup::from_model_config(&config.model, labels.count());
    let optimizer = AdamConfig::new().init::<TrainingBackend, DogDiseaseClassifier<TrainingBackend>>();
    let engine = BurnEngine::<TrainingBackend, _>::new(
        setup.clone(),
        optimizer,
        train,
        validation,
        EngineOptions {
            batch_size: config.training.batch_size,
            seed: config.training.seed,
            augmentation: AugmentationPipeline::new(config.data.augmentation.clone()),
        },
        default_device(),
    )?;

    let artifact = ModelArtifact::new(&config.output.output_dir, &config.output.model_name);
    let sink = ArtifactWriter::new(artifact.clone(), labels.clone(), setup.config.clone());

    let progress = ProgressBar::new(config.training.epochs as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} epochs {msg}")
            .context("invalid progress template")?
            .progress_chars("=>-"),
    );
    let epoch_progress = progress.clone();

    let outcome = TrainingController::new(engine, ControllerConfig::from(&config), class_weights)
        .with_sink(sink)
        .on_epoch(move |m| {
            epoch_progress.set_message(format!(
                "val_acc={:.2}% lr={:.1e}",
                m.val_accuracy * 100.0,
                m.learning_rate
            ));
            epoch_progress.inc(1);
        })
        .run()
        .context("training failed")?;
    progress.finish_and_clear();

    let terminal = match outcome.terminal {
        ControllerState::EarlyStopped { epoch } => format!("early stopped after epoch {}", epoch + 1),
        ControllerState::Completed { epochs } => format!("completed {epochs} epochs"),
        other => format!("{other:?}"),
    };
    println!("{} {}", "Training".green().bold(), terminal);
    println!(
        "  Best epoch:          {}\n  Validation accuracy: {:.2}%\n  Final learning rate: {:.3e}\n  Model artifact:      {}",
        outcome.best.epoch + 1,
        outcome.best.val_accuracy * 100.0,
        outcome.final_lr,
        artifact.record_path().display()
    );

    let history = outcome.history;
    if config.output.export_csv {
        history.export_csv(&config.output.output_dir.join("training_history.csv"))?;
    }

    if config.output.write_report {
        let mut engine = outcome.engine;
        let pass = engine.evaluate().context("final evaluation failed")?;
        let report = EvaluationReporter::new(labels).report(
            &pass.probabilities,
            &pass.targets,
            Some(&history),
        )?;
        let options = ReportOptions {
            history_csv: config.output.export_csv,
            ..ReportOptions::default()
        };
        let written = report.write_artifacts(&config.output.output_dir, &options)?;

        println!("\n{}", report.render_text());
        for path in written {
            println!("  {} {}", "wrote".cyan(), path.display());
        }
    } else {
        history.save_json(&config.output.output_dir.join("training_history.json"))?;
    }

    Ok(())
}
