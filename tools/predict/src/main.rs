//! Prediction CLI Tool
//!
//! Classifies image files (or every image in a directory) with a trained model.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use dog_core::setup_cli_logging;
use dog_dataset::scan_images;
use dog_inference::{
    load_model, ConfidencePolicy, InferenceService, DEFAULT_LOW_CONFIDENCE_THRESHOLD,
};
use dog_training::backend::{default_device, DefaultBackend};
use dog_training::ModelArtifact;
use tracing::warn;

/// Dog Disease Prediction Tool
#[derive(Parser, Debug)]
#[command(name = "dog-predict", version, about = "Classify dog skin and eye images")]
struct Args {
    /// Image files or directories of images
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory holding the model artifact
    #[arg(short, long, value_name = "DIR", default_value = "output")]
    artifact_dir: PathBuf,

    /// Base name of the model artifact
    #[arg(short, long, default_value = "dog_disease_model")]
    model_name: String,

    /// Confidence (percent) below which an advisory is attached
    #[arg(long, default_value_t = DEFAULT_LOW_CONFIDENCE_THRESHOLD)]
    threshold: f64,

    /// Print one JSON object per image
    #[arg(long)]
    json: bool,

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
    let service = InferenceService::new(model, ConfidencePolicy::new(args.threshold));

    let mut paths = Vec::new();
    for input in &args.inputs {
        if input.is_dir() {
            paths.extend(scan_images(input)?);
        } else {
            paths.push(input.clone());
        }
    }

    let mut failures = 0usize;
    for path in &paths {
        match service.classify_path(path) {
            Ok(result) if args.json => {
                let line = serde_json::json!({
                    "image": path.display().to_string(),
                    "result": result,
                });
                println!("{line}");
            }
            Ok(result) => {
                let confidence = format!("{:.2}%", result.confidence);
                let confidence = if result.is_low_confidence() {
                    confidence.yellow()
                } else {
                    confidence.green()
                };
                println!("{}: {} ({})", path.display(), result.label.bold(), confidence);
                if let Some(advisory) = &result.advisory {
                    println!("  {}", advisory.yellow());
                }
            }
            Err(e) => {
                failures += 1;
                warn!("{}: {} ({})", path.display(), e, e.code());
                if !args.json {
                    println!("{}: {}", path.display(), e.to_string().red());
                }
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} image(s) could not be classified", paths.len());
    }
    Ok(())
}
