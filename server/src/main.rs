//! Dog Disease Classifier Server
//!
//! HTTP API serving predictions from a trained model artifact.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dog_core::{load_toml_config, ServeConfig};
use dog_inference::{load_model, ConfidencePolicy, InferenceService};
use dog_training::backend::{backend_name, default_device, DefaultBackend};
use dog_training::ModelArtifact;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::state::{AppState, ModelLoader};

/// Dog Disease Classifier Server
#[derive(Parser, Debug)]
#[command(name = "dog-server")]
#[command(version)]
#[command(about = "HTTP API for dog skin and eye disease classification")]
struct Cli {
    /// TOML file with serve settings; flags override it
    #[arg(short, long, env = "DOG_SERVER_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "DOG_SERVER_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "DOG_SERVER_HOST")]
    host: Option<String>,

    /// Directory holding the model artifact
    #[arg(long, env = "DOG_ARTIFACT_DIR")]
    artifact_dir: Option<PathBuf>,

    /// Base name of the model artifact
    #[arg(long, env = "DOG_MODEL_NAME")]
    model_name: Option<String>,

    /// Confidence (percent) below which an advisory is attached
    #[arg(long, env = "DOG_LOW_CONFIDENCE_THRESHOLD")]
    threshold: Option<f64>,

    /// Largest accepted upload in bytes
    #[arg(long, env = "DOG_MAX_UPLOAD_BYTES")]
    max_upload_bytes: Option<usize>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ServeConfig> {
        let mut config = match &self.config {
            Some(path) => load_toml_config::<ServeConfig>(path)?,
            None => ServeConfig::default(),
        };
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(dir) = self.artifact_dir {
            config.artifact_dir = dir;
        }
        if let Some(name) = self.model_name {
            config.model_name = name;
        }
        if let Some(threshold) = self.threshold {
            config.low_confidence_threshold = threshold;
        }
        if let Some(limit) = self.max_upload_bytes {
            config.max_upload_bytes = limit;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let config = cli.into_config()?;

    info!("Dog Disease Classifier Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Artifact:  {:?} / {}", config.artifact_dir, config.model_name);
    info!("  Threshold: {:.2}%", config.low_confidence_threshold);
    info!("  Upload limit: {} bytes", config.max_upload_bytes);
    info!("  Backend:   {}", backend_name());

    let artifact = ModelArtifact::new(&config.artifact_dir, &config.model_name);
    let loader: ModelLoader = Box::new(move || {
        load_model::<DefaultBackend>(&artifact, &default_device())
    });

    // A missing artifact or a label/output mismatch stops startup.
    let model = loader().context("failed to load model artifact")?;
    info!("Serving {} classes", model.labels().count());

    let service = InferenceService::new(
        model,
        ConfidencePolicy::new(config.low_confidence_threshold),
    );
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = Arc::new(AppState::new(config, service, loader));

    let app = routes::router(state);

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
