//! Shared CLI helpers for workspace tools.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{Error, Result};

/// Install the global subscriber. `RUST_LOG` wins over the verbosity flag.
pub fn setup_cli_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logger: {e}")))?;

    Ok(())
}

pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServeConfig, TrainingConfig};
    use tempfile::TempDir;

    #[test]
    fn test_load_toml_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.toml");
        fs::write(
            &path,
            "[model]\nimage_size = 128\n\n[training]\nlearning_rate = 0.001\n",
        )
        .unwrap();

        let config: TrainingConfig = load_toml_config(&path).unwrap();
        assert_eq!(config.model.image_size, 128);
        assert_eq!(config.training.learning_rate, 0.001);
    }

    #[test]
    fn test_missing_and_malformed_config() {
        let dir = TempDir::new().unwrap();
        let missing = load_toml_config::<ServeConfig>(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(Error::Config(_))));

        let path = dir.path().join("bad.toml");
        fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(matches!(
            load_toml_config::<ServeConfig>(&path),
            Err(Error::Config(_))
        ));
    }
}
