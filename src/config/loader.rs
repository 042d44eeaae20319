// Configuration loader
// Layers built-in defaults, an optional TOML file and environment variables

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::settings::Settings;
use crate::errors::config_parse_error;

/// Picked up from the working directory when no --config path is given
pub const DEFAULT_CONFIG_FILE: &str = "tabtrain.toml";

/// Environment variable → settings key
pub const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("GCP_CREDENTIALS_PATH", "cloud.credentials_path"),
    ("GCS_BUCKET", "cloud.bucket"),
    ("GCS_DATA_PATH", "cloud.data_path"),
    ("GCS_MODEL_DIR", "cloud.model_dir"),
    ("CONTAINER_TAG_FILE", "cloud.container_tag_file"),
    ("CONTAINER_REGISTRY_PATH", "cloud.container_registry_path"),
    ("GCP_PROJECT_ID", "cloud.project_id"),
    ("GCP_REGION", "cloud.region"),
    ("GCP_ACCESS_TOKEN", "cloud.access_token"),
    ("TABTRAIN_STORE_ROOT", "cloud.store_root"),
    ("MODEL_FILENAME", "training.model_filename"),
];

/// Load settings from the config file (if any) and the process environment
pub fn load_config(path: Option<&Path>) -> Result<Settings> {
    load_config_with(path, |name| std::env::var(name).ok())
}

/// Load settings with an explicit environment lookup
pub fn load_config_with<F>(path: Option<&Path>, env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut builder = config::Config::builder();

    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            builder = builder.add_source(
                config::File::from(path.to_path_buf()).format(config::FileFormat::Toml),
            );
        }
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            if fallback.exists() {
                tracing::debug!(path = %fallback.display(), "Using config file from working directory");
                builder = builder
                    .add_source(config::File::from(fallback).format(config::FileFormat::Toml));
            }
        }
    }

    for (var, key) in ENV_OVERRIDES {
        let value = env(var).filter(|v| !v.trim().is_empty());
        builder = builder
            .set_override_option(*key, value)
            .with_context(|| format!("Invalid value for {}", var))?;
    }

    let settings: Settings = builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| anyhow::anyhow!(config_parse_error(&e.to_string())))?;

    Ok(settings)
}
