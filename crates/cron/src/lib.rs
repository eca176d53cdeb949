//! Shared wiring for the cron-tier binaries.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use espa_core::config::{
    load_cron_config, load_processing_config, validate_processing_config, CronConfig,
    ProcessingConfig,
};

/// Environment variable naming the processing configuration file.
pub const PROCESSING_CONFIG_ENV: &str = "ESPA_PROCESSING_CONFIG";

/// Environment variable naming the cron configuration file.
pub const CRON_CONFIG_ENV: &str = "ESPA_CRON_CONFIG";

/// Path of the processing configuration file.
pub fn processing_config_path() -> PathBuf {
    std::env::var(PROCESSING_CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("processing.conf"))
}

/// Path of the cron configuration file.
pub fn cron_config_path() -> PathBuf {
    std::env::var(CRON_CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("espa-cron.toml"))
}

/// Load and validate both configuration tiers.
pub fn load_configs() -> Result<(ProcessingConfig, CronConfig)> {
    let proc_path = processing_config_path();
    let processing = load_processing_config(&proc_path)
        .with_context(|| format!("Failed to load config from {proc_path:?}"))?;
    validate_processing_config(&processing).context("Configuration validation failed")?;

    let cron = load_cron_config(&cron_config_path()).context("Failed to load cron config")?;

    Ok((processing, cron))
}

/// Initialize tracing, optionally appending to a log file instead of
/// standard error.
pub fn init_tracing(log_file: Option<PathBuf>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {path:?}"))?;

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

/// Log a short hash of the active configuration so runs are attributable
/// to the configuration they saw.
pub fn log_config_hash(config: &ProcessingConfig) {
    let serialized = serde_json::to_string(config).unwrap_or_default();
    let hash = format!("{:x}", Sha256::digest(serialized.as_bytes()));
    info!("Configuration hash: {}", &hash[..16]);
}
