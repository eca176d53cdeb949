use figment::providers::{Env, Format, Toml};
use figment::Figment;
use std::path::Path;

use super::processing_conf::ProcessingConf;
use super::types::{ConfigError, CronConfig, ProcessingConfig};

/// Load the processing configuration from an INI-style file with `ESPA_*`
/// environment variable overrides.
pub fn load_processing_config(path: &Path) -> Result<ProcessingConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: ProcessingConfig = Figment::new()
        .merge(ProcessingConf::file(path))
        .merge(Env::prefixed("ESPA_"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load the cron configuration from a TOML file with `ESPA_CRON_*`
/// environment variable overrides. A missing file yields the defaults.
pub fn load_cron_config(path: &Path) -> Result<CronConfig, ConfigError> {
    let figment = if path.exists() {
        Figment::new().merge(Toml::file(path))
    } else {
        Figment::new()
    };

    figment
        .merge(Env::prefixed("ESPA_CRON_"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load the cron configuration from a TOML string (useful for testing).
pub fn load_cron_config_from_str(toml_str: &str) -> Result<CronConfig, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
