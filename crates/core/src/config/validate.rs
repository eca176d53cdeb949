use super::types::{ConfigError, DistributionMethod, ProcessingConfig};

/// Validate cross-field constraints of the processing configuration.
pub fn validate_processing_config(config: &ProcessingConfig) -> Result<(), ConfigError> {
    if !config.api.starts_with("http://") && !config.api.starts_with("https://") {
        return Err(ConfigError::ValidationError(format!(
            "api must be an http(s) URL, got [{}]",
            config.api
        )));
    }

    match config.distribution_method {
        DistributionMethod::Local => {
            if config.distribution_dir.is_none() {
                return Err(ConfigError::ValidationError(
                    "distribution_dir is required for the local distribution method".to_string(),
                ));
            }
        }
        DistributionMethod::Remote => {
            if config.cache_host_list.is_empty() {
                return Err(ConfigError::ValidationError(
                    "cache_host_list is required for the remote distribution method".to_string(),
                ));
            }
        }
    }

    Ok(())
}
