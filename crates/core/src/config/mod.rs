//! Configuration for the processing and cron tiers.
//!
//! The processing configuration lives in an INI-style file whose
//! `[processing]` section maps environment-variable names to values;
//! `ESPA_*` environment variables override file entries. The cron tier
//! keeps its own small TOML file.

mod loader;
mod processing_conf;
mod types;
mod validate;

pub use loader::{load_cron_config, load_cron_config_from_str, load_processing_config};
pub use processing_conf::ProcessingConf;
pub use types::{ConfigError, CronConfig, DistributionMethod, ProcessingConfig};
pub use validate::validate_processing_config;
