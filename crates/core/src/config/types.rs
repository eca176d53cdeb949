use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// How completed products are handed off to the online cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionMethod {
    /// The distribution directory is mounted locally.
    Local,
    /// Products are transferred to a cache host over ssh/scp.
    Remote,
}

/// Processing-tier configuration.
///
/// File keys carry the `espa_` prefix of the environment variables they
/// mirror; the loader strips it, so `espa_work_dir` and `ESPA_WORK_DIR`
/// both land on [`ProcessingConfig::work_dir`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessingConfig {
    /// Base URL of the production API.
    pub api: String,

    /// Base directory for per-product processing directories. Empty means
    /// the current working directory.
    #[serde(default)]
    pub work_dir: PathBuf,

    pub distribution_method: DistributionMethod,

    /// Distribution directory for the local method.
    #[serde(default)]
    pub distribution_dir: Option<PathBuf>,

    /// Cache hosts for the remote method, comma-joined in a single field.
    #[serde(default, deserialize_with = "host_list")]
    pub cache_host_list: Vec<String>,

    /// Root of the auxiliary data archive, exported to science tools.
    #[serde(default)]
    pub aux_dir: Option<PathBuf>,

    /// Set the immutable attribute on distributed products.
    #[serde(default, deserialize_with = "python_bool")]
    pub immutable_distribution: bool,

    /// Log a resource snapshot at the end of each product.
    #[serde(default, deserialize_with = "python_bool")]
    pub include_resource_report: bool,

    /// Lower bound on per-request wall time, in seconds. Paces status
    /// updates so the order tracker is not hammered by trivial requests.
    #[serde(default = "default_min_request_duration")]
    pub min_request_duration: u64,
}

fn default_min_request_duration() -> u64 {
    5
}

impl ProcessingConfig {
    /// The effective base work directory (current dir when unset).
    pub fn base_work_dir(&self) -> PathBuf {
        if self.work_dir.as_os_str().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            self.work_dir.clone()
        }
    }
}

/// Cron-tier configuration (TOML).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CronConfig {
    /// Upper bound on concurrently processing products.
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,

    /// Directory holding the scheduler and per-product log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_log_filename")]
    pub log_filename: String,

    #[serde(default = "default_plot_log_filename")]
    pub plot_log_filename: String,

    /// Queue name per request priority. `all` must be present; it stands
    /// for "no priority filter" when querying the API.
    #[serde(default = "default_queue_mapping")]
    pub queue_mapping: HashMap<String, String>,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            max_jobs: default_max_jobs(),
            log_dir: default_log_dir(),
            log_filename: default_log_filename(),
            plot_log_filename: default_plot_log_filename(),
            queue_mapping: default_queue_mapping(),
        }
    }
}

fn default_max_jobs() -> usize {
    50
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_log_filename() -> String {
    "espa-ondemand-cron.log".to_string()
}

fn default_plot_log_filename() -> String {
    "espa-plot-cron.log".to_string()
}

fn default_queue_mapping() -> HashMap<String, String> {
    HashMap::from([
        ("all".to_string(), "ondemand".to_string()),
        ("low".to_string(), "ondemand-low".to_string()),
        ("normal".to_string(), "ondemand".to_string()),
        ("high".to_string(), "ondemand-high".to_string()),
    ])
}

/// Accepts native booleans plus the literal `True`/`False` strings the
/// INI file uses.
fn python_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => Ok(b),
        Raw::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "invalid boolean value [{other}]"
            ))),
        },
    }
}

/// Accepts a comma-joined host string or a native sequence.
fn host_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        List(Vec<String>),
    }

    let hosts = match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s
            .split(',')
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect(),
        Raw::List(list) => list,
    };

    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_config_defaults() {
        let cfg = CronConfig::default();
        assert_eq!(cfg.max_jobs, 50);
        assert_eq!(cfg.queue_mapping.get("all").unwrap(), "ondemand");
        assert_eq!(cfg.queue_mapping.get("high").unwrap(), "ondemand-high");
        assert_eq!(cfg.log_dir, PathBuf::from("/tmp"));
    }

    #[test]
    fn test_python_bool_via_json() {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(deserialize_with = "python_bool")]
            flag: bool,
        }

        let p: Probe = serde_json::from_str(r#"{"flag": "True"}"#).unwrap();
        assert!(p.flag);
        let p: Probe = serde_json::from_str(r#"{"flag": "False"}"#).unwrap();
        assert!(!p.flag);
        let p: Probe = serde_json::from_str(r#"{"flag": true}"#).unwrap();
        assert!(p.flag);
        let err = serde_json::from_str::<Probe>(r#"{"flag": "maybe"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_host_list_from_comma_string() {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(deserialize_with = "host_list")]
            hosts: Vec<String>,
        }

        let p: Probe = serde_json::from_str(r#"{"hosts": "a.example.com, b.example.com,"}"#).unwrap();
        assert_eq!(p.hosts, vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn test_base_work_dir_empty_falls_back_to_cwd() {
        let cfg = ProcessingConfig {
            api: "http://localhost:4004".to_string(),
            work_dir: PathBuf::new(),
            distribution_method: DistributionMethod::Local,
            distribution_dir: None,
            cache_host_list: vec![],
            aux_dir: None,
            immutable_distribution: false,
            include_resource_report: false,
            min_request_duration: 5,
        };
        assert_eq!(cfg.base_work_dir(), std::env::current_dir().unwrap());
    }
}
