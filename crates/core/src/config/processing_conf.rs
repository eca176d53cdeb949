//! Figment provider for the INI-style processing configuration file.
//!
//! The file carries a `[processing]` section of `key = value` lines where
//! keys are environment-variable names (`espa_work_dir`, ...). Values may
//! be single- or double-quoted; `#` and `;` start comments. The leading
//! `espa_` key prefix is stripped so file entries and `ESPA_*` environment
//! overrides address the same configuration fields.

use std::path::{Path, PathBuf};

use figment::value::{Dict, Map, Value};
use figment::{Error, Metadata, Profile, Provider};

const SECTION: &str = "processing";
const KEY_PREFIX: &str = "espa_";

/// Provider reading the `[processing]` section of a configuration file.
pub struct ProcessingConf {
    path: PathBuf,
}

impl ProcessingConf {
    /// Read from the given file path.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn parse(contents: &str) -> Result<Dict, Error> {
        let mut dict = Dict::new();
        let mut in_section = false;

        for (number, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_section = section.trim().eq_ignore_ascii_case(SECTION);
                continue;
            }

            if !in_section {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::from(format!(
                    "line {}: expected `key = value`, got [{line}]",
                    number + 1
                ))
            })?;

            let key = normalize_key(key);
            let value = unquote(value.trim());

            dict.insert(key, Value::from(value));
        }

        Ok(dict)
    }
}

fn normalize_key(key: &str) -> String {
    let key = key.trim().to_ascii_lowercase();
    key.strip_prefix(KEY_PREFIX).unwrap_or(&key).to_string()
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

impl Provider for ProcessingConf {
    fn metadata(&self) -> Metadata {
        Metadata::named(format!(
            "ESPA processing configuration ({})",
            self.path.display()
        ))
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::from(format!("{}: {e}", self.path.display())))?;

        let dict = Self::parse(&contents)?;

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_processing_section() {
        let contents = r#"
# processing environment
[processing]
espa_api = http://localhost:4004
espa_work_dir = '/data/work'
espa_distribution_method = local
include_resource_report = True
espa_cache_host_list = "cache01.example.com,cache02.example.com"
"#;
        let dict = ProcessingConf::parse(contents).unwrap();
        assert_eq!(
            dict.get("api").unwrap(),
            &Value::from("http://localhost:4004".to_string())
        );
        assert_eq!(
            dict.get("work_dir").unwrap(),
            &Value::from("/data/work".to_string())
        );
        assert_eq!(
            dict.get("include_resource_report").unwrap(),
            &Value::from("True".to_string())
        );
        assert_eq!(
            dict.get("cache_host_list").unwrap(),
            &Value::from("cache01.example.com,cache02.example.com".to_string())
        );
    }

    #[test]
    fn test_ignores_other_sections() {
        let contents = r#"
[hadoop]
max_jobs = 50

[processing]
espa_api = http://localhost:4004
espa_distribution_method = remote
"#;
        let dict = ProcessingConf::parse(contents).unwrap();
        assert!(dict.get("max_jobs").is_none());
        assert_eq!(
            dict.get("distribution_method").unwrap(),
            &Value::from("remote".to_string())
        );
    }

    #[test]
    fn test_rejects_bare_lines() {
        let contents = "[processing]\nnot a key value pair\n";
        assert!(ProcessingConf::parse(contents).is_err());
    }

    #[test]
    fn test_comment_styles() {
        let contents = "[processing]\n# hash comment\n; semicolon comment\nespa_api = x\n";
        let dict = ProcessingConf::parse(contents).unwrap();
        assert_eq!(dict.len(), 1);
    }
}
