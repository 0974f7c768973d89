//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;
pub use validation::validate_connection;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 fingerprint of the configuration.
    ///
    /// Recorded in import reports so two runs can be told apart.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
migration:
  system: whmcs
  version: "5.2"
  encryption_key: "0123456789abcdef0123"
  package_overrides:
    "12": 3
source:
  host: db.example.com
  database: whmcs
  user: reader
  pass: secret
  charset_query: "SET NAMES 'utf8'"
"#;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.source.port, 3306);
        assert_eq!(config.migration.company_id, 1);
        assert_eq!(config.migration.max_run_duration_secs, 86_400);
        assert!(config.source.sql_mode_query.is_empty());
        assert!(config.local.url.is_none());
        assert_eq!(config.migration.package_overrides.get("12"), Some(&3));
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let a = Config::from_yaml(YAML).unwrap();
        let mut b = a.clone();
        assert_eq!(a.hash(), b.hash());
        b.migration.company_id = 2;
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_set_field_by_settings_name() {
        let mut params = ConnectionParams::default();
        params.set_field("host", "10.0.0.5").unwrap();
        params.set_field("port", "3307").unwrap();
        assert_eq!(params.host, "10.0.0.5");
        assert_eq!(params.port, 3307);
        assert!(params.set_field("port", "abc").is_err());
        assert!(params.set_field("hostname", "x").is_err());
    }

    #[test]
    fn test_blank_init_statements_are_skipped() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.source.init_statements(), vec!["SET NAMES 'utf8'"]);

        let mut params = config.source.clone();
        params.charset_query = "   ".to_string();
        assert!(params.init_statements().is_empty());
    }
}
