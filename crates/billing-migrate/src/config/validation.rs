//! Configuration validation.

use super::{Config, ConnectionParams};
use crate::core::FieldErrors;
use crate::error::{MigrateError, Result};

/// Minimum length of encryption key material.
const MIN_KEY_LEN: usize = 16;

/// Validate the configuration.
///
/// Connection settings are not checked here: they are validated field by
/// field when a migrator processes them (see [`validate_connection`]).
pub fn validate(config: &Config) -> Result<()> {
    if config.migration.system.trim().is_empty() {
        return Err(MigrateError::Config("migration.system is required".into()));
    }
    if config.migration.version.trim().is_empty() {
        return Err(MigrateError::Config("migration.version is required".into()));
    }
    if config.migration.company_id == 0 {
        return Err(MigrateError::Config(
            "migration.company_id must be at least 1".into(),
        ));
    }
    if config.migration.encryption_key.len() < MIN_KEY_LEN {
        return Err(MigrateError::Config(format!(
            "migration.encryption_key must be at least {} characters",
            MIN_KEY_LEN
        )));
    }
    if let Some(key) = &config.migration.source_encryption_key {
        if key.is_empty() {
            return Err(MigrateError::Config(
                "migration.source_encryption_key must not be empty when set".into(),
            ));
        }
    }
    if let Some(url) = &config.local.url {
        if !url.starts_with("mysql://") && !url.starts_with("mariadb://") {
            return Err(MigrateError::Config(format!(
                "local.url must be a mysql:// URL, got '{}'",
                url.split('@').last().unwrap_or_default()
            )));
        }
    }
    if config.migration.reuse_packages && config.migration.package_overrides.is_empty() {
        return Err(MigrateError::Config(
            "migration.package_overrides is required when reuse_packages is enabled".into(),
        ));
    }

    Ok(())
}

/// Check required connection fields, keyed by settings field name.
pub fn validate_connection(params: &ConnectionParams) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if params.host.trim().is_empty() {
        errors.add("host", "Please enter a database host.");
    }
    if params.database.trim().is_empty() {
        errors.add("database", "Please enter a database name.");
    }
    if params.user.trim().is_empty() {
        errors.add("user", "Please enter a database user.");
    }
    if params.port == 0 {
        errors.add("port", "Please enter a valid port.");
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LocalConfig, MigrationConfig};

    fn valid_config() -> Config {
        Config {
            migration: MigrationConfig {
                system: "whmcs".to_string(),
                version: "5.2".to_string(),
                encryption_key: "0123456789abcdef0123".to_string(),
                ..MigrationConfig::default()
            },
            source: ConnectionParams {
                host: "localhost".to_string(),
                port: 3306,
                database: "whmcs".to_string(),
                user: "root".to_string(),
                pass: "password".to_string(),
                ..ConnectionParams::default()
            },
            local: LocalConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_system() {
        let mut config = valid_config();
        config.migration.system = " ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_short_encryption_key() {
        let mut config = valid_config();
        config.migration.encryption_key = "short".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_local_url_scheme() {
        let mut config = valid_config();
        config.local.url = Some("postgres://u:p@host/db".to_string());
        let err = validate(&config).unwrap_err().to_string();
        assert!(!err.contains("u:p"), "credentials must not leak: {}", err);

        config.local.url = Some("mysql://u:p@host/blesta".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_reuse_packages_requires_overrides() {
        let mut config = valid_config();
        config.migration.reuse_packages = true;
        assert!(validate(&config).is_err());
        config.migration.package_overrides.insert("4".to_string(), 2);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_connection_errors_are_keyed_by_field() {
        let errors = validate_connection(&ConnectionParams::default());
        let fields: Vec<_> = errors.fields().cloned().collect();
        assert_eq!(fields, vec!["database", "host", "port", "user"]);
        assert!(validate_connection(&valid_config().source).is_empty());
    }

    #[test]
    fn test_connection_debug_redacts_password() {
        let mut config = valid_config();
        config.source.pass = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_123"));
    }

    #[test]
    fn test_migration_debug_redacts_key() {
        let config = valid_config();
        let debug_output = format!("{:?}", config.migration);
        assert!(!debug_output.contains("0123456789abcdef0123"));
    }
}
