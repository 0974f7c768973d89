//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote connection could not be established for the given setting.
    #[error("Connection error ({field}): {message}")]
    Connection { field: String, message: String },

    /// Remote database query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Local store rejected or failed an operation
    #[error("Local store error: {message}\n  Context: {context}")]
    Local { message: String, context: String },

    /// Malformed mapping file or rule
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// A remote id was registered twice with different local ids.
    #[error(
        "Identity conflict for {entity} remote id {remote_id}: already mapped to {existing}, attempted {attempted}"
    )]
    IdentityConflict {
        entity: String,
        remote_id: String,
        existing: u64,
        attempted: u64,
    },

    /// A referenced record has not been migrated (yet).
    #[error("Referenced {entity} with remote id {remote_id} has not been migrated")]
    NotMigrated { entity: String, remote_id: String },

    /// Encryption or decryption failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Value could not be converted or serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No migrator registered for the requested system/version
    #[error("No migrator registered for {system} {version}. Available: {available}")]
    UnknownMigrator {
        system: String,
        version: String,
        available: String,
    },

    /// A registered constructor produced a migrator for a different system
    #[error("Migrator registered as {requested} identifies itself as {actual}")]
    MigratorMismatch { requested: String, actual: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Exit code for configuration problems.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for remote connection problems.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code for remote query failures.
pub const EXIT_SOURCE_ERROR: u8 = 3;
/// Exit code for local store failures.
pub const EXIT_LOCAL_ERROR: u8 = 4;
/// Exit code for mapping and data conversion failures.
pub const EXIT_MAPPING_ERROR: u8 = 5;
/// Exit code for migrator resolution failures.
pub const EXIT_MIGRATOR_ERROR: u8 = 6;
/// Exit code for IO failures.
pub const EXIT_IO_ERROR: u8 = 7;

impl MigrateError {
    /// Create a Local error with context about where it occurred
    pub fn local(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Local {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Connection error attributed to a settings field
    pub fn connection(field: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Connection {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            MigrateError::Connection { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::Source(_) => EXIT_SOURCE_ERROR,
            MigrateError::Local { .. }
            | MigrateError::IdentityConflict { .. }
            | MigrateError::NotMigrated { .. } => EXIT_LOCAL_ERROR,
            MigrateError::Mapping(_)
            | MigrateError::Crypto(_)
            | MigrateError::Serialization(_)
            | MigrateError::Json(_) => EXIT_MAPPING_ERROR,
            MigrateError::UnknownMigrator { .. } | MigrateError::MigratorMismatch { .. } => {
                EXIT_MIGRATOR_ERROR
            }
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            MigrateError::connection("host", "refused").exit_code(),
            EXIT_CONNECTION_ERROR
        );
        assert_eq!(
            MigrateError::local("boom", "insert clients").exit_code(),
            EXIT_LOCAL_ERROR
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(MigrateError::from(io).exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_format_detailed_includes_message() {
        let err = MigrateError::NotMigrated {
            entity: "clients".into(),
            remote_id: "42".into(),
        };
        let text = err.format_detailed();
        assert!(text.starts_with("Error: Referenced clients with remote id 42"));
    }
}
