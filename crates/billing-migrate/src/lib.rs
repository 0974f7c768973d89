//! # billing-migrate
//!
//! Mapping-driven import of legacy billing systems into a local billing
//! schema.
//!
//! This library reads a foreign billing database and recreates its data in
//! the local schema with support for:
//!
//! - **Versioned migrators** selected by foreign system and version
//! - **Identity mapping** from foreign ids to local ids, with conflict detection
//! - **Mapping files** for servers, registrars and gateways with fallback
//!   from exact to versionless to generic mappings
//! - **Per-row failure isolation**: a bad row is recorded and the run goes on
//! - **Field encryption** of credentials copied into the local schema
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use billing_migrate::drivers::{MysqlConnector, MysqlStore};
//! use billing_migrate::{Config, ImportOptions, MigratorArgs, MigratorRegistry};
//!
//! #[tokio::main]
//! async fn main() -> billing_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let url = config.local.url.clone().unwrap_or_default();
//!     let args = MigratorArgs {
//!         store: Arc::new(MysqlStore::connect(&url).await?),
//!         connector: Arc::new(MysqlConnector),
//!         options: config.migration.clone(),
//!     };
//!     let mut migrator = MigratorRegistry::with_builtins().create(
//!         &config.migration.system,
//!         &config.migration.version,
//!         args,
//!     )?;
//!     migrator.process_settings(&config.source).await?;
//!     migrator.process_configuration(&ImportOptions::from(&config.migration))?;
//!     let report = migrator.import().await?;
//!     println!("Imported {} rows, {} errors", report.rows_written(), report.errors.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod identity;
pub mod instrument;
pub mod mapping;
pub mod migrator;
pub mod writer;

// Re-exports for convenient access
pub use config::{Config, ConnectionParams, LocalConfig, MigrationConfig};
pub use core::{EntityType, LocalId, Record, RemoteId, Row, Value};
pub use engine::{ErrorKind, ErrorList, ImportError};
pub use error::{MigrateError, Result};
pub use identity::IdentityMap;
pub use instrument::DebugSink;
pub use migrator::{
    ImportOptions, ImportReport, MigrationPlan, Migrator, MigratorArgs, MigratorRegistry,
    RunStatus, SettingsField,
};
