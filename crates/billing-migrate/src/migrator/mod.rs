//! Migrators: settings handling, configuration and the ordered import run.
//!
//! A [`MigrationPlan`] knows one foreign system version (which tables to
//! read, how rows become records, in which order). [`Migrator`] drives a
//! plan through the engine and owns everything that outlives a single pass.

mod registry;
pub mod whmcs;

pub use registry::{MigratorRegistry, PlanConstructor};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{validate_connection, ConnectionParams, MigrationConfig};
use crate::core::traits::{EntityWriter, LocalStore, RemoteConnector, RemoteReader, RowCursor};
use crate::core::{EntityType, FieldErrors, LocalId, Record, RemoteId, Row};
use crate::engine::{run_pass, ErrorKind, ErrorList, ImportContext, PassStats};
use crate::error::{MigrateError, Result};
use crate::identity::IdentityMap;
use crate::instrument::{DebugSink, Deadline, Stopwatch};
use crate::mapping::{
    AeadCipher, CallbackRegistry, FieldCipher, FieldCodec, MappingCatalog, PassthroughCipher,
};
use crate::writer::WriterSet;

/// HKDF context for values written to the local schema.
const LOCAL_KEY_CONTEXT: &str = "local";
/// HKDF context for values read encrypted from the foreign schema.
const SOURCE_KEY_CONTEXT: &str = "source";

/// How one foreign system version is imported.
#[async_trait]
pub trait MigrationPlan: Send + Sync {
    /// Foreign system name, e.g. `whmcs`.
    fn system(&self) -> &str;

    /// Foreign system version, e.g. `5.2`.
    fn version(&self) -> &str;

    /// Entity types in dependency order; one pass each.
    fn order(&self) -> Vec<EntityType>;

    /// Source rows for a pass.
    async fn rows(&self, entity: EntityType, reader: &dyn RemoteReader) -> Result<RowCursor>;

    /// Remote id of a source row.
    fn remote_id(&self, _entity: EntityType, row: &Row) -> Option<RemoteId> {
        row.reference("id")
    }

    /// Turn a source row into a local record; `None` skips the row.
    async fn transform(
        &self,
        entity: EntityType,
        row: &Row,
        ctx: &mut ImportContext,
    ) -> Result<Option<Record>>;

    /// Persist the record. `None` means it was not written.
    async fn write(
        &self,
        entity: EntityType,
        _row: &Row,
        record: Record,
        remote_id: Option<&str>,
        ctx: &mut ImportContext,
    ) -> Result<Option<LocalId>> {
        ctx.add(entity, record, remote_id).await
    }

    /// Dependent records of a written row (lines, pricing, replies).
    async fn after_write(
        &self,
        _entity: EntityType,
        _row: &Row,
        _local_id: LocalId,
        _ctx: &mut ImportContext,
    ) -> Result<()> {
        Ok(())
    }
}

/// Input type of a settings field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Password,
    Checkbox,
}

/// One settings field as presented to an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SettingsField {
    pub label: &'static str,
    pub field: &'static str,
    #[serde(rename = "type")]
    pub kind: FieldKind,
}

const SETTINGS_FIELDS: &[SettingsField] = &[
    SettingsField {
        label: "Database Host",
        field: "host",
        kind: FieldKind::Text,
    },
    SettingsField {
        label: "Database Name",
        field: "database",
        kind: FieldKind::Text,
    },
    SettingsField {
        label: "Database User",
        field: "user",
        kind: FieldKind::Text,
    },
    SettingsField {
        label: "Database Password",
        field: "pass",
        kind: FieldKind::Password,
    },
    SettingsField {
        label: "Database Port",
        field: "port",
        kind: FieldKind::Text,
    },
    SettingsField {
        label: "Character Set Query",
        field: "charset_query",
        kind: FieldKind::Text,
    },
    SettingsField {
        label: "SQL Mode Query",
        field: "sql_mode_query",
        kind: FieldKind::Text,
    },
    SettingsField {
        label: "Enable Debug",
        field: "enable_debug",
        kind: FieldKind::Checkbox,
    },
];

/// Choices made before an import starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Map foreign packages onto existing local ones instead of creating them.
    pub reuse_packages: bool,
    /// Remote package id -> local package id.
    pub package_overrides: BTreeMap<String, LocalId>,
}

impl From<&MigrationConfig> for ImportOptions {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            reuse_packages: config.reuse_packages,
            package_overrides: config.package_overrides.clone(),
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithErrors,
    TimedOut,
}

/// Summary of one import run.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    /// Unique run identifier.
    pub run_id: String,
    pub system: String,
    pub version: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    pub passes: Vec<PassStats>,
    /// Identity map size per entity type at the end of the run.
    pub mapped: BTreeMap<EntityType, usize>,
    pub validation_errors: usize,
    pub exceptions: usize,
    pub errors: ErrorList,
}

impl ImportReport {
    /// Rows written across all passes.
    pub fn rows_written(&self) -> u64 {
        self.passes.iter().map(|p| p.written).sum()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Everything a migrator needs besides its plan.
#[derive(Clone)]
pub struct MigratorArgs {
    /// Local write connection, shared for the whole run.
    pub store: Arc<dyn LocalStore>,
    /// Opens the foreign database from settings.
    pub connector: Arc<dyn RemoteConnector>,
    pub options: MigrationConfig,
}

/// Drives a [`MigrationPlan`] end to end.
pub struct Migrator {
    plan: Box<dyn MigrationPlan>,
    store: Arc<dyn LocalStore>,
    connector: Arc<dyn RemoteConnector>,
    options: MigrationConfig,
    catalog: Arc<MappingCatalog>,
    codec: FieldCodec,
    source_codec: FieldCodec,
    reader: Option<Arc<dyn RemoteReader>>,
    settings_errors: FieldErrors,
    import_options: ImportOptions,
    writers: Vec<Arc<dyn EntityWriter>>,
    debug: Option<DebugSink>,
    config_hash: Option<String>,
    identity: IdentityMap,
    errors: ErrorList,
}

impl Migrator {
    /// Build a migrator: derive ciphers and load the mapping catalog.
    pub fn new(plan: Box<dyn MigrationPlan>, args: MigratorArgs) -> Result<Self> {
        let MigratorArgs {
            store,
            connector,
            options,
        } = args;

        let local_cipher = AeadCipher::from_secret(&options.encryption_key, LOCAL_KEY_CONTEXT)?;
        let source_cipher: Arc<dyn FieldCipher> = match &options.source_encryption_key {
            Some(key) => Arc::new(AeadCipher::from_secret(key, SOURCE_KEY_CONTEXT)?),
            None => Arc::new(PassthroughCipher),
        };

        let callbacks = CallbackRegistry::with_builtins(Arc::clone(&source_cipher));
        let mut catalog = MappingCatalog::builtin(&callbacks)?;
        if let Some(dir) = &options.mappings_dir {
            let loaded = catalog.load_dir(dir, &callbacks)?;
            info!("Loaded {} mapping files from {}", loaded, dir.display());
        }

        Ok(Self {
            plan,
            store,
            connector,
            options,
            catalog: Arc::new(catalog),
            codec: FieldCodec::new(Arc::new(local_cipher)),
            source_codec: FieldCodec::new(source_cipher),
            reader: None,
            settings_errors: FieldErrors::new(),
            import_options: ImportOptions::default(),
            writers: Vec::new(),
            debug: None,
            config_hash: None,
            identity: IdentityMap::new(),
            errors: ErrorList::new(),
        })
    }

    /// Replace the standard writer for the writer's entity type.
    #[must_use]
    pub fn with_writer(mut self, writer: Arc<dyn EntityWriter>) -> Self {
        self.writers.push(writer);
        self
    }

    /// Stream debug lines here. Without a sink, `enable_debug` uses stdout.
    #[must_use]
    pub fn with_debug_sink(mut self, sink: DebugSink) -> Self {
        self.debug = Some(sink);
        self
    }

    /// Configuration fingerprint recorded in reports.
    #[must_use]
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn system(&self) -> &str {
        self.plan.system()
    }

    pub fn version(&self) -> &str {
        self.plan.version()
    }

    /// Settings fields for non-interactive use; names match
    /// [`ConnectionParams`].
    pub fn settings_fields(&self) -> &'static [SettingsField] {
        SETTINGS_FIELDS
    }

    /// Validate connection settings and connect to the foreign database.
    ///
    /// On failure the offending fields are available from
    /// [`Migrator::settings_errors`] and [`Migrator::import`] refuses to run.
    pub async fn process_settings(&mut self, params: &ConnectionParams) -> Result<()> {
        self.reader = None;
        self.settings_errors = validate_connection(params);
        if let Some((field, messages)) = self.settings_errors.iter().next() {
            return Err(MigrateError::connection(field.clone(), messages.join(" ")));
        }

        match self.connector.connect(params).await {
            Ok(reader) => {
                info!("Connected to {} source ({})", self.plan.system(), reader.db_type());
                self.reader = Some(reader);
                Ok(())
            }
            Err(e) => {
                let field = match &e {
                    MigrateError::Connection { field, .. } => field.clone(),
                    _ => "host".to_string(),
                };
                self.settings_errors = FieldErrors::single(field, e.to_string());
                Err(e)
            }
        }
    }

    /// Field errors from the last [`Migrator::process_settings`].
    pub fn settings_errors(&self) -> &FieldErrors {
        &self.settings_errors
    }

    /// Validate pre-import choices.
    ///
    /// With `reuse_packages`, the overrides are merged into the packages
    /// bucket of the identity map at the start of the run; those foreign
    /// packages are not imported.
    pub fn process_configuration(&mut self, options: &ImportOptions) -> Result<()> {
        let mut errors = FieldErrors::new();
        if options.reuse_packages && options.package_overrides.is_empty() {
            errors.add("package_overrides", "Select a local package for each remote package.");
        }
        for (remote, local) in &options.package_overrides {
            if *local == 0 {
                errors.add(
                    "package_overrides",
                    format!("Remote package {} has no local package.", remote),
                );
            }
        }
        if let Some((field, messages)) = errors.iter().next() {
            return Err(MigrateError::Config(format!("{}: {}", field, messages.join(" "))));
        }

        if !options.reuse_packages && !options.package_overrides.is_empty() {
            warn!("Package overrides given without reuse_packages; they are ignored");
        }
        self.import_options = options.clone();
        Ok(())
    }

    /// Run every pass of the plan in order.
    ///
    /// Row failures never escape: they are collected and available from
    /// [`Migrator::errors`] afterwards. Each call starts with an empty
    /// identity map, so importing twice into the same local schema creates
    /// every record twice. Only a missing connection is an `Err`.
    pub async fn import(&mut self) -> Result<ImportReport> {
        let reader = self.reader.clone().ok_or_else(|| {
            MigrateError::Config("Connection settings must be processed before importing".into())
        })?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let watch = Stopwatch::start("import");
        let deadline = Deadline::from_secs(self.options.max_run_duration_secs);
        info!(
            "Starting import run {} ({} {})",
            run_id,
            self.plan.system(),
            self.plan.version()
        );

        let mut identity = IdentityMap::new();
        if self.import_options.reuse_packages {
            identity.merge_overrides(
                EntityType::Packages,
                &self.import_options.package_overrides,
            )?;
        }

        let mut writers = WriterSet::standard(Arc::clone(&self.store));
        for writer in &self.writers {
            writers.register(Arc::clone(writer));
        }
        let debug = self
            .debug
            .clone()
            .or_else(|| self.options.enable_debug.then(DebugSink::stdout));

        let mut ctx = ImportContext::new(
            self.options.company_id,
            Arc::clone(&self.store),
            Arc::clone(&reader),
        )
        .with_writers(writers)
        .with_catalog(Arc::clone(&self.catalog))
        .with_codec(self.codec.clone())
        .with_source_codec(self.source_codec.clone())
        .with_identity(identity)
        .with_debug(debug);

        let mut passes = Vec::new();
        for entity in self.plan.order() {
            let stats = run_pass(
                self.plan.as_ref(),
                entity,
                reader.as_ref(),
                &mut ctx,
                &deadline,
            )
            .await;
            let timed_out = stats.timed_out;
            passes.push(stats);
            if timed_out {
                break;
            }
        }

        let (identity, errors) = ctx.finish();
        let timed_out = passes.iter().any(|p| p.timed_out);
        let status = if timed_out {
            RunStatus::TimedOut
        } else if errors.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        };

        let report = ImportReport {
            run_id,
            system: self.plan.system().to_string(),
            version: self.plan.version().to_string(),
            status,
            started_at,
            completed_at: Utc::now(),
            duration_seconds: watch.elapsed_secs(),
            config_hash: self.config_hash.clone(),
            passes,
            mapped: identity.counts(),
            validation_errors: errors.count(ErrorKind::Validation),
            exceptions: errors.count(ErrorKind::Exception),
            errors: errors.clone(),
        };
        info!(
            "Import {} finished: {} rows written, {} errors in {}",
            report.run_id,
            report.rows_written(),
            errors.len(),
            watch
        );

        self.identity = identity;
        self.errors = errors;
        Ok(report)
    }

    /// Errors of the last import.
    pub fn errors(&self) -> &ErrorList {
        &self.errors
    }

    /// Identity map of the last import.
    pub fn identity(&self) -> &IdentityMap {
        &self.identity
    }

    /// Check the foreign connection.
    pub async fn health_check(&self) -> Result<()> {
        match &self.reader {
            Some(reader) => reader.ping().await,
            None => Err(MigrateError::Config(
                "Connection settings have not been processed".into(),
            )),
        }
    }

    /// Close the foreign connection.
    pub async fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.close().await;
        }
    }
}
