//! Shared state of one import run.
//!
//! [`ImportContext`] owns the identity map and the error list, and holds the
//! writers, the local store, the remote reader and the mapping catalog.
//! Migration plans create every local record through it, so registration of
//! remote ids and collection of validation errors happen in one place.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::core::traits::{LocalStore, RemoteReader, WriteOutcome};
use crate::core::{EntityType, LocalId, Record, RemoteId, Row, Value};
use crate::error::{MigrateError, Result};
use crate::identity::IdentityMap;
use crate::instrument::DebugSink;
use crate::mapping::{FieldCodec, MappingCatalog, MappingRule, ModuleKind, PassthroughCipher};
use crate::writer::WriterSet;

use super::errors::{ErrorList, ImportError};
use super::pricing::PricePoint;

/// Run-scoped state handed to migration plans.
pub struct ImportContext {
    company_id: LocalId,
    identity: IdentityMap,
    errors: ErrorList,
    writers: WriterSet,
    store: Arc<dyn LocalStore>,
    reader: Arc<dyn RemoteReader>,
    catalog: Arc<MappingCatalog>,
    codec: FieldCodec,
    source_codec: FieldCodec,
    transaction_types: Option<HashMap<String, LocalId>>,
    debug: Option<DebugSink>,
    current: Option<(EntityType, Option<RemoteId>)>,
    /// Index of the current row's entry in `errors`.
    row_error: Option<usize>,
}

impl ImportContext {
    /// Context with the standard writers, an empty catalog and no encryption.
    pub fn new(
        company_id: LocalId,
        store: Arc<dyn LocalStore>,
        reader: Arc<dyn RemoteReader>,
    ) -> Self {
        let passthrough = FieldCodec::new(Arc::new(PassthroughCipher));
        Self {
            company_id,
            identity: IdentityMap::new(),
            errors: ErrorList::new(),
            writers: WriterSet::standard(Arc::clone(&store)),
            store,
            reader,
            catalog: Arc::new(MappingCatalog::new()),
            codec: passthrough.clone(),
            source_codec: passthrough,
            transaction_types: None,
            debug: None,
            current: None,
            row_error: None,
        }
    }

    #[must_use]
    pub fn with_writers(mut self, writers: WriterSet) -> Self {
        self.writers = writers;
        self
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<MappingCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Codec for values stored in the local schema.
    #[must_use]
    pub fn with_codec(mut self, codec: FieldCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Codec for values the foreign system stored encrypted.
    #[must_use]
    pub fn with_source_codec(mut self, codec: FieldCodec) -> Self {
        self.source_codec = codec;
        self
    }

    #[must_use]
    pub fn with_identity(mut self, identity: IdentityMap) -> Self {
        self.identity = identity;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, sink: Option<DebugSink>) -> Self {
        self.debug = sink;
        self
    }

    pub fn company_id(&self) -> LocalId {
        self.company_id
    }

    pub fn identity(&self) -> &IdentityMap {
        &self.identity
    }

    pub fn identity_mut(&mut self) -> &mut IdentityMap {
        &mut self.identity
    }

    pub fn errors(&self) -> &ErrorList {
        &self.errors
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    /// Reader for follow-up queries (child rows of the current record).
    pub fn reader(&self) -> Arc<dyn RemoteReader> {
        Arc::clone(&self.reader)
    }

    pub fn codec(&self) -> &FieldCodec {
        &self.codec
    }

    pub fn source_codec(&self) -> &FieldCodec {
        &self.source_codec
    }

    /// Consume the context, keeping the identity map and errors.
    pub fn finish(self) -> (IdentityMap, ErrorList) {
        (self.identity, self.errors)
    }

    /// Write a line to the debug stream when enabled.
    pub fn debug_line(&self, message: impl std::fmt::Display) {
        if let Some(sink) = &self.debug {
            sink.line(message);
        }
    }

    /// Mark the row being processed; validation errors of records without
    /// their own remote id are attributed to it. Every failure recorded
    /// until [`ImportContext::end_row`] lands in one error entry.
    pub fn begin_row(&mut self, entity: EntityType, remote_id: Option<RemoteId>) {
        self.current = Some((entity, remote_id));
        self.row_error = None;
    }

    pub fn end_row(&mut self) {
        self.current = None;
        self.row_error = None;
    }

    fn push_error(&mut self, entry: ImportError) {
        if self.current.is_some() {
            if let Some(existing) = self.row_error.and_then(|i| self.errors.get_mut(i)) {
                existing.absorb(entry);
                return;
            }
            self.row_error = Some(self.errors.len());
        }
        self.errors.push(entry);
    }

    fn current_remote_id(&self) -> Option<RemoteId> {
        self.current.as_ref().and_then(|(_, id)| id.clone())
    }

    /// Persist a record through the entity's writer.
    ///
    /// On success the remote id (if any) is registered and the local id is
    /// returned. Validation failures are added to the error list and yield
    /// `None`; they never abort the run.
    pub async fn add(
        &mut self,
        entity: EntityType,
        record: Record,
        remote_id: Option<&str>,
    ) -> Result<Option<LocalId>> {
        let writer = self.writers.get(entity)?;
        match writer.create(&record).await? {
            WriteOutcome::Created(local_id) => {
                if let Some(remote_id) = remote_id {
                    self.identity.remember(entity, remote_id, local_id)?;
                }
                Ok(Some(local_id))
            }
            WriteOutcome::Invalid(fields) => {
                let remote_id = remote_id
                    .map(str::to_string)
                    .or_else(|| self.current_remote_id());
                let entry = ImportError::validation(entity.as_str(), remote_id, fields);
                warn!("{}", entry);
                self.debug_line(format!("Invalid {}", entry));
                self.push_error(entry);
                Ok(None)
            }
        }
    }

    pub async fn add_staff(
        &mut self,
        record: Record,
        remote_id: Option<&str>,
    ) -> Result<Option<LocalId>> {
        self.add(EntityType::Staff, record, remote_id).await
    }

    pub async fn add_client(
        &mut self,
        record: Record,
        remote_id: Option<&str>,
    ) -> Result<Option<LocalId>> {
        self.add(EntityType::Clients, record, remote_id).await
    }

    pub async fn add_contact(
        &mut self,
        record: Record,
        remote_id: Option<&str>,
    ) -> Result<Option<LocalId>> {
        self.add(EntityType::Contacts, record, remote_id).await
    }

    pub async fn add_tax(
        &mut self,
        record: Record,
        remote_id: Option<&str>,
    ) -> Result<Option<LocalId>> {
        self.add(EntityType::Taxes, record, remote_id).await
    }

    pub async fn add_currency(
        &mut self,
        record: Record,
        remote_id: Option<&str>,
    ) -> Result<Option<LocalId>> {
        self.add(EntityType::Currencies, record, remote_id).await
    }

    pub async fn add_invoice(
        &mut self,
        record: Record,
        remote_id: Option<&str>,
    ) -> Result<Option<LocalId>> {
        self.add(EntityType::Invoices, record, remote_id).await
    }

    pub async fn add_transaction(
        &mut self,
        record: Record,
        remote_id: Option<&str>,
    ) -> Result<Option<LocalId>> {
        self.add(EntityType::Transactions, record, remote_id).await
    }

    pub async fn add_package(
        &mut self,
        record: Record,
        remote_id: Option<&str>,
    ) -> Result<Option<LocalId>> {
        self.add(EntityType::Packages, record, remote_id).await
    }

    pub async fn add_coupon(
        &mut self,
        record: Record,
        remote_id: Option<&str>,
    ) -> Result<Option<LocalId>> {
        self.add(EntityType::Coupons, record, remote_id).await
    }

    pub async fn add_service(
        &mut self,
        record: Record,
        remote_id: Option<&str>,
    ) -> Result<Option<LocalId>> {
        self.add(EntityType::Services, record, remote_id).await
    }

    pub async fn add_support_department(
        &mut self,
        record: Record,
        remote_id: Option<&str>,
    ) -> Result<Option<LocalId>> {
        self.add(EntityType::SupportDepartments, record, remote_id).await
    }

    pub async fn add_support_ticket(
        &mut self,
        record: Record,
        remote_id: Option<&str>,
    ) -> Result<Option<LocalId>> {
        self.add(EntityType::SupportTickets, record, remote_id).await
    }

    /// Local id of an existing row matching `criteria`.
    async fn find_id(&self, entity: EntityType, criteria: &Record) -> Result<Option<LocalId>> {
        let rows = self.store.find(entity.table(), criteria).await?;
        Ok(rows
            .first()
            .and_then(|row| row.int("id"))
            .and_then(|id| LocalId::try_from(id).ok()))
    }

    /// Local module for a foreign module or registrar, installed at most once.
    ///
    /// Memoized in the identity map's modules bucket; a module already
    /// present for `(company, class)` is reused instead of created.
    pub async fn install_module(&mut self, name: &str, kind: ModuleKind) -> Result<Option<LocalId>> {
        let key = format!("{}:{}", kind, name.trim().to_lowercase());
        if let Some(id) = self.identity.lookup(EntityType::Modules, &key) {
            return Ok(Some(id));
        }

        let catalog = Arc::clone(&self.catalog);
        let mapping = catalog.lookup(name, kind).map(|r| r.mapping);
        let class = mapping
            .map(|m| m.target_class_for(name))
            .unwrap_or_else(|| name.trim().to_lowercase());

        let criteria = Record::new()
            .with("company_id", self.company_id)
            .with("class", class.as_str());
        if let Some(id) = self.find_id(EntityType::Modules, &criteria).await? {
            self.identity.remember(EntityType::Modules, key, id)?;
            return Ok(Some(id));
        }

        let record = criteria
            .with(
                "name",
                mapping
                    .and_then(|m| m.name.clone())
                    .unwrap_or_else(|| name.to_string()),
            )
            .with("version", mapping.map(|m| m.version.clone()).unwrap_or_default())
            .with("type", kind.as_str());
        debug!("Installing {} module {}", kind, class);
        self.add(EntityType::Modules, record, Some(&key)).await
    }

    /// Create a module row and fill its meta fields from `row`.
    ///
    /// Module rows are never deduplicated. Without any mapping for the
    /// foreign name (not even a generic one) the row is skipped and logged.
    pub async fn install_module_row(
        &mut self,
        module_id: LocalId,
        name: &str,
        kind: ModuleKind,
        row: &Row,
        remote_id: Option<&str>,
    ) -> Result<Option<LocalId>> {
        let catalog = Arc::clone(&self.catalog);
        let Some(resolved) = catalog.lookup(name, kind) else {
            warn!("No {} mapping for '{}', module row skipped", kind, name);
            self.debug_line(format!("Skipped {} row for '{}': no mapping", kind, name));
            return Ok(None);
        };
        debug!(
            "{} '{}' resolved to mapping '{}' ({:?})",
            kind, name, resolved.mapping.class, resolved.matched
        );

        let record = Record::new().with("module_id", module_id);
        let Some(row_id) = self.add(EntityType::ModuleRows, record, remote_id).await? else {
            return Ok(None);
        };

        for rule in resolved.mapping.meta_rules() {
            let value = rule.resolve_with_retry(row, &self.codec)?;
            let meta = meta_record(rule, value).with("module_row_id", row_id);
            self.add(EntityType::ModuleRowMeta, meta, None).await?;
        }
        Ok(Some(row_id))
    }

    /// Install a local gateway for a foreign gateway and copy its settings.
    ///
    /// Memoized like modules. Meta fields are only written when the gateway
    /// is created by this call.
    pub async fn install_gateway(&mut self, name: &str, settings: &Row) -> Result<Option<LocalId>> {
        let key = name.trim().to_lowercase();
        if let Some(id) = self.identity.lookup(EntityType::Gateways, &key) {
            return Ok(Some(id));
        }

        let catalog = Arc::clone(&self.catalog);
        let Some(resolved) = catalog.lookup(name, ModuleKind::Gateway) else {
            warn!("No gateway mapping for '{}', gateway skipped", name);
            self.debug_line(format!("Skipped gateway '{}': no mapping", name));
            return Ok(None);
        };
        let mapping = resolved.mapping;
        let class = mapping.target_class_for(name);

        let criteria = Record::new()
            .with("company_id", self.company_id)
            .with("class", class.as_str());
        if let Some(id) = self.find_id(EntityType::Gateways, &criteria).await? {
            self.identity.remember(EntityType::Gateways, key, id)?;
            return Ok(Some(id));
        }

        let record = criteria
            .with("name", mapping.name.clone().unwrap_or_else(|| name.to_string()))
            .with("version", mapping.version.as_str());
        let Some(gateway_id) = self.add(EntityType::Gateways, record, Some(&key)).await? else {
            return Ok(None);
        };

        for rule in &mapping.gateway_meta {
            let value = rule.resolve_with_retry(settings, &self.codec)?;
            let meta = meta_record(rule, value)
                .with("gateway_id", gateway_id)
                .with("company_id", self.company_id);
            self.add(EntityType::GatewayMeta, meta, None).await?;
        }
        Ok(Some(gateway_id))
    }

    /// Insert every price point of a package.
    ///
    /// Points are inserted independently: a rejected point does not undo the
    /// others, and running the same import twice inserts them twice. The
    /// result is aligned with `points`.
    pub async fn add_package_pricing(
        &mut self,
        package_id: LocalId,
        points: &[PricePoint],
    ) -> Result<Vec<Option<LocalId>>> {
        let mut ids = Vec::with_capacity(points.len());
        for point in points {
            ids.push(
                self.add(EntityType::Pricings, point.to_record(package_id), None)
                    .await?,
            );
        }
        Ok(ids)
    }

    /// Local transaction type id for a type name.
    ///
    /// Existing types are loaded once per run on first use; unknown names
    /// are created and cached.
    pub async fn transaction_type_id(&mut self, name: &str) -> Result<Option<LocalId>> {
        if self.transaction_types.is_none() {
            let criteria = Record::new().with("company_id", self.company_id);
            let rows = self
                .store
                .find(EntityType::TransactionTypes.table(), &criteria)
                .await?;
            let types = rows
                .iter()
                .filter_map(|row| {
                    let id = LocalId::try_from(row.int("id")?).ok()?;
                    Some((row.text("name")?, id))
                })
                .collect();
            self.transaction_types = Some(types);
        }

        if let Some(id) = self
            .transaction_types
            .as_ref()
            .and_then(|types| types.get(name))
        {
            return Ok(Some(*id));
        }

        let record = Record::new()
            .with("company_id", self.company_id)
            .with("name", name)
            .with("type", "other");
        let id = self.add(EntityType::TransactionTypes, record, None).await?;
        if let (Some(id), Some(types)) = (id, self.transaction_types.as_mut()) {
            types.insert(name.to_string(), id);
        }
        Ok(id)
    }

    /// Log a failed row, reset the local connection and record the failure.
    pub async fn record_failure(
        &mut self,
        entity: EntityType,
        remote_id: Option<&str>,
        err: &MigrateError,
    ) {
        error!(
            entity = %entity,
            remote_id = remote_id.unwrap_or("-"),
            "Row failed: {}",
            err.format_detailed()
        );
        self.debug_line(format!(
            "Error importing {} #{}: {}",
            entity,
            remote_id.unwrap_or("-"),
            err
        ));
        if let Err(reset) = self.store.reset().await {
            error!("Failed to reset local connection: {}", reset);
        }
        self.push_error(ImportError::exception(
            entity.as_str(),
            remote_id.map(str::to_string),
            err.to_string(),
        ));
    }

    /// Record that the run budget elapsed.
    pub fn record_timeout(&mut self, entity: EntityType, budget: Option<Duration>) {
        let message = match budget {
            Some(b) => format!(
                "Run stopped before {} after exceeding {}s",
                entity,
                b.as_secs()
            ),
            None => format!("Run stopped before {}", entity),
        };
        warn!("{}", message);
        self.debug_line(&message);
        self.push_error(ImportError::timeout("import", message));
    }
}

fn meta_record(rule: &MappingRule, value: Value) -> Record {
    Record::new()
        .with("key", rule.key.as_str())
        .with("value", value)
        .with("serialized", i64::from(rule.serialized))
        .with("encrypted", i64::from(rule.encrypted))
}
