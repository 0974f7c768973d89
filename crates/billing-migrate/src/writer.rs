//! Standard entity writers over a [`LocalStore`].
//!
//! A [`TableWriter`] checks required fields and unique keys, then inserts the
//! record into the entity's table. Rejections come back as field errors; only
//! store failures are `Err`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::core::traits::{EntityWriter, FieldErrors, LocalStore, WriteOutcome};
use crate::core::{EntityType, Record};
use crate::error::{MigrateError, Result};

/// A field that must be unique within a scope of other fields.
#[derive(Debug, Clone)]
struct UniqueKey {
    field: &'static str,
    scope: Vec<&'static str>,
}

/// Validates and inserts records of one entity type.
pub struct TableWriter {
    entity: EntityType,
    store: Arc<dyn LocalStore>,
    required: Vec<&'static str>,
    unique: Vec<UniqueKey>,
}

impl TableWriter {
    pub fn new(entity: EntityType, store: Arc<dyn LocalStore>) -> Self {
        Self {
            entity,
            store,
            required: Vec::new(),
            unique: Vec::new(),
        }
    }

    /// Fields that must be present and non-empty.
    #[must_use]
    pub fn required(mut self, fields: &[&'static str]) -> Self {
        self.required.extend_from_slice(fields);
        self
    }

    /// `field` must not already exist among rows sharing the `scope` values.
    #[must_use]
    pub fn unique(mut self, field: &'static str, scope: &[&'static str]) -> Self {
        self.unique.push(UniqueKey {
            field,
            scope: scope.to_vec(),
        });
        self
    }

    async fn validate(&self, record: &Record) -> Result<FieldErrors> {
        let mut errors = FieldErrors::new();

        for field in &self.required {
            if record.get(field).is_empty() {
                errors.add(*field, format!("{} is required.", field));
            }
        }

        for key in &self.unique {
            let value = record.get(key.field);
            if value.is_empty() {
                continue;
            }
            let mut criteria = Record::new().with(key.field, value.clone());
            for scope in &key.scope {
                criteria.set(*scope, record.get(scope).clone());
            }
            let existing = self.store.find(self.entity.table(), &criteria).await?;
            if !existing.is_empty() {
                errors.add(
                    key.field,
                    format!("{} '{}' is already in use.", key.field, value),
                );
            }
        }

        Ok(errors)
    }
}

#[async_trait]
impl EntityWriter for TableWriter {
    fn entity(&self) -> EntityType {
        self.entity
    }

    async fn create(&self, record: &Record) -> Result<WriteOutcome> {
        let errors = self.validate(record).await?;
        if !errors.is_empty() {
            debug!("{}: record rejected ({} fields)", self.entity, errors.len());
            return Ok(WriteOutcome::Invalid(errors));
        }
        let id = self.store.insert(self.entity.table(), record).await?;
        Ok(WriteOutcome::Created(id))
    }
}

/// Writers by entity type.
#[derive(Clone, Default)]
pub struct WriterSet {
    writers: HashMap<EntityType, Arc<dyn EntityWriter>>,
}

impl WriterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`TableWriter`] per entity type with the local schema's rules.
    pub fn standard(store: Arc<dyn LocalStore>) -> Self {
        use EntityType::*;

        let mut set = Self::new();
        for &entity in EntityType::ALL {
            let writer = TableWriter::new(entity, Arc::clone(&store));
            let writer = match entity {
                Staff => writer
                    .required(&["first_name", "last_name", "email"])
                    .unique("email", &["company_id"]),
                ClientGroups => writer
                    .required(&["company_id", "name"])
                    .unique("name", &["company_id"]),
                Clients => writer
                    .required(&["company_id", "email"])
                    .unique("email", &["company_id"]),
                Contacts | PrimaryContacts => {
                    writer.required(&["client_id", "contact_type", "first_name"])
                }
                Accounts => writer.required(&["contact_id", "type", "last4"]),
                Currencies => writer
                    .required(&["company_id", "code"])
                    .unique("code", &["company_id"]),
                Taxes => writer.required(&["company_id", "name", "amount"]),
                Modules => writer
                    .required(&["company_id", "class"])
                    .unique("class", &["company_id"]),
                ModuleRows => writer.required(&["module_id"]),
                ModuleRowMeta => writer.required(&["module_row_id", "key"]),
                Gateways => writer
                    .required(&["company_id", "class"])
                    .unique("class", &["company_id"]),
                GatewayMeta => writer.required(&["gateway_id", "key"]),
                Packages => writer.required(&["company_id", "module_id", "name"]),
                Pricings => writer.required(&["package_id", "period", "currency"]),
                Coupons => writer
                    .required(&["company_id", "code"])
                    .unique("code", &["company_id"]),
                CouponPackages => writer.required(&["coupon_id", "package_id"]),
                CouponAmounts => writer.required(&["coupon_id", "currency", "amount"]),
                Services => writer.required(&["client_id", "pricing_id", "status"]),
                ServiceFields => writer.required(&["service_id", "key"]),
                Invoices => writer.required(&["client_id", "currency", "date_billed"]),
                InvoiceLines => writer.required(&["invoice_id", "description"]),
                Transactions => writer.required(&["client_id", "amount", "currency"]),
                TransactionTypes => writer
                    .required(&["company_id", "name"])
                    .unique("name", &["company_id"]),
                TransactionApplied => writer.required(&["transaction_id", "invoice_id", "amount"]),
                SupportDepartments => writer.required(&["company_id", "name"]),
                SupportTickets => writer.required(&["department_id", "code", "summary"]),
                SupportReplies => writer.required(&["ticket_id", "details"]),
            };
            set.register(Arc::new(writer));
        }
        set
    }

    /// Add or replace the writer for its entity type.
    pub fn register(&mut self, writer: Arc<dyn EntityWriter>) {
        self.writers.insert(writer.entity(), writer);
    }

    pub fn get(&self, entity: EntityType) -> Result<Arc<dyn EntityWriter>> {
        self.writers
            .get(&entity)
            .cloned()
            .ok_or_else(|| MigrateError::Config(format!("No writer registered for {}", entity)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MemoryStore;

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_missing_required_fields_are_reported_per_field() {
        let writer = TableWriter::new(EntityType::Clients, store()).required(&["company_id", "email"]);
        let outcome = writer.create(&Record::new().with("email", "  ")).await.unwrap();
        match outcome {
            WriteOutcome::Invalid(errors) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors.messages("email"), ["email is required."]);
            }
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unique_key_is_scoped() {
        let store = store();
        store
            .seed("clients", Record::new().with("company_id", 1i64).with("email", "a@x.io"))
            .unwrap();
        let writer = TableWriter::new(EntityType::Clients, store.clone())
            .unique("email", &["company_id"]);

        let dup = Record::new().with("company_id", 1i64).with("email", "a@x.io");
        assert!(matches!(
            writer.create(&dup).await.unwrap(),
            WriteOutcome::Invalid(_)
        ));

        let other_company = Record::new().with("company_id", 2i64).with("email", "a@x.io");
        assert!(matches!(
            writer.create(&other_company).await.unwrap(),
            WriteOutcome::Created(2)
        ));
        assert_eq!(store.rows("clients").len(), 2);
    }

    #[tokio::test]
    async fn test_standard_set_covers_every_entity() {
        let set = WriterSet::standard(store());
        for &entity in EntityType::ALL {
            assert_eq!(set.get(entity).unwrap().entity(), entity);
        }
    }

    #[tokio::test]
    async fn test_primary_contacts_share_the_contacts_table() {
        let store = store();
        let set = WriterSet::standard(store.clone());
        let record = Record::new()
            .with("client_id", 1i64)
            .with("contact_type", "primary")
            .with("first_name", "Ada");
        set.get(EntityType::PrimaryContacts)
            .unwrap()
            .create(&record)
            .await
            .unwrap();
        assert_eq!(store.rows("contacts").len(), 1);
    }
}
