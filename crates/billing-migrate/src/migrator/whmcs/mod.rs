//! WHMCS 5.2 migration plan.
//!
//! Passes run in dependency order: people and accounts first, then the
//! catalog (servers, registrars, gateways, packages, coupons), then what
//! references it (services, invoices, transactions), support last.

mod billing;
mod clients;
mod modules;
mod support;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::core::traits::{RemoteReader, RowCursor};
use crate::core::{EntityType, LocalId, ReadMode, Record, RemoteQuery, Row, SortOrder, Value};
use crate::engine::ImportContext;
use crate::error::{MigrateError, Result};

use super::MigrationPlan;

/// Currency assumed when a client has none.
pub(crate) const DEFAULT_CURRENCY: &str = "USD";

const ORDER: &[EntityType] = &[
    EntityType::Staff,
    EntityType::ClientGroups,
    EntityType::Clients,
    EntityType::Contacts,
    EntityType::Accounts,
    EntityType::Currencies,
    EntityType::Taxes,
    EntityType::ModuleRows,
    EntityType::Gateways,
    EntityType::Packages,
    EntityType::Coupons,
    EntityType::Services,
    EntityType::Invoices,
    EntityType::Transactions,
    EntityType::SupportDepartments,
    EntityType::SupportTickets,
];

/// WHMCS 5.2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Whmcs52;

impl Whmcs52 {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MigrationPlan for Whmcs52 {
    fn system(&self) -> &str {
        "whmcs"
    }

    fn version(&self) -> &str {
        "5.2"
    }

    fn order(&self) -> Vec<EntityType> {
        ORDER.to_vec()
    }

    async fn rows(&self, entity: EntityType, reader: &dyn RemoteReader) -> Result<RowCursor> {
        let query = match entity {
            EntityType::ModuleRows => {
                return modules::module_rows(reader).await.map(RowCursor::from_rows)
            }
            EntityType::Gateways => {
                return modules::gateway_rows(reader).await.map(RowCursor::from_rows)
            }
            EntityType::Staff => by_id("tbladmins"),
            EntityType::ClientGroups => by_id("tblclientgroups"),
            EntityType::Clients => clients::clients_query(),
            EntityType::Contacts => by_id("tblcontacts"),
            EntityType::Accounts => clients::accounts_query(),
            EntityType::Currencies => by_id("tblcurrencies"),
            EntityType::Taxes => by_id("tbltax"),
            EntityType::Packages => by_id("tblproducts"),
            EntityType::Coupons => by_id("tblpromotions"),
            EntityType::Services => billing::services_query(),
            EntityType::Invoices => billing::invoices_query(),
            EntityType::Transactions => billing::transactions_query(),
            EntityType::SupportDepartments => by_id("tblticketdepartments"),
            EntityType::SupportTickets => by_id("tbltickets"),
            other => return Err(unsupported(other)),
        };
        reader.read(&query, ReadMode::Stream).await
    }

    async fn transform(
        &self,
        entity: EntityType,
        row: &Row,
        ctx: &mut ImportContext,
    ) -> Result<Option<Record>> {
        match entity {
            EntityType::Staff => Ok(Some(clients::staff(row, ctx))),
            EntityType::ClientGroups => Ok(Some(clients::client_group(row, ctx))),
            EntityType::Clients => clients::client(row, ctx).map(Some),
            EntityType::Contacts => clients::contact(row, ctx).map(Some),
            EntityType::Accounts => clients::account(row, ctx).map(Some),
            EntityType::Currencies => Ok(Some(billing::currency(row, ctx))),
            EntityType::Taxes => Ok(Some(billing::tax(row, ctx))),
            EntityType::ModuleRows => Ok(modules::module_row(row)),
            EntityType::Gateways => Ok(modules::gateway(row)),
            EntityType::Packages => billing::package(row, ctx).await,
            EntityType::Coupons => billing::coupon(row, ctx).map(Some),
            EntityType::Services => billing::service(row, ctx).await.map(Some),
            EntityType::Invoices => billing::invoice(row, ctx).map(Some),
            EntityType::Transactions => billing::transaction(row, ctx).await,
            EntityType::SupportDepartments => Ok(Some(support::department(row, ctx))),
            EntityType::SupportTickets => support::ticket(row, ctx).map(Some),
            other => Err(unsupported(other)),
        }
    }

    async fn write(
        &self,
        entity: EntityType,
        row: &Row,
        record: Record,
        remote_id: Option<&str>,
        ctx: &mut ImportContext,
    ) -> Result<Option<LocalId>> {
        match entity {
            EntityType::ModuleRows => {
                modules::install_module_row(row, &record, remote_id, ctx).await
            }
            EntityType::Gateways => modules::install_gateway(row, &record, ctx).await,
            _ => ctx.add(entity, record, remote_id).await,
        }
    }

    async fn after_write(
        &self,
        entity: EntityType,
        row: &Row,
        local_id: LocalId,
        ctx: &mut ImportContext,
    ) -> Result<()> {
        match entity {
            EntityType::Clients => clients::add_primary_contact(row, local_id, ctx).await,
            EntityType::Packages => billing::add_pricing(row, local_id, ctx).await,
            EntityType::Coupons => billing::add_coupon_terms(row, local_id, ctx).await,
            EntityType::Services => billing::add_service_fields(row, local_id, ctx).await,
            EntityType::Invoices => billing::add_invoice_lines(row, local_id, ctx).await,
            EntityType::Transactions => billing::apply_transaction(row, local_id, ctx).await,
            EntityType::SupportTickets => support::add_replies(row, local_id, ctx).await,
            _ => Ok(()),
        }
    }
}

fn unsupported(entity: EntityType) -> MigrateError {
    MigrateError::Mapping(format!("WHMCS 5.2 has no {} pass", entity))
}

/// Every row of a table in id order.
fn by_id(table: &str) -> RemoteQuery {
    RemoteQuery::table(table).order_by("id", SortOrder::Asc)
}

/// Local id of a required foreign key.
fn require(ctx: &ImportContext, entity: EntityType, row: &Row, column: &str) -> Result<LocalId> {
    let remote = row
        .reference(column)
        .ok_or_else(|| MigrateError::NotMigrated {
            entity: entity.to_string(),
            remote_id: format!("(empty {})", column),
        })?;
    ctx.identity().require(entity, &remote)
}

/// Local id of an optional foreign key; a set but unmigrated key is an error.
fn optional(
    ctx: &ImportContext,
    entity: EntityType,
    row: &Row,
    column: &str,
) -> Result<Option<LocalId>> {
    ctx.identity()
        .resolve_optional(entity, row.reference(column).as_deref())
}

/// Re-encrypt a value the foreign system stored encrypted.
fn reencrypt(ctx: &ImportContext, value: &Value) -> Result<Value> {
    if value.is_empty() {
        return Ok(Value::Null);
    }
    let plain = ctx.source_codec().decrypt(value)?;
    ctx.codec().encrypt(&plain)
}

/// Group `setting`/`value` rows by `key` into one row per key.
///
/// Each grouped row carries `id` and `key` set to the group name, one column
/// per setting, and a `settings` JSON object of all of them.
fn pivot(rows: Vec<Row>, key: &str) -> Vec<Row> {
    let mut groups: IndexMap<String, Row> = IndexMap::new();
    let mut settings: IndexMap<String, serde_json::Map<String, serde_json::Value>> =
        IndexMap::new();

    for row in rows {
        let Some(name) = row.text(key) else { continue };
        let Some(setting) = row.text("setting") else { continue };
        let value = row.get("value").clone();

        let group = groups.entry(name.clone()).or_insert_with(|| {
            Row::new()
                .with("id", name.as_str())
                .with(key, name.as_str())
        });
        settings
            .entry(name)
            .or_default()
            .insert(setting.clone(), value.to_json());
        group.set(setting, value);
    }

    groups
        .into_iter()
        .map(|(name, mut row)| {
            let object = settings.shift_remove(&name).unwrap_or_default();
            row.set("settings", Value::Json(serde_json::Value::Object(object)));
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pivot_groups_settings_in_first_seen_order() {
        let rows = vec![
            Row::new().with("gateway", "paypal").with("setting", "email").with("value", "a@x.io"),
            Row::new().with("gateway", "authorize").with("setting", "loginid").with("value", "L1"),
            Row::new().with("gateway", "paypal").with("setting", "name").with("value", "PayPal"),
        ];
        let pivoted = pivot(rows, "gateway");
        assert_eq!(pivoted.len(), 2);
        assert_eq!(pivoted[0].text("id").as_deref(), Some("paypal"));
        assert_eq!(pivoted[0].text("email").as_deref(), Some("a@x.io"));
        match pivoted[0].get("settings") {
            Value::Json(serde_json::Value::Object(map)) => assert_eq!(map.len(), 2),
            other => panic!("unexpected settings {:?}", other),
        }
        assert_eq!(pivoted[1].text("loginid").as_deref(), Some("L1"));
    }

    #[test]
    fn test_order_starts_with_people_and_ends_with_support() {
        let order = Whmcs52::new().order();
        assert_eq!(order.first(), Some(&EntityType::Staff));
        assert_eq!(order.last(), Some(&EntityType::SupportTickets));
        let pos = |e| order.iter().position(|x| *x == e).unwrap();
        assert!(pos(EntityType::Clients) < pos(EntityType::Invoices));
        assert!(pos(EntityType::Packages) < pos(EntityType::Services));
        assert!(pos(EntityType::Invoices) < pos(EntityType::Transactions));
    }
}
