//! Staff, client groups, clients, contacts and stored payment accounts.

use crate::core::{EntityType, Filter, Join, LocalId, Record, RemoteQuery, Row, SortOrder, Value};
use crate::engine::ImportContext;
use crate::error::Result;

use super::{optional, reencrypt, require, DEFAULT_CURRENCY};

pub(super) fn clients_query() -> RemoteQuery {
    RemoteQuery::table("tblclients")
        .join(
            Join::left("tblcurrencies", "cur", "t.currency", "id")
                .select("code", "currency_code"),
        )
        .order_by("id", SortOrder::Asc)
}

/// Clients with a stored card.
pub(super) fn accounts_query() -> RemoteQuery {
    RemoteQuery::table("tblclients")
        .filter(Filter::NotNull("cardlastfour".into()))
        .filter(Filter::Ne("cardlastfour".into(), Value::text("")))
        .order_by("id", SortOrder::Asc)
}

pub(super) fn staff(row: &Row, ctx: &ImportContext) -> Record {
    Record::new()
        .with("company_id", ctx.company_id())
        .with("username", row.text("username"))
        .with("first_name", row.text_or("firstname", ""))
        .with("last_name", row.text_or("lastname", ""))
        .with("email", row.text_or("email", ""))
        .with("status", if row.flag("disabled") { "inactive" } else { "active" })
}

pub(super) fn client_group(row: &Row, ctx: &ImportContext) -> Record {
    Record::new()
        .with("company_id", ctx.company_id())
        .with("name", row.text_or("groupname", ""))
        .with("color", row.text("groupcolour"))
}

pub(super) fn client(row: &Row, ctx: &ImportContext) -> Result<Record> {
    let group_id = optional(ctx, EntityType::ClientGroups, row, "groupid")?;
    Ok(Record::new()
        .with("company_id", ctx.company_id())
        .with("client_group_id", group_id)
        .with("email", row.text_or("email", ""))
        .with("first_name", row.text_or("firstname", ""))
        .with("last_name", row.text_or("lastname", ""))
        .with("company", row.text("companyname"))
        .with("status", client_status(&row.text_or("status", "Active")))
        .with("currency", row.text_or("currency_code", DEFAULT_CURRENCY))
        .with("tax_exempt", row.flag("taxexempt"))
        .with("notes", row.text("notes"))
        .with("date_added", row.datetime("datecreated")?))
}

fn client_status(status: &str) -> &'static str {
    match status.trim().to_lowercase().as_str() {
        "active" => "active",
        "fraud" => "fraud",
        _ => "inactive",
    }
}

fn contact_record(row: &Row, client_id: LocalId, contact_type: &str) -> Record {
    Record::new()
        .with("client_id", client_id)
        .with("contact_type", contact_type)
        .with("first_name", row.text_or("firstname", ""))
        .with("last_name", row.text_or("lastname", ""))
        .with("company", row.text("companyname"))
        .with("email", row.text("email"))
        .with("address1", row.text("address1"))
        .with("address2", row.text("address2"))
        .with("city", row.text("city"))
        .with("state", row.text("state"))
        .with("zip", row.text("postcode"))
        .with("country", row.text("country"))
        .with("phone", row.text("phonenumber"))
}

/// The client row doubles as its primary contact.
pub(super) async fn add_primary_contact(
    row: &Row,
    client_id: LocalId,
    ctx: &mut ImportContext,
) -> Result<()> {
    let remote_id = row.reference("id");
    let record = contact_record(row, client_id, "primary");
    ctx.add(EntityType::PrimaryContacts, record, remote_id.as_deref())
        .await?;
    Ok(())
}

pub(super) fn contact(row: &Row, ctx: &ImportContext) -> Result<Record> {
    let client_id = require(ctx, EntityType::Clients, row, "userid")?;
    let contact_type = if row.flag("subaccount") { "other" } else { "billing" };
    Ok(contact_record(row, client_id, contact_type))
}

pub(super) fn account(row: &Row, ctx: &ImportContext) -> Result<Record> {
    let contact_id = require(ctx, EntityType::PrimaryContacts, row, "id")?;
    Ok(Record::new()
        .with("contact_id", contact_id)
        .with("first_name", row.text_or("firstname", ""))
        .with("last_name", row.text_or("lastname", ""))
        .with("type", "cc")
        .with("card_type", row.text("cardtype").map(|t| t.to_lowercase()))
        .with("last4", row.text_or("cardlastfour", ""))
        .with("expiration", reencrypt(ctx, row.get("expdate"))?)
        .with("status", "active"))
}
