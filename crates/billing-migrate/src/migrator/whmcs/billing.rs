//! Currencies, taxes, packages and their pricing, coupons, services,
//! invoices and transactions.

use rust_decimal::Decimal;
use tracing::debug;

use crate::core::{EntityType, Join, LocalId, Record, RemoteQuery, Row, SortOrder, Value};
use crate::engine::{ImportContext, Period, PricePoint};
use crate::error::{MigrateError, Result};
use crate::mapping::ModuleKind;

use super::{optional, reencrypt, require, DEFAULT_CURRENCY};

/// Recurring price columns: price, setup fee, term, period.
const RECURRING: &[(&str, &str, u32, Period)] = &[
    ("monthly", "msetupfee", 1, Period::Month),
    ("quarterly", "qsetupfee", 3, Period::Month),
    ("semiannually", "ssetupfee", 6, Period::Month),
    ("annually", "asetupfee", 1, Period::Year),
    ("biennially", "bsetupfee", 2, Period::Year),
    ("triennially", "tsetupfee", 3, Period::Year),
];

fn currency_join(left: &str) -> Join {
    Join::left("tblcurrencies", "cur", left, "id").select("code", "currency_code")
}

pub(super) fn currency(row: &Row, ctx: &ImportContext) -> Record {
    Record::new()
        .with("company_id", ctx.company_id())
        .with("code", row.text_or("code", DEFAULT_CURRENCY))
        .with("prefix", row.text("prefix"))
        .with("suffix", row.text("suffix"))
        .with("format", currency_format(row.int("format").unwrap_or(1)))
        .with("exchange_rate", row.decimal("rate"))
}

fn currency_format(format: i64) -> &'static str {
    match format {
        3 => "#.###,##",
        4 => "#,###",
        _ => "#,###.##",
    }
}

pub(super) fn tax(row: &Row, ctx: &ImportContext) -> Record {
    Record::new()
        .with("company_id", ctx.company_id())
        .with("level", row.int("level").unwrap_or(1))
        .with("name", row.text_or("name", ""))
        .with("amount", row.decimal("taxrate"))
        .with("type", "exclusive")
        .with("state", row.text("state"))
        .with("country", row.text("country"))
        .with("status", "active")
}

/// Packages already mapped by configuration are not created again.
pub(super) async fn package(row: &Row, ctx: &mut ImportContext) -> Result<Option<Record>> {
    if let Some(remote) = row.reference("id") {
        if let Some(local) = ctx.identity().lookup(EntityType::Packages, &remote) {
            debug!("Package #{} reuses local package {}", remote, local);
            ctx.debug_line(format!("Package #{} reused as {}", remote, local));
            return Ok(None);
        }
    }

    let module = row.text_or("servertype", "none");
    let Some(module_id) = ctx.install_module(&module, ModuleKind::Module).await? else {
        return Ok(None);
    };

    let retired = row.flag("retired");
    Ok(Some(
        Record::new()
            .with("company_id", ctx.company_id())
            .with("module_id", module_id)
            .with("name", row.text_or("name", ""))
            .with("description", row.text("description"))
            .with("status", if retired { "inactive" } else { "active" })
            .with("hidden", row.flag("hidden"))
            .with("taxable", row.flag("tax"))
            .with("qty", row.flag("stockcontrol").then(|| row.int("qty").unwrap_or(0))),
    ))
}

/// Price points of one `tblpricing` row for a package pay type.
fn price_points(paytype: &str, price: &Row) -> Vec<PricePoint> {
    let currency = price.text_or("currency_code", DEFAULT_CURRENCY);
    match paytype {
        "free" => vec![PricePoint::new(0, Period::Onetime, Decimal::ZERO, currency)],
        "onetime" => {
            let amount = price.decimal("monthly");
            if amount.is_sign_negative() {
                return Vec::new();
            }
            vec![PricePoint::new(0, Period::Onetime, amount, currency)
                .setup_fee(price.decimal("msetupfee").max(Decimal::ZERO))]
        }
        _ => RECURRING
            .iter()
            .filter_map(|&(column, setup, term, period)| {
                let amount = price.decimal(column);
                if price.get(column).is_empty() || amount.is_sign_negative() {
                    return None;
                }
                Some(
                    PricePoint::new(term, period, amount, currency.as_str())
                        .setup_fee(price.decimal(setup).max(Decimal::ZERO)),
                )
            })
            .collect(),
    }
}

/// Insert the package's price points and register them for services.
pub(super) async fn add_pricing(
    row: &Row,
    package_id: LocalId,
    ctx: &mut ImportContext,
) -> Result<()> {
    let Some(remote) = row.reference("id") else {
        return Ok(());
    };
    let query = RemoteQuery::table("tblpricing")
        .eq("type", "product")
        .eq("relid", row.get("id").clone())
        .join(currency_join("t.currency"))
        .order_by("id", SortOrder::Asc);
    let prices = ctx.reader().fetch_all(&query).await?;

    let paytype = row.text_or("paytype", "recurring").to_lowercase();
    let points: Vec<PricePoint> = prices
        .iter()
        .flat_map(|price| price_points(&paytype, price))
        .collect();

    let ids = ctx.add_package_pricing(package_id, &points).await?;
    for (point, id) in points.iter().zip(ids) {
        if let Some(id) = id {
            ctx.identity_mut()
                .remember(EntityType::Pricings, point.key(&remote), id)?;
        }
    }
    Ok(())
}

pub(super) fn coupon(row: &Row, ctx: &ImportContext) -> Result<Record> {
    Ok(Record::new()
        .with("company_id", ctx.company_id())
        .with("code", row.text_or("code", ""))
        .with("used_qty", row.int("uses").unwrap_or(0))
        .with("max_qty", row.int("maxuses").unwrap_or(0))
        .with("start_date", row.datetime("startdate")?)
        .with("end_date", row.datetime("expirationdate")?)
        .with("status", "active")
        .with("type", "exclusive")
        .with("recurring", row.flag("recurring")))
}

/// Default currency code of the foreign system.
async fn default_currency(ctx: &ImportContext) -> Result<String> {
    let query = RemoteQuery::table("tblcurrencies")
        .eq("default", 1i64)
        .limit(1);
    let rows = ctx.reader().fetch_all(&query).await?;
    Ok(rows
        .first()
        .and_then(|row| row.text("code"))
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()))
}

/// Packages a coupon applies to, and its discount.
pub(super) async fn add_coupon_terms(
    row: &Row,
    coupon_id: LocalId,
    ctx: &mut ImportContext,
) -> Result<()> {
    let applies_to = row.text_or("appliesto", "");
    for remote in applies_to.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some(package_id) = ctx.identity().lookup(EntityType::Packages, remote) else {
            debug!("Coupon package #{} not migrated, skipped", remote);
            continue;
        };
        let record = Record::new()
            .with("coupon_id", coupon_id)
            .with("package_id", package_id);
        ctx.add(EntityType::CouponPackages, record, None).await?;
    }

    let amount_type = match row.text_or("type", "Percentage").to_lowercase().as_str() {
        "percentage" => "percent",
        _ => "amount",
    };
    let record = Record::new()
        .with("coupon_id", coupon_id)
        .with("currency", default_currency(ctx).await?)
        .with("amount", row.decimal("value"))
        .with("type", amount_type);
    ctx.add(EntityType::CouponAmounts, record, None).await?;
    Ok(())
}

pub(super) fn services_query() -> RemoteQuery {
    RemoteQuery::table("tblhosting")
        .join(Join::left("tblclients", "c", "t.userid", "id"))
        .join(currency_join("c.currency"))
        .order_by("id", SortOrder::Asc)
}

fn billing_cycle(cycle: &str) -> Result<(u32, Period)> {
    match cycle.trim().to_lowercase().as_str() {
        "monthly" => Ok((1, Period::Month)),
        "quarterly" => Ok((3, Period::Month)),
        "semi-annually" => Ok((6, Period::Month)),
        "annually" => Ok((1, Period::Year)),
        "biennially" => Ok((2, Period::Year)),
        "triennially" => Ok((3, Period::Year)),
        "one time" | "onetime" | "free account" | "free" => Ok((0, Period::Onetime)),
        other => Err(MigrateError::Mapping(format!(
            "Unknown billing cycle '{}'",
            other
        ))),
    }
}

fn service_status(status: &str) -> &'static str {
    match status.trim().to_lowercase().as_str() {
        "active" => "active",
        "pending" => "pending",
        "suspended" => "suspended",
        _ => "canceled",
    }
}

/// Pricing a service bills against.
///
/// Pricing created by this run is found in the identity map; packages mapped
/// onto existing local packages are matched against the local pricing rows.
async fn service_pricing(row: &Row, ctx: &ImportContext) -> Result<LocalId> {
    let (term, period) = billing_cycle(&row.text_or("billingcycle", "Monthly"))?;
    let currency = row.text_or("currency_code", DEFAULT_CURRENCY);
    let package = row.reference("packageid").unwrap_or_default();
    let key = PricePoint::new(term, period, Decimal::ZERO, currency.as_str()).key(&package);
    if let Some(id) = ctx.identity().lookup(EntityType::Pricings, &key) {
        return Ok(id);
    }

    let package_id = require(ctx, EntityType::Packages, row, "packageid")?;
    let criteria = Record::new()
        .with("package_id", package_id)
        .with("term", i64::from(term))
        .with("period", period.as_str())
        .with("currency", currency);
    let existing = ctx
        .store()
        .find(EntityType::Pricings.table(), &criteria)
        .await?;
    existing
        .first()
        .and_then(|row| row.int("id"))
        .and_then(|id| LocalId::try_from(id).ok())
        .ok_or(MigrateError::NotMigrated {
            entity: EntityType::Pricings.to_string(),
            remote_id: key,
        })
}

pub(super) async fn service(row: &Row, ctx: &ImportContext) -> Result<Record> {
    let client_id = require(ctx, EntityType::Clients, row, "userid")?;
    let pricing_id = service_pricing(row, ctx).await?;
    let module_row_id = optional(ctx, EntityType::ModuleRows, row, "server")?;
    let status = service_status(&row.text_or("domainstatus", "Active"));

    Ok(Record::new()
        .with("client_id", client_id)
        .with("pricing_id", pricing_id)
        .with("module_row_id", module_row_id)
        .with("qty", 1i64)
        .with("status", status)
        .with("override_price", row.decimal("amount"))
        .with("override_currency", row.text_or("currency_code", DEFAULT_CURRENCY))
        .with("date_added", row.datetime("regdate")?)
        .with("date_renews", row.datetime("nextduedate")?)
        .with(
            "date_canceled",
            if status == "canceled" {
                row.datetime("termination_date")?
            } else {
                Value::Null
            },
        ))
}

/// Domain and credentials of a service.
pub(super) async fn add_service_fields(
    row: &Row,
    service_id: LocalId,
    ctx: &mut ImportContext,
) -> Result<()> {
    let fields = [
        ("domain", row.get("domain").clone(), false),
        ("username", row.get("username").clone(), false),
        ("password", reencrypt(ctx, row.get("password"))?, true),
    ];
    for (key, value, encrypted) in fields {
        if value.is_empty() {
            continue;
        }
        let record = Record::new()
            .with("service_id", service_id)
            .with("key", key)
            .with("value", value)
            .with("serialized", 0i64)
            .with("encrypted", i64::from(encrypted));
        ctx.add(EntityType::ServiceFields, record, None).await?;
    }
    Ok(())
}

pub(super) fn invoices_query() -> RemoteQuery {
    RemoteQuery::table("tblinvoices")
        .join(Join::left("tblclients", "c", "t.userid", "id"))
        .join(currency_join("c.currency"))
        .order_by("id", SortOrder::Asc)
}

pub(super) fn invoice(row: &Row, ctx: &ImportContext) -> Result<Record> {
    let client_id = require(ctx, EntityType::Clients, row, "userid")?;
    let status = row.text_or("status", "Unpaid").to_lowercase();
    let id_code = row
        .text("invoicenum")
        .or_else(|| row.reference("id"))
        .unwrap_or_default();

    Ok(Record::new()
        .with("client_id", client_id)
        .with("id_code", id_code)
        .with("currency", row.text_or("currency_code", DEFAULT_CURRENCY))
        .with("date_billed", row.datetime("date")?)
        .with("date_due", row.datetime("duedate")?)
        .with(
            "date_closed",
            if status == "paid" {
                row.datetime("datepaid")?
            } else {
                Value::Null
            },
        )
        .with(
            "status",
            match status.as_str() {
                "draft" => "draft",
                "cancelled" => "void",
                _ => "active",
            },
        )
        .with("subtotal", row.decimal("subtotal"))
        .with("total", row.decimal("total"))
        .with("note_public", row.text("notes")))
}

pub(super) async fn add_invoice_lines(
    row: &Row,
    invoice_id: LocalId,
    ctx: &mut ImportContext,
) -> Result<()> {
    let query = RemoteQuery::table("tblinvoiceitems")
        .eq("invoiceid", row.get("id").clone())
        .order_by("id", SortOrder::Asc);
    let items = ctx.reader().fetch_all(&query).await?;

    for item in items {
        let service_id = if item.text_or("type", "").eq_ignore_ascii_case("hosting") {
            item.reference("relid")
                .and_then(|relid| ctx.identity().lookup(EntityType::Services, &relid))
        } else {
            None
        };
        let record = Record::new()
            .with("invoice_id", invoice_id)
            .with("service_id", service_id)
            .with("description", item.text_or("description", ""))
            .with("qty", 1i64)
            .with("amount", item.decimal("amount"))
            .with("taxed", item.flag("taxed"));
        ctx.add(EntityType::InvoiceLines, record, None).await?;
    }
    Ok(())
}

pub(super) fn transactions_query() -> RemoteQuery {
    RemoteQuery::table("tblaccounts")
        .join(Join::left("tblclients", "c", "t.userid", "id"))
        .join(currency_join("c.currency"))
        .join(
            Join::left("tblcurrencies", "tc", "t.currency", "id").select("code", "txn_currency"),
        )
        .order_by("id", SortOrder::Asc)
}

/// Incoming payments only; refunds and fees have no local transaction.
pub(super) async fn transaction(row: &Row, ctx: &mut ImportContext) -> Result<Option<Record>> {
    let amount = row.decimal("amountin");
    if amount <= Decimal::ZERO {
        return Ok(None);
    }
    let client_id = require(ctx, EntityType::Clients, row, "userid")?;

    let gateway_id = row
        .text("gateway")
        .and_then(|name| ctx.identity().lookup(EntityType::Gateways, &name.to_lowercase()));
    let type_id = match gateway_id {
        Some(_) => None,
        None => ctx.transaction_type_id("cash").await?,
    };
    let currency = row
        .text("txn_currency")
        .or_else(|| row.text("currency_code"))
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    Ok(Some(
        Record::new()
            .with("client_id", client_id)
            .with("amount", amount)
            .with("currency", currency)
            .with("type", "other")
            .with("gateway_id", gateway_id)
            .with("transaction_type_id", type_id)
            .with("transaction_id", row.text("transid"))
            .with("status", "approved")
            .with("date_added", row.datetime("date")?),
    ))
}

/// Apply a payment to its invoice when the invoice was migrated.
pub(super) async fn apply_transaction(
    row: &Row,
    transaction_id: LocalId,
    ctx: &mut ImportContext,
) -> Result<()> {
    let Some(invoice_id) = row
        .reference("invoiceid")
        .and_then(|remote| ctx.identity().lookup(EntityType::Invoices, &remote))
    else {
        return Ok(());
    };
    let record = Record::new()
        .with("transaction_id", transaction_id)
        .with("invoice_id", invoice_id)
        .with("amount", row.decimal("amountin"))
        .with("date", row.datetime("date")?);
    ctx.add(EntityType::TransactionApplied, record, None).await?;
    Ok(())
}
