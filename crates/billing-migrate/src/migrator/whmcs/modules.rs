//! Servers, registrars and payment gateways.
//!
//! Servers and registrars both become module rows: servers carry their own
//! columns, registrar settings are pivoted from `tblregistrars` into one row
//! per registrar. Gateway settings are pivoted the same way.

use std::str::FromStr;

use crate::core::traits::RemoteReader;
use crate::core::{LocalId, Record, RemoteQuery, Row, SortOrder, Value};
use crate::engine::ImportContext;
use crate::error::Result;
use crate::mapping::ModuleKind;

use super::{by_id, pivot};

/// Remote id prefix of registrar module rows, keeping them apart from server ids.
const REGISTRAR_PREFIX: &str = "registrar:";

pub(super) async fn module_rows(reader: &dyn RemoteReader) -> Result<Vec<Row>> {
    let servers = reader.fetch_all(&by_id("tblservers")).await?;
    let mut rows = Vec::with_capacity(servers.len());

    for mut server in servers {
        let nameservers: Vec<serde_json::Value> = (1..=5)
            .filter_map(|i| server.text(&format!("nameserver{}", i)))
            .map(serde_json::Value::String)
            .collect();
        server.set("nameservers", Value::Json(serde_json::Value::Array(nameservers)));
        let module = server.text_or("type", "");
        server.set("module", module);
        server.set("kind", ModuleKind::Module.as_str());
        rows.push(server);
    }

    let settings = reader
        .fetch_all(&RemoteQuery::table("tblregistrars").order_by("registrar", SortOrder::Asc))
        .await?;
    for mut registrar in pivot(settings, "registrar") {
        let name = registrar.text_or("registrar", "");
        registrar.set("id", format!("{}{}", REGISTRAR_PREFIX, name));
        registrar.set("module", name);
        registrar.set("kind", ModuleKind::Registrar.as_str());
        rows.push(registrar);
    }
    Ok(rows)
}

/// Rows without a module name have nothing to install.
pub(super) fn module_row(row: &Row) -> Option<Record> {
    let module = row.text("module")?;
    Some(
        Record::new()
            .with("module", module)
            .with("kind", row.text_or("kind", ModuleKind::Module.as_str())),
    )
}

pub(super) async fn install_module_row(
    row: &Row,
    record: &Record,
    remote_id: Option<&str>,
    ctx: &mut ImportContext,
) -> Result<Option<LocalId>> {
    let name = record.text_or("module", "");
    let kind = ModuleKind::from_str(&record.text_or("kind", ModuleKind::Module.as_str()))?;
    let Some(module_id) = ctx.install_module(&name, kind).await? else {
        return Ok(None);
    };
    ctx.install_module_row(module_id, &name, kind, row, remote_id)
        .await
}

pub(super) async fn gateway_rows(reader: &dyn RemoteReader) -> Result<Vec<Row>> {
    let settings = reader
        .fetch_all(&RemoteQuery::table("tblpaymentgateways").order_by("order", SortOrder::Asc))
        .await?;
    Ok(pivot(settings, "gateway"))
}

pub(super) fn gateway(row: &Row) -> Option<Record> {
    let name = row.text("gateway")?;
    Some(Record::new().with("gateway", name))
}

/// The gateway registers its own identity under its lowercased name.
pub(super) async fn install_gateway(
    row: &Row,
    record: &Record,
    ctx: &mut ImportContext,
) -> Result<Option<LocalId>> {
    let name = record.text_or("gateway", "");
    ctx.install_gateway(&name, row).await
}
