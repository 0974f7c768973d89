//! Support departments, tickets and replies.

use crate::core::{EntityType, LocalId, Record, RemoteQuery, Row, SortOrder, Value};
use crate::engine::ImportContext;
use crate::error::Result;

use super::{optional, require};

pub(super) fn department(row: &Row, ctx: &ImportContext) -> Record {
    Record::new()
        .with("company_id", ctx.company_id())
        .with("name", row.text_or("name", ""))
        .with("description", row.text("description"))
        .with("email", row.text("email"))
        .with("method", "none")
        .with("clients_only", row.flag("clientsonly"))
        .with("status", if row.flag("hidden") { "hidden" } else { "visible" })
}

fn priority(urgency: &str) -> &'static str {
    match urgency.trim().to_lowercase().as_str() {
        "low" => "low",
        "high" => "high",
        _ => "medium",
    }
}

fn ticket_status(status: &str) -> &'static str {
    match status.trim().to_lowercase().as_str() {
        "open" | "customer-reply" => "open",
        "answered" => "awaiting_reply",
        "on hold" | "in progress" => "in_progress",
        _ => "closed",
    }
}

pub(super) fn ticket(row: &Row, ctx: &ImportContext) -> Result<Record> {
    let department_id = require(ctx, EntityType::SupportDepartments, row, "did")?;
    let client_id = optional(ctx, EntityType::Clients, row, "userid")?;
    let status = ticket_status(&row.text_or("status", "Closed"));
    let date_closed = if status == "closed" {
        row.datetime("lastreply")?
    } else {
        Value::Null
    };

    Ok(Record::new()
        .with("code", row.text_or("tid", ""))
        .with("department_id", department_id)
        .with("client_id", client_id)
        .with("email", row.text("email"))
        .with("summary", row.text_or("title", ""))
        .with("priority", priority(&row.text_or("urgency", "Medium")))
        .with("status", status)
        .with("date_added", row.datetime("date")?)
        .with("date_closed", date_closed))
}

/// Authors that were not migrated leave the reply unattributed.
fn reply(ticket_id: LocalId, row: &Row, ctx: &ImportContext) -> Result<Record> {
    let lookup = |entity: EntityType, column: &str| {
        row.reference(column)
            .and_then(|remote| ctx.identity().lookup(entity, &remote))
    };
    let staff_id = lookup(EntityType::Staff, "adminid");
    let contact_id = match staff_id {
        Some(_) => None,
        None => lookup(EntityType::PrimaryContacts, "userid"),
    };
    Ok(Record::new()
        .with("ticket_id", ticket_id)
        .with("staff_id", staff_id)
        .with("contact_id", contact_id)
        .with("type", "reply")
        .with("details", row.text_or("message", ""))
        .with("date_added", row.datetime("date")?))
}

/// The ticket's own message is its first reply; `tblticketreplies` follow.
pub(super) async fn add_replies(
    row: &Row,
    ticket_id: LocalId,
    ctx: &mut ImportContext,
) -> Result<()> {
    let query = RemoteQuery::table("tblticketreplies")
        .eq("tid", row.get("id").clone())
        .order_by("date", SortOrder::Asc)
        .order_by("id", SortOrder::Asc);
    let mut messages = vec![row.clone()];
    messages.extend(ctx.reader().fetch_all(&query).await?);

    for message in &messages {
        if message.text("message").is_none() {
            continue;
        }
        let record = reply(ticket_id, message, ctx)?;
        ctx.add(EntityType::SupportReplies, record, None).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_statuses() {
        assert_eq!(ticket_status("Customer-Reply"), "open");
        assert_eq!(ticket_status("Answered"), "awaiting_reply");
        assert_eq!(ticket_status("Closed"), "closed");
        assert_eq!(priority("URGENT"), "medium");
    }
}
