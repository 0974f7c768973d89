//! Entity kinds known to the import engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// Identifier of a record in the foreign system.
///
/// Kept as a string: some foreign keys are codes rather than integers.
pub type RemoteId = String;

/// Identifier of a record in the local store.
pub type LocalId = u64;

/// Local entity type. Doubles as table name and identity-map bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Staff,
    ClientGroups,
    Clients,
    Contacts,
    /// Bucket only: foreign client id -> local primary contact id.
    PrimaryContacts,
    Accounts,
    Currencies,
    Taxes,
    Modules,
    ModuleRows,
    ModuleRowMeta,
    Gateways,
    GatewayMeta,
    Packages,
    Pricings,
    Coupons,
    CouponPackages,
    CouponAmounts,
    Services,
    ServiceFields,
    Invoices,
    InvoiceLines,
    Transactions,
    TransactionTypes,
    TransactionApplied,
    SupportDepartments,
    SupportTickets,
    SupportReplies,
}

impl EntityType {
    /// Every entity type, in declaration order.
    pub const ALL: &'static [EntityType] = &[
        EntityType::Staff,
        EntityType::ClientGroups,
        EntityType::Clients,
        EntityType::Contacts,
        EntityType::PrimaryContacts,
        EntityType::Accounts,
        EntityType::Currencies,
        EntityType::Taxes,
        EntityType::Modules,
        EntityType::ModuleRows,
        EntityType::ModuleRowMeta,
        EntityType::Gateways,
        EntityType::GatewayMeta,
        EntityType::Packages,
        EntityType::Pricings,
        EntityType::Coupons,
        EntityType::CouponPackages,
        EntityType::CouponAmounts,
        EntityType::Services,
        EntityType::ServiceFields,
        EntityType::Invoices,
        EntityType::InvoiceLines,
        EntityType::Transactions,
        EntityType::TransactionTypes,
        EntityType::TransactionApplied,
        EntityType::SupportDepartments,
        EntityType::SupportTickets,
        EntityType::SupportReplies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Staff => "staff",
            EntityType::ClientGroups => "client_groups",
            EntityType::Clients => "clients",
            EntityType::Contacts => "contacts",
            EntityType::PrimaryContacts => "primary_contacts",
            EntityType::Accounts => "accounts",
            EntityType::Currencies => "currencies",
            EntityType::Taxes => "taxes",
            EntityType::Modules => "modules",
            EntityType::ModuleRows => "module_rows",
            EntityType::ModuleRowMeta => "module_row_meta",
            EntityType::Gateways => "gateways",
            EntityType::GatewayMeta => "gateway_meta",
            EntityType::Packages => "packages",
            EntityType::Pricings => "pricings",
            EntityType::Coupons => "coupons",
            EntityType::CouponPackages => "coupon_packages",
            EntityType::CouponAmounts => "coupon_amounts",
            EntityType::Services => "services",
            EntityType::ServiceFields => "service_fields",
            EntityType::Invoices => "invoices",
            EntityType::InvoiceLines => "invoice_lines",
            EntityType::Transactions => "transactions",
            EntityType::TransactionTypes => "transaction_types",
            EntityType::TransactionApplied => "transaction_applied",
            EntityType::SupportDepartments => "support_departments",
            EntityType::SupportTickets => "support_tickets",
            EntityType::SupportReplies => "support_replies",
        }
    }

    /// Local table the entity is persisted to.
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::PrimaryContacts => EntityType::Contacts.as_str(),
            other => other.as_str(),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| MigrateError::Config(format!("Unknown entity type: '{}'", s)))
    }
}
