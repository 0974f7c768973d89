//! End-to-end WHMCS imports against the in-memory reader and store.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;

use billing_migrate::core::traits::{EntityWriter, WriteOutcome};
use billing_migrate::drivers::{MemoryConnector, MemoryReader, MemoryStore};
use billing_migrate::engine::ErrorKind;
use billing_migrate::mapping::{AeadCipher, FieldCodec};
use billing_migrate::writer::WriterSet;
use billing_migrate::{
    ConnectionParams, EntityType, MigrateError, MigrationConfig, Migrator, MigratorArgs,
    MigratorRegistry, Record, Result, Row, RunStatus, Value,
};

const KEY: &str = "0123456789abcdef0123456789abcdef";

fn options() -> MigrationConfig {
    MigrationConfig {
        system: "whmcs".into(),
        version: "5.2".into(),
        encryption_key: KEY.into(),
        ..MigrationConfig::default()
    }
}

fn params() -> ConnectionParams {
    ConnectionParams {
        host: "db.internal".into(),
        port: 3306,
        database: "whmcs".into(),
        user: "reader".into(),
        ..ConnectionParams::default()
    }
}

async fn connected(reader: MemoryReader, store: Arc<MemoryStore>, options: MigrationConfig) -> Migrator {
    let args = MigratorArgs {
        store,
        connector: Arc::new(MemoryConnector::new(reader)),
        options,
    };
    let mut migrator = MigratorRegistry::with_builtins()
        .create("whmcs", "5.2", args)
        .unwrap();
    migrator.process_settings(&params()).await.unwrap();
    migrator
}

fn local_codec() -> FieldCodec {
    FieldCodec::new(Arc::new(AeadCipher::from_secret(KEY, "local").unwrap()))
}

fn client(id: i64, email: &str) -> Row {
    Row::new()
        .with("id", id)
        .with("firstname", format!("Client{}", id))
        .with("lastname", "Example")
        .with("email", email)
        .with("status", "Active")
        .with("currency", 1i64)
        .with("datecreated", "2012-06-01")
}

fn meta_value(store: &MemoryStore, table: &str, owner: &str, owner_id: u64, key: &str) -> Value {
    store
        .rows(table)
        .into_iter()
        .find(|r| r.int(owner) == Some(owner_id as i64) && r.text("key").as_deref() == Some(key))
        .map(|r| r.get("value").clone())
        .unwrap_or(Value::Null)
}

/// A whole installation: one of everything.
fn installation() -> MemoryReader {
    MemoryReader::new()
        .with_table(
            "tbladmins",
            vec![Row::new()
                .with("id", 1i64)
                .with("username", "admin")
                .with("firstname", "Ada")
                .with("lastname", "Admin")
                .with("email", "admin@example.com")],
        )
        .with_table(
            "tblclientgroups",
            vec![Row::new().with("id", 1i64).with("groupname", "VIP").with("groupcolour", "#fc0")],
        )
        .with_table(
            "tblclients",
            vec![
                client(1, "one@example.com").with("groupid", 1i64),
                client(2, "two@example.com")
                    .with("cardtype", "Visa")
                    .with("cardlastfour", "4242")
                    .with("expdate", "1228"),
            ],
        )
        .with_table(
            "tblcontacts",
            vec![Row::new()
                .with("id", 1i64)
                .with("userid", 1i64)
                .with("firstname", "Billing")
                .with("email", "billing@example.com")
                .with("subaccount", 0i64)],
        )
        .with_table(
            "tblcurrencies",
            vec![Row::new()
                .with("id", 1i64)
                .with("code", "USD")
                .with("prefix", "$")
                .with("format", 1i64)
                .with("rate", Decimal::ONE)
                .with("default", 1i64)],
        )
        .with_table(
            "tbltax",
            vec![Row::new()
                .with("id", 1i64)
                .with("level", 1i64)
                .with("name", "VAT")
                .with("taxrate", Decimal::new(20, 0))],
        )
        .with_table(
            "tblservers",
            vec![Row::new()
                .with("id", 1i64)
                .with("name", "web1")
                .with("type", "cpanel")
                .with("hostname", "")
                .with("ipaddress", "10.0.0.5")
                .with("username", "root")
                .with("accesshash", "HASH")
                .with("nameserver1", "ns1.example.com")],
        )
        .with_table(
            "tblpaymentgateways",
            vec![
                Row::new().with("gateway", "paypal").with("setting", "name").with("value", "PayPal").with("order", 1i64),
                Row::new().with("gateway", "paypal").with("setting", "email").with("value", "pay@example.com").with("order", 1i64),
            ],
        )
        .with_table(
            "tblproducts",
            vec![Row::new()
                .with("id", 1i64)
                .with("name", "Basic")
                .with("servertype", "cpanel")
                .with("paytype", "recurring")],
        )
        .with_table(
            "tblpricing",
            vec![Row::new()
                .with("id", 1i64)
                .with("type", "product")
                .with("relid", 1i64)
                .with("currency", 1i64)
                .with("monthly", Decimal::new(500, 2))
                .with("quarterly", Decimal::new(-100, 2))
                .with("annually", Decimal::new(5000, 2))],
        )
        .with_table(
            "tblhosting",
            vec![Row::new()
                .with("id", 1i64)
                .with("userid", 1i64)
                .with("packageid", 1i64)
                .with("server", 1i64)
                .with("billingcycle", "Monthly")
                .with("domainstatus", "Active")
                .with("domain", "example.com")
                .with("username", "example")
                .with("password", "s3cret")
                .with("amount", Decimal::new(500, 2))
                .with("regdate", "2013-01-01")
                .with("nextduedate", "2013-02-01")],
        )
        .with_table(
            "tblinvoices",
            vec![Row::new()
                .with("id", 1i64)
                .with("userid", 1i64)
                .with("date", "2013-01-01")
                .with("duedate", "2013-01-08")
                .with("datepaid", "2013-01-02 10:00:00")
                .with("status", "Paid")
                .with("subtotal", Decimal::new(500, 2))
                .with("total", Decimal::new(500, 2))],
        )
        .with_table(
            "tblinvoiceitems",
            vec![Row::new()
                .with("id", 1i64)
                .with("invoiceid", 1i64)
                .with("type", "Hosting")
                .with("relid", 1i64)
                .with("description", "Basic (example.com)")
                .with("amount", Decimal::new(500, 2))],
        )
        .with_table(
            "tblaccounts",
            vec![
                Row::new()
                    .with("id", 1i64)
                    .with("userid", 1i64)
                    .with("currency", 0i64)
                    .with("gateway", "paypal")
                    .with("amountin", Decimal::new(500, 2))
                    .with("transid", "TX-1")
                    .with("invoiceid", 1i64)
                    .with("date", "2013-01-02 10:00:00"),
                Row::new()
                    .with("id", 2i64)
                    .with("userid", 1i64)
                    .with("amountin", Decimal::ZERO)
                    .with("date", "2013-01-03 10:00:00"),
            ],
        )
        .with_table(
            "tblticketdepartments",
            vec![Row::new().with("id", 1i64).with("name", "Support").with("email", "support@example.com")],
        )
        .with_table(
            "tbltickets",
            vec![Row::new()
                .with("id", 1i64)
                .with("tid", "ABC-123")
                .with("did", 1i64)
                .with("userid", 1i64)
                .with("title", "Help")
                .with("message", "My site is down")
                .with("urgency", "High")
                .with("status", "Open")
                .with("date", "2013-01-03 09:00:00")],
        )
        .with_table(
            "tblticketreplies",
            vec![Row::new()
                .with("id", 1i64)
                .with("tid", 1i64)
                .with("adminid", 1i64)
                .with("message", "Looking into it")
                .with("date", "2013-01-03 09:30:00")],
        )
}

#[tokio::test]
async fn test_full_installation_imports_cleanly() {
    let store = Arc::new(MemoryStore::new());
    let mut migrator = connected(installation(), store.clone(), options()).await;
    let report = migrator.import().await.unwrap();

    assert!(report.errors.is_empty(), "unexpected errors: {:?}", report.errors);
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(store.rows("clients").len(), 2);
    assert_eq!(store.rows("contacts").len(), 3);
    assert_eq!(store.rows("accounts").len(), 1);
    assert_eq!(store.rows("pricings").len(), 2);
    assert_eq!(store.rows("services").len(), 1);
    assert_eq!(store.rows("service_fields").len(), 3);
    assert_eq!(store.rows("invoice_lines").len(), 1);
    assert_eq!(store.rows("transactions").len(), 1);
    assert_eq!(store.rows("transaction_applied").len(), 1);
    assert_eq!(store.rows("support_replies").len(), 2);

    let service = &store.rows("services")[0];
    let line = &store.rows("invoice_lines")[0];
    assert_eq!(line.int("service_id"), service.int("id"));

    let transaction = &store.rows("transactions")[0];
    assert_eq!(transaction.int("gateway_id"), store.rows("gateways")[0].int("id"));
    assert_eq!(transaction.text("currency").as_deref(), Some("USD"));

    let password = store
        .rows("service_fields")
        .into_iter()
        .find(|r| r.text("key").as_deref() == Some("password"))
        .unwrap();
    assert_ne!(password.text("value").as_deref(), Some("s3cret"));
    assert_eq!(local_codec().decrypt(password.get("value")).unwrap(), Value::text("s3cret"));

    assert_eq!(migrator.identity().lookup(EntityType::Clients, "2"), Some(2));
    assert_eq!(report.mapped.get(&EntityType::Services), Some(&1));
}

#[tokio::test]
async fn test_duplicate_email_client_is_rejected_and_reported() {
    let reader = MemoryReader::new().with_table(
        "tblclients",
        vec![
            client(1, "shared@example.com"),
            client(2, "shared@example.com"),
            client(3, "third@example.com"),
        ],
    );
    let store = Arc::new(MemoryStore::new());
    let mut migrator = connected(reader, store.clone(), options()).await;
    let report = migrator.import().await.unwrap();

    assert_eq!(store.rows("clients").len(), 2);
    assert_eq!(migrator.identity().len(EntityType::Clients), 2);
    assert_eq!(migrator.identity().lookup(EntityType::Clients, "2"), None);

    let errors = migrator.errors();
    assert_eq!(errors.len(), 1);
    let entry = &errors.as_slice()[0];
    assert_eq!(entry.remote_id.as_deref(), Some("2"));
    assert_eq!(entry.kind, ErrorKind::Validation);
    assert_eq!(entry.fields.messages("email").len(), 1);
    assert_eq!(report.status, RunStatus::CompletedWithErrors);
}

#[tokio::test]
async fn test_client_clashing_with_existing_local_email_is_reported() {
    let store = Arc::new(MemoryStore::new());
    store
        .seed(
            "clients",
            Record::new()
                .with("company_id", 1i64)
                .with("email", "taken@example.com"),
        )
        .unwrap();
    let reader = MemoryReader::new().with_table(
        "tblclients",
        vec![
            client(1, "first@example.com"),
            client(2, "taken@example.com"),
            client(3, "third@example.com"),
        ],
    );
    let mut migrator = connected(reader, store.clone(), options()).await;
    let report = migrator.import().await.unwrap();

    // One seeded row plus two imported ones.
    assert_eq!(store.rows("clients").len(), 3);
    assert_eq!(migrator.identity().len(EntityType::Clients), 2);
    assert!(migrator.identity().lookup(EntityType::Clients, "1").is_some());
    assert_eq!(migrator.identity().lookup(EntityType::Clients, "2"), None);
    assert!(migrator.identity().lookup(EntityType::Clients, "3").is_some());

    let errors = migrator.errors();
    assert_eq!(errors.len(), 1);
    let entry = &errors.as_slice()[0];
    assert_eq!(entry.remote_id.as_deref(), Some("2"));
    assert_eq!(entry.kind, ErrorKind::Validation);
    assert_eq!(entry.fields.messages("email").len(), 1);
    assert_eq!(report.status, RunStatus::CompletedWithErrors);
}

/// Client writer that fails on one address.
struct RefusingWriter {
    inner: Arc<dyn EntityWriter>,
}

#[async_trait]
impl EntityWriter for RefusingWriter {
    fn entity(&self) -> EntityType {
        EntityType::Clients
    }

    async fn create(&self, record: &Record) -> Result<WriteOutcome> {
        if record.text("email").as_deref() == Some("refused@example.com") {
            return Err(MigrateError::local("deadlock found", "inserting client"));
        }
        self.inner.create(record).await
    }
}

#[tokio::test]
async fn test_failed_row_is_isolated_with_one_error() {
    let reader = MemoryReader::new().with_table(
        "tblclients",
        vec![
            client(1, "one@example.com"),
            client(2, "refused@example.com"),
            client(3, "three@example.com"),
        ],
    );
    let store = Arc::new(MemoryStore::new());
    let inner = WriterSet::standard(store.clone())
        .get(EntityType::Clients)
        .unwrap();
    let mut migrator = connected(reader, store.clone(), options())
        .await
        .with_writer(Arc::new(RefusingWriter { inner }));
    migrator.import().await.unwrap();

    assert_eq!(store.rows("clients").len(), 2);
    assert_eq!(migrator.identity().lookup(EntityType::Clients, "3"), Some(2));
    assert_eq!(store.reset_count(), 1);

    let errors = migrator.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.count(ErrorKind::Exception), 1);
    assert_eq!(errors.as_slice()[0].remote_id.as_deref(), Some("2"));
    assert!(errors.as_slice()[0].message().contains("deadlock"));
}

#[tokio::test]
async fn test_module_lookup_falls_back_and_memoizes() {
    let server = |id: i64, kind: &str| {
        Row::new()
            .with("id", id)
            .with("name", format!("srv{}", id))
            .with("type", kind)
            .with("hostname", format!("srv{}.example.com", id))
    };
    let reader = MemoryReader::new().with_table(
        "tblservers",
        vec![
            server(1, "cpanel"),
            server(2, "cpanel"),
            server(3, "cpanel3"),
            server(4, "directadmin"),
        ],
    );
    let store = Arc::new(MemoryStore::new());
    let mut migrator = connected(reader, store.clone(), options()).await;
    migrator.import().await.unwrap();

    let mut classes: Vec<String> = store
        .rows("modules")
        .iter()
        .filter_map(|m| m.text("class"))
        .collect();
    classes.sort();
    assert_eq!(classes, vec!["cpanel", "generic_server"]);
    assert_eq!(store.rows("module_rows").len(), 4);
    assert!(migrator.errors().is_empty());

    let cpanel = store.rows("modules")[0].int("id");
    let rows = store.rows("module_rows");
    assert!(rows.iter().take(3).all(|r| r.int("module_id") == cpanel));
}

#[tokio::test]
async fn test_alternate_source_and_encrypted_settings_round_trip() {
    let reader = MemoryReader::new()
        .with_table(
            "tblservers",
            vec![Row::new()
                .with("id", 1i64)
                .with("name", "web1")
                .with("type", "cpanel")
                .with("hostname", "  ")
                .with("ipaddress", "192.0.2.10")
                .with("accesshash", "HASH")
                .with("nameserver1", "ns1.example.com")
                .with("nameserver2", "ns2.example.com")],
        )
        .with_table(
            "tblpaymentgateways",
            vec![
                Row::new().with("gateway", "stripe").with("setting", "publishableKey").with("value", "pk_1"),
                Row::new().with("gateway", "stripe").with("setting", "secretKey").with("value", "sk_1"),
            ],
        );
    let store = Arc::new(MemoryStore::new());
    let mut migrator = connected(reader, store.clone(), options()).await;
    migrator.import().await.unwrap();
    let codec = local_codec();

    let host = meta_value(&store, "module_row_meta", "module_row_id", 1, "host_name");
    assert_eq!(host, Value::text("192.0.2.10"));
    let nameservers = meta_value(&store, "module_row_meta", "module_row_id", 1, "name_servers");
    assert_eq!(
        codec.deserialize(&nameservers).unwrap(),
        Value::Json(json!(["ns1.example.com", "ns2.example.com"]))
    );

    let gateway = &store.rows("gateways")[0];
    assert_eq!(gateway.text("class").as_deref(), Some("stripe"));
    let stored = meta_value(&store, "gateway_meta", "gateway_id", 1, "settings");
    let plain = codec.deserialize(&codec.decrypt(&stored).unwrap()).unwrap();
    assert_eq!(plain, Value::Json(json!({"publishableKey": "pk_1", "secretKey": "sk_1"})));
}

#[tokio::test]
async fn test_mapping_dir_overrides_builtin_mapping() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("directadmin.yaml"),
        "class: directadmin\ntype: module\nname: DirectAdmin\nmodule_row_meta:\n  - key: login\n    source: username\n    encrypted: true\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("broken.yaml"), "class: [").unwrap();

    let reader = MemoryReader::new().with_table(
        "tblservers",
        vec![Row::new().with("id", 1i64).with("type", "directadmin").with("username", "da")],
    );
    let store = Arc::new(MemoryStore::new());
    let options = MigrationConfig {
        mappings_dir: Some(dir.path().to_path_buf()),
        ..options()
    };
    let mut migrator = connected(reader, store.clone(), options).await;
    migrator.import().await.unwrap();

    assert_eq!(store.rows("modules")[0].text("class").as_deref(), Some("directadmin"));
    let login = meta_value(&store, "module_row_meta", "module_row_id", 1, "login");
    assert_eq!(local_codec().decrypt(&login).unwrap(), Value::text("da"));
}

#[tokio::test]
async fn test_second_run_inserts_pricing_again() {
    let reader = || {
        MemoryReader::new()
            .with_table(
                "tblproducts",
                vec![Row::new().with("id", 7i64).with("name", "Pro").with("servertype", "cpanel")],
            )
            .with_table(
                "tblpricing",
                vec![Row::new()
                    .with("id", 1i64)
                    .with("type", "product")
                    .with("relid", 7i64)
                    .with("monthly", Decimal::new(1000, 2))
                    .with("annually", Decimal::new(10000, 2))],
            )
    };
    let store = Arc::new(MemoryStore::new());

    let mut first = connected(reader(), store.clone(), options()).await;
    first.import().await.unwrap();
    assert_eq!(store.rows("pricings").len(), 2);

    let mut second = connected(reader(), store.clone(), options()).await;
    second.import().await.unwrap();
    assert_eq!(store.rows("pricings").len(), 4);
    assert_eq!(store.rows("packages").len(), 2);
    assert_eq!(store.rows("modules").len(), 1);
}

#[tokio::test]
async fn test_reused_packages_are_not_created() {
    let reader = MemoryReader::new()
        .with_table("tblclients", vec![client(1, "one@example.com")])
        .with_table(
            "tblproducts",
            vec![Row::new().with("id", 7i64).with("name", "Pro").with("servertype", "cpanel")],
        )
        .with_table(
            "tblhosting",
            vec![Row::new()
                .with("id", 1i64)
                .with("userid", 1i64)
                .with("packageid", 7i64)
                .with("billingcycle", "Annually")
                .with("domainstatus", "Active")],
        );
    let store = Arc::new(MemoryStore::new());
    let package = store
        .seed("packages", Record::new().with("company_id", 1i64).with("name", "Local Pro"))
        .unwrap();
    let pricing = store
        .seed(
            "pricings",
            Record::new()
                .with("package_id", package)
                .with("term", 1i64)
                .with("period", "year")
                .with("currency", "USD"),
        )
        .unwrap();

    let mut migrator = connected(reader, store.clone(), options()).await;
    let options = billing_migrate::ImportOptions {
        reuse_packages: true,
        package_overrides: [("7".to_string(), package)].into_iter().collect(),
    };
    migrator.process_configuration(&options).unwrap();
    migrator.import().await.unwrap();

    assert!(migrator.errors().is_empty(), "{:?}", migrator.errors());
    assert_eq!(store.rows("packages").len(), 1);
    assert_eq!(store.rows("services")[0].int("pricing_id"), Some(pricing as i64));
}

#[tokio::test]
async fn test_remapping_an_imported_client_is_a_conflict() {
    let reader = MemoryReader::new().with_table("tblclients", vec![client(1, "one@example.com")]);
    let store = Arc::new(MemoryStore::new());
    let mut migrator = connected(reader, store.clone(), options()).await;
    migrator.import().await.unwrap();

    let mut identity = migrator.identity().clone();
    identity.remember(EntityType::Clients, "1", 1).unwrap();
    let err = identity.remember(EntityType::Clients, "1", 99).unwrap_err();
    assert!(matches!(err, MigrateError::IdentityConflict { existing: 1, attempted: 99, .. }));
    assert_eq!(identity.lookup(EntityType::Clients, "1"), Some(1));
}
