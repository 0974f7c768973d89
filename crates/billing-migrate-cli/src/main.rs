//! billing-migrate CLI - import a legacy billing system into the local schema.

mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use billing_migrate::core::traits::LocalStore;
use billing_migrate::drivers::{MemoryStore, MysqlConnector, MysqlStore};
use billing_migrate::mapping::{
    CallbackRegistry, MappingCatalog, MatchKind, ModuleKind, PassthroughCipher,
};
use billing_migrate::{
    Config, DebugSink, ImportOptions, ImportReport, MigrateError, Migrator, MigratorArgs,
    MigratorRegistry, RunStatus,
};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

use logging::DebugLogLayer;

#[derive(Parser)]
#[command(name = "billing-migrate")]
#[command(about = "Import a legacy billing system into the local billing schema")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    /// Stream debug lines to stderr while importing
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import the foreign system configured in the config file
    Run {
        /// Import into an in-memory store instead of the local database
        #[arg(long)]
        dry_run: bool,

        /// Override a connection setting (repeatable), e.g. --param host=db1
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Test the foreign and local database connections
    HealthCheck,

    /// Print the connection settings form of the configured migrator
    Settings,

    /// Show which mapping file a foreign module name resolves to
    ResolveMapping {
        /// Foreign module, registrar or gateway name (e.g. cpanel3)
        name: String,

        /// Integration kind: module, registrar or gateway
        #[arg(long, default_value = "module")]
        kind: String,

        /// Additional mapping directory, overriding the configured one
        #[arg(long)]
        mappings_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    let debug_sink = cli.debug.then(DebugSink::stderr);
    setup_logging(&cli.verbosity, &cli.log_format, debug_sink.clone())?;

    match &cli.command {
        Commands::ResolveMapping {
            name,
            kind,
            mappings_dir,
        } => resolve_mapping(&cli, name, kind, mappings_dir.as_deref()),
        Commands::Settings => {
            let config = load_config(&cli.config)?;
            let migrator = create_migrator(&config, Arc::new(MemoryStore::new()))?;
            print_settings(&migrator, cli.output_json)
        }
        Commands::HealthCheck => health_check(&cli).await,
        Commands::Run { dry_run, params } => {
            import(&cli, *dry_run, params, debug_sink).await
        }
    }
}

fn load_config(path: &Path) -> Result<Config, MigrateError> {
    let config = Config::load(path)?;
    info!("Loaded configuration from {:?}", path);
    Ok(config)
}

fn create_migrator(config: &Config, store: Arc<dyn LocalStore>) -> Result<Migrator, MigrateError> {
    let args = MigratorArgs {
        store,
        connector: Arc::new(MysqlConnector),
        options: config.migration.clone(),
    };
    Ok(MigratorRegistry::with_builtins()
        .create(&config.migration.system, &config.migration.version, args)?
        .with_config_hash(config.hash()))
}

/// Apply `--param key=value` overrides to the loaded config.
fn apply_params(config: &mut Config, params: &[String]) -> Result<(), MigrateError> {
    for param in params {
        let (key, value) = param.split_once('=').ok_or_else(|| {
            MigrateError::Config(format!("--param expects KEY=VALUE, got '{}'", param))
        })?;
        let key = key.trim();
        if key == "enable_debug" {
            config.migration.enable_debug = parse_flag(value)?;
        } else {
            config.source.set_field(key, value)?;
        }
    }
    Ok(())
}

fn parse_flag(value: &str) -> Result<bool, MigrateError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(MigrateError::Config(format!(
            "enable_debug must be true or false, got '{}'",
            other
        ))),
    }
}

async fn open_store(config: &Config, dry_run: bool) -> Result<Arc<dyn LocalStore>, MigrateError> {
    match (&config.local.url, dry_run) {
        (Some(url), false) => Ok(Arc::new(MysqlStore::connect(url).await?)),
        (None, false) => {
            warn!("No local.url configured; importing into memory");
            Ok(Arc::new(MemoryStore::new()))
        }
        (_, true) => {
            info!("Dry run: importing into memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn import(
    cli: &Cli,
    dry_run: bool,
    params: &[String],
    debug_sink: Option<DebugSink>,
) -> Result<(), MigrateError> {
    let mut config = load_config(&cli.config)?;
    apply_params(&mut config, params)?;
    config.validate()?;

    let store = open_store(&config, dry_run).await?;
    let mut migrator = create_migrator(&config, store)?;
    // stdout is reserved for the report.
    let debug_sink =
        debug_sink.or_else(|| config.migration.enable_debug.then(DebugSink::stderr));
    if let Some(sink) = debug_sink {
        migrator = migrator.with_debug_sink(sink);
    }

    migrator.process_settings(&config.source).await?;
    migrator.process_configuration(&ImportOptions::from(&config.migration))?;
    let result = migrator.import().await;
    migrator.close().await;
    let report = result?;

    if cli.output_json {
        println!("{}", report.to_json()?);
    } else {
        print_report(&report, dry_run);
    }
    Ok(())
}

fn print_report(report: &ImportReport, dry_run: bool) {
    let status_msg = match (report.status, dry_run) {
        (RunStatus::TimedOut, _) => "Import stopped: time limit reached",
        (_, true) => "Dry run completed!",
        (RunStatus::CompletedWithErrors, false) => "Import completed with errors",
        (RunStatus::Completed, false) => "Import completed!",
    };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", report.run_id);
    println!("  Migrator: {} {}", report.system, report.version);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!("  Rows written: {}", report.rows_written());
    for (entity, count) in &report.mapped {
        println!("    {:<24} {}", entity.to_string(), count);
    }
    if !report.errors.is_empty() {
        println!(
            "  Errors: {} ({} validation, {} exceptions)",
            report.errors.len(),
            report.validation_errors,
            report.exceptions
        );
        for error in report.errors.iter() {
            println!("    {}", error);
        }
    }
}

async fn health_check(cli: &Cli) -> Result<(), MigrateError> {
    let config = load_config(&cli.config)?;
    let store: Result<Arc<dyn LocalStore>, MigrateError> = match &config.local.url {
        Some(url) => MysqlStore::connect(url)
            .await
            .map(|s| Arc::new(s) as Arc<dyn LocalStore>),
        None => Ok(Arc::new(MemoryStore::new())),
    };
    let local_ok = store.is_ok();
    if let Err(e) = &store {
        warn!("Local store: {}", e);
    }

    let store = store.unwrap_or_else(|_| Arc::new(MemoryStore::new()) as Arc<dyn LocalStore>);
    let mut migrator = create_migrator(&config, store)?;
    let source = match migrator.process_settings(&config.source).await {
        Ok(()) => migrator.health_check().await,
        Err(e) => Err(e),
    };
    migrator.close().await;
    let source_ok = source.is_ok();
    if let Err(e) = &source {
        warn!("Source: {}", e);
    }

    if cli.output_json {
        let result = serde_json::json!({
            "source": {
                "host": config.source.host,
                "database": config.source.database,
                "ok": source_ok,
                "error": source.as_ref().err().map(|e| e.to_string()),
            },
            "local": {
                "store": if config.local.url.is_some() { "mysql" } else { "memory" },
                "ok": local_ok,
            },
            "healthy": source_ok && local_ok,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Source ({}/{}): {}",
            config.source.host,
            config.source.database,
            if source_ok { "OK" } else { "FAILED" }
        );
        println!("Local: {}", if local_ok { "OK" } else { "FAILED" });
    }

    match source {
        Err(e) => Err(e),
        Ok(()) if !local_ok => Err(MigrateError::local(
            "Local store is not reachable",
            "health check",
        )),
        Ok(()) => Ok(()),
    }
}

fn print_settings(migrator: &Migrator, output_json: bool) -> Result<(), MigrateError> {
    let fields = migrator.settings_fields();
    if output_json {
        println!("{}", serde_json::to_string_pretty(fields)?);
        return Ok(());
    }
    println!("Settings for {} {}:", migrator.system(), migrator.version());
    for field in fields {
        let kind = serde_json::to_value(field.kind)?;
        println!(
            "  {:<16} {:<22} {}",
            field.field,
            field.label,
            kind.as_str().unwrap_or_default()
        );
    }
    Ok(())
}

fn resolve_mapping(
    cli: &Cli,
    name: &str,
    kind: &str,
    mappings_dir: Option<&Path>,
) -> Result<(), MigrateError> {
    let kind: ModuleKind = kind.parse()?;
    let callbacks = CallbackRegistry::with_builtins(Arc::new(PassthroughCipher));
    let mut catalog = MappingCatalog::builtin(&callbacks)?;

    let configured = if mappings_dir.is_none() && cli.config.exists() {
        Config::load(&cli.config)?.migration.mappings_dir
    } else {
        None
    };
    if let Some(dir) = mappings_dir.or(configured.as_deref()) {
        let loaded = catalog.load_dir(dir, &callbacks)?;
        info!("Loaded {} mapping files from {:?}", loaded, dir);
    }

    let resolved = catalog.lookup(name, kind).ok_or_else(|| {
        MigrateError::Mapping(format!("No {} mapping matches '{}'", kind.as_str(), name))
    })?;
    let matched = match resolved.matched {
        MatchKind::Exact => "exact",
        MatchKind::VersionStripped => "version_stripped",
        MatchKind::Generic => "generic",
    };
    let mapping = resolved.mapping;
    let keys: Vec<&str> = mapping.meta_rules().iter().map(|r| r.key.as_str()).collect();

    if cli.output_json {
        let result = serde_json::json!({
            "name": name,
            "kind": kind.as_str(),
            "class": mapping.class,
            "matched": matched,
            "target_class": mapping.target_class_for(name),
            "meta_keys": keys,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{} ({}) -> {} [{}]", name, kind.as_str(), mapping.class, matched);
        println!("  Local class: {}", mapping.target_class_for(name));
        println!("  Meta keys: {}", keys.join(", "));
    }
    Ok(())
}

fn setup_logging(
    verbosity: &str,
    format: &str,
    debug_sink: Option<DebugSink>,
) -> Result<(), MigrateError> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so `--output-json` keeps stdout parseable.
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if format == "json" {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(debug_sink.map(DebugLogLayer::new))
        .with(LevelFilter::from_level(level))
        .try_init()
        .map_err(|e| MigrateError::Config(format!("Failed to initialize logging: {}", e)))
}
