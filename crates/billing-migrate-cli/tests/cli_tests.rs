//! CLI integration tests for billing-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that need no database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the billing-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("billing-migrate").unwrap()
}

fn config_file(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn valid_config(system: &str) -> tempfile::NamedTempFile {
    config_file(&format!(
        r#"
migration:
  system: {}
  version: "5.2"
  encryption_key: "0123456789abcdef0123456789abcdef"
source:
  host: 127.0.0.1
  database: whmcs
  user: whmcs
"#,
        system
    ))
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("health-check"))
        .stdout(predicate::str::contains("settings"))
        .stdout(predicate::str::contains("resolve-mapping"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--param"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("billing-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_exist() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--debug"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_log_format_and_verbosity_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_file_exit_code() {
    cmd()
        .args(["-c", "/nonexistent/config.yaml", "run", "--dry-run"])
        .assert()
        .failure()
        .code(7); // EXIT_IO_ERROR
}

#[test]
fn test_invalid_yaml_exit_code() {
    let file = config_file("this is not: valid: yaml: content:");
    cmd()
        .args(["-c", file.path().to_str().unwrap(), "run", "--dry-run"])
        .assert()
        .failure()
        .code(1); // EXIT_CONFIG_ERROR
}

#[test]
fn test_missing_required_fields_exit_code() {
    let file = config_file("migration:\n  system: whmcs\nsource:\n  host: db\n");
    cmd()
        .args(["-c", file.path().to_str().unwrap(), "run", "--dry-run"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_short_encryption_key_is_rejected() {
    let file = config_file(
        "migration:\n  system: whmcs\n  version: \"5.2\"\n  encryption_key: short\nsource:\n  host: db\n  database: whmcs\n  user: root\n",
    );
    cmd()
        .args(["-c", file.path().to_str().unwrap(), "settings"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("encryption_key"));
}

#[test]
fn test_unknown_migrator_exit_code() {
    let file = valid_config("hostbill");
    cmd()
        .args(["-c", file.path().to_str().unwrap(), "run", "--dry-run"])
        .assert()
        .failure()
        .code(6) // EXIT_MIGRATOR_ERROR
        .stderr(predicate::str::contains("whmcs 5.2"));
}

#[test]
fn test_malformed_param_exit_code() {
    let file = valid_config("whmcs");
    cmd()
        .args([
            "-c",
            file.path().to_str().unwrap(),
            "run",
            "--dry-run",
            "--param",
            "port=not-a-port",
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("port must be a number"));
}

#[test]
fn test_no_subcommand_shows_error() {
    cmd().assert().failure();
}

// =============================================================================
// Settings Tests
// =============================================================================

#[test]
fn test_settings_lists_connection_fields() {
    let file = valid_config("whmcs");
    cmd()
        .args(["-c", file.path().to_str().unwrap(), "settings"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Settings for whmcs 5.2"))
        .stdout(predicate::str::contains("charset_query"))
        .stdout(predicate::str::contains("password"))
        .stdout(predicate::str::contains("checkbox"));
}

#[test]
fn test_settings_as_json() {
    let file = valid_config("whmcs");
    let output = cmd()
        .args(["-c", file.path().to_str().unwrap(), "--output-json", "settings"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let fields: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let fields = fields.as_array().unwrap();
    assert_eq!(fields.len(), 8);
    assert_eq!(fields[0]["field"], "host");
    assert_eq!(fields[0]["label"], "Database Host");
    assert_eq!(fields[3]["type"], "password");
    assert_eq!(fields[7]["field"], "enable_debug");
}

#[test]
fn test_debug_stream_keeps_json_stdout_clean() {
    let file = valid_config("whmcs");
    let assert = cmd()
        .args([
            "-c",
            file.path().to_str().unwrap(),
            "--debug",
            "--output-json",
            "settings",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("Loaded configuration"));

    let output = assert.get_output();
    let fields: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(fields.as_array().unwrap().len(), 8);
}

// =============================================================================
// Mapping Resolution Tests
// =============================================================================

#[test]
fn test_resolve_versioned_module_name() {
    cmd()
        .args(["-c", "/nonexistent/config.yaml", "resolve-mapping", "cpanel3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cpanel3 (module) -> cpanel [version_stripped]"));
}

#[test]
fn test_resolve_unknown_gateway_falls_back_to_generic() {
    let output = cmd()
        .args([
            "-c",
            "/nonexistent/config.yaml",
            "--output-json",
            "resolve-mapping",
            "Stripe",
            "--kind",
            "gateway",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let result: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(result["matched"], "generic");
    assert_eq!(result["target_class"], "stripe");
}

#[test]
fn test_resolve_mapping_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("directadmin.yaml"),
        "class: directadmin\ntype: module\nversion: \"1.0\"\nmodule_row_meta: []\n",
    )
    .unwrap();

    cmd()
        .args([
            "-c",
            "/nonexistent/config.yaml",
            "resolve-mapping",
            "directadmin",
            "--mappings-dir",
            dir.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("[exact]"));
}

#[test]
fn test_resolve_mapping_unknown_kind_exit_code() {
    cmd()
        .args([
            "-c",
            "/nonexistent/config.yaml",
            "resolve-mapping",
            "cpanel",
            "--kind",
            "mailbox",
        ])
        .assert()
        .failure()
        .code(5) // EXIT_MAPPING_ERROR
        .stderr(predicate::str::contains("Unknown module type"));
}
