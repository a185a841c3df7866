//! CLI integration tests.
//!
//! These run the built `dustline` binary. None of them need a running
//! monitoring service.

use std::path::Path;
use std::process::{Command, Output};

fn run_dustline(args: &[&str], config: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dustline"))
        .args(args)
        .env("DUSTLINE_CONFIG", config)
        .env_remove("DUSTLINE_SERVER")
        .env_remove("DUSTLINE_DEVICE")
        .env_remove("DUSTLINE_DATABASE")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to run dustline binary")
}

#[test]
fn test_help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_dustline(&["--help"], &dir.path().join("config.toml"));

    assert!(output.status.success(), "Help should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["watch", "simulation", "status", "config", "completions"] {
        assert!(stdout.contains(cmd), "Help should list {}", cmd);
    }
}

#[test]
fn test_version_command() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_dustline(&["--version"], &dir.path().join("config.toml"));

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("dustline"));
}

#[test]
fn test_subcommand_help() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    for cmd in ["watch", "simulation", "status", "config"] {
        let output = run_dustline(&[cmd, "--help"], &config);
        assert!(output.status.success(), "{} --help should succeed", cmd);
        assert!(!output.stdout.is_empty(), "{} --help should produce output", cmd);
    }
}

#[test]
fn test_config_init_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    let output = run_dustline(&["config", "init"], &config);
    assert!(output.status.success());
    assert!(config.exists());

    let output = run_dustline(&["config", "show"], &config);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("server_url = \"http://localhost:8000\""));
    assert!(stdout.contains("pm2_5_concentration"));

    // A second init refuses to overwrite.
    let output = run_dustline(&["config", "init"], &config);
    assert!(!output.status.success());
}

#[test]
fn test_config_path_honours_override() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("custom.toml");
    let output = run_dustline(&["config", "path"], &config);

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        config.display().to_string()
    );
}

#[test]
fn test_status_on_empty_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");
    let output = run_dustline(
        &["status", "--database", db.to_str().unwrap(), "--format", "json"],
        &dir.path().join("config.toml"),
    );

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["scopes"], serde_json::json!({}));
}

#[test]
fn test_simulation_without_device_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_dustline(&["simulation", "on"], &dir.path().join("config.toml"));

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No device configured"));
}
