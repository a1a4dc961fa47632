//! Integration tests for CLI argument handling

use std::process::Command;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_radiofeed"))
        .args(args)
        .output()
        .expect("Failed to execute radiofeed")
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("radiofeed"), "Help should mention radiofeed");
    assert!(stdout.contains("--bind"), "Help should mention --bind");
    assert!(stdout.contains("--cache-dir"), "Help should mention --cache-dir");
    assert!(stdout.contains("--refresh-all"), "Help should mention --refresh-all");
}

#[test]
fn test_invalid_bind_prints_error_and_exits() {
    let output = run_cli(&["--bind", "not-an-address"]);
    assert!(!output.status.success(), "Expected invalid bind to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid bind address"),
        "Should print error message about the bind address: {}",
        stderr
    );
}

#[test]
fn test_unknown_flag_is_rejected() {
    let output = run_cli(&["--plan"]);
    assert!(!output.status.success());
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use radiofeed::cli::{Cli, RunMode, StartupConfig};
    use radiofeed::config::ServiceConfig;

    #[test]
    fn test_refresh_all_flag_selects_mode() {
        let cli = Cli::parse_from(["radiofeed", "--refresh-all"]);
        let config = StartupConfig::from_cli(&cli, ServiceConfig::default()).unwrap();
        assert_eq!(config.mode, RunMode::RefreshAll);
    }

    #[test]
    fn test_environment_bind_is_validated() {
        let cli = Cli::parse_from(["radiofeed"]);
        let service = ServiceConfig::from_lookup(|key| {
            (key == "RADIOFEED_BIND").then(|| "localhost".to_string())
        });
        assert!(StartupConfig::from_cli(&cli, service).is_err());
    }
}
