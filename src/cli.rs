//! Command-line interface parsing for radiofeed
//!
//! Flags override the environment-derived [`ServiceConfig`].

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use crate::config::ServiceConfig;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The bind address is not `host:port`
    #[error("Invalid bind address: '{0}'. Expected host:port, e.g. 0.0.0.0:3000")]
    InvalidBind(String),

    /// No cache directory was given and none could be derived
    #[error("No cache directory available; pass --cache-dir or set RADIOFEED_CACHE_DIR")]
    NoCacheDir,
}

/// radiofeed - keeps the radio site's news sections fresh
#[derive(Parser, Debug)]
#[command(name = "radiofeed")]
#[command(about = "Cached news sections for the radio site")]
#[command(version)]
pub struct Cli {
    /// Address to listen on (overrides RADIOFEED_BIND)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Directory holding the section cache files (overrides RADIOFEED_CACHE_DIR)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Refresh every section once and exit instead of serving
    #[arg(long)]
    pub refresh_all: bool,
}

/// What to do at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Serve,
    RefreshAll,
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub mode: RunMode,
    pub service: ServiceConfig,
}

/// Checks that an address looks like `host:port`
pub fn parse_bind_arg(s: &str) -> Result<String, CliError> {
    let valid = s
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
    if valid {
        Ok(s.to_string())
    } else {
        Err(CliError::InvalidBind(s.to_string()))
    }
}

impl StartupConfig {
    /// Applies CLI flags on top of an already loaded service configuration
    pub fn from_cli(cli: &Cli, mut service: ServiceConfig) -> Result<Self, CliError> {
        if let Some(ref bind) = cli.bind {
            service.bind = bind.clone();
        }
        service.bind = parse_bind_arg(&service.bind)?;

        if let Some(ref dir) = cli.cache_dir {
            service.cache_dir = Some(dir.clone());
        }

        let mode = if cli.refresh_all {
            RunMode::RefreshAll
        } else {
            RunMode::Serve
        };

        Ok(StartupConfig { mode, service })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> ServiceConfig {
        ServiceConfig::from_lookup(|_| None)
    }

    #[test]
    fn test_parse_bind_arg_accepts_host_port() {
        assert_eq!(parse_bind_arg("0.0.0.0:3000").unwrap(), "0.0.0.0:3000");
        assert_eq!(parse_bind_arg("localhost:8080").unwrap(), "localhost:8080");
        assert_eq!(parse_bind_arg("[::1]:80").unwrap(), "[::1]:80");
    }

    #[test]
    fn test_parse_bind_arg_invalid() {
        for bad in ["3000", ":3000", "host:", "host:99999", "host:port"] {
            let err = parse_bind_arg(bad).unwrap_err();
            assert!(err.to_string().contains("Invalid bind address"), "{bad}");
        }
    }

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::parse_from(["radiofeed"]);
        assert!(cli.bind.is_none());
        assert!(cli.cache_dir.is_none());
        assert!(!cli.refresh_all);
    }

    #[test]
    fn test_startup_config_from_cli_defaults() {
        let cli = Cli::parse_from(["radiofeed"]);
        let config = StartupConfig::from_cli(&cli, defaults()).unwrap();
        assert_eq!(config.mode, RunMode::Serve);
        assert_eq!(config.service.bind, "0.0.0.0:3000");
        assert!(config.service.cache_dir.is_none());
    }

    #[test]
    fn test_startup_config_flags_override_environment() {
        let cli = Cli::parse_from([
            "radiofeed",
            "--bind",
            "127.0.0.1:9000",
            "--cache-dir",
            "/tmp/feeds",
            "--refresh-all",
        ]);
        let config = StartupConfig::from_cli(&cli, defaults()).unwrap();
        assert_eq!(config.mode, RunMode::RefreshAll);
        assert_eq!(config.service.bind, "127.0.0.1:9000");
        assert_eq!(config.service.cache_dir, Some(PathBuf::from("/tmp/feeds")));
    }

    #[test]
    fn test_startup_config_rejects_bad_bind() {
        let cli = Cli::parse_from(["radiofeed", "--bind", "nonsense"]);
        assert!(StartupConfig::from_cli(&cli, defaults()).is_err());
    }
}
