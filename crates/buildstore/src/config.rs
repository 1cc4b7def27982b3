//! Server configuration.
//!
//! Values are resolved in order: command line / environment, then the
//! optional TOML file, then the defaults below.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8090";
pub const DEFAULT_ARTIFACT_HOST: &str = "http://localhost:8080";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DB_FILE: &str = "buildstore.sqlite3";

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// TOML config file with the same keys as the flags below
    #[arg(long, env = "BUILDSTORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address the HTTP API binds to
    #[arg(long, env = "BUILDSTORE_BIND")]
    pub bind: Option<SocketAddr>,

    /// SQLite database file
    #[arg(long, env = "BUILDSTORE_DATABASE")]
    pub database: Option<PathBuf>,

    /// Base URL of the execution host serving artifact files
    #[arg(long, env = "BUILDSTORE_ARTIFACT_HOST")]
    pub artifact_host: Option<String>,

    /// Per-request timeout for artifact downloads, in seconds
    #[arg(long, env = "BUILDSTORE_FETCH_TIMEOUT_SECS")]
    pub fetch_timeout_secs: Option<u64>,

    /// Mirror the full log filter on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

/// Contents of the optional TOML config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bind: Option<SocketAddr>,
    pub database: Option<PathBuf>,
    pub artifact_host: Option<String>,
    pub fetch_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Fully resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub database_path: PathBuf,
    pub artifact_host: String,
    pub fetch_timeout: Duration,
}

impl ServerConfig {
    /// Resolve from command line arguments, reading `--config` if given.
    pub fn resolve(args: &ServeArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    pub fn merge(args: &ServeArgs, file: FileConfig) -> Result<Self> {
        let bind = match args.bind.or(file.bind) {
            Some(bind) => bind,
            None => DEFAULT_BIND_ADDR
                .parse()
                .context("Invalid default bind address")?,
        };
        let database_path = args
            .database
            .clone()
            .or(file.database)
            .unwrap_or_else(|| buildstore_logging::buildstore_home().join(DEFAULT_DB_FILE));
        let artifact_host = args
            .artifact_host
            .clone()
            .or(file.artifact_host)
            .unwrap_or_else(|| DEFAULT_ARTIFACT_HOST.to_string());
        let timeout_secs = args
            .fetch_timeout_secs
            .or(file.fetch_timeout_secs)
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);

        if timeout_secs == 0 {
            anyhow::bail!("fetch timeout must be at least one second");
        }
        url::Url::parse(&artifact_host)
            .with_context(|| format!("Invalid artifact host URL: {}", artifact_host))?;

        Ok(Self {
            bind,
            database_path,
            artifact_host,
            fetch_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::merge(&ServeArgs::default(), FileConfig::default()).unwrap();
        assert_eq!(config.bind, DEFAULT_BIND_ADDR.parse::<SocketAddr>().unwrap());
        assert_eq!(config.artifact_host, DEFAULT_ARTIFACT_HOST);
        assert_eq!(config.fetch_timeout, Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS));
        assert!(config.database_path.ends_with(DEFAULT_DB_FILE));
    }

    #[test]
    fn test_args_override_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("buildstore.toml");
        std::fs::write(
            &path,
            r#"
bind = "0.0.0.0:9000"
database = "/var/lib/buildstore/db.sqlite3"
artifact_host = "http://ci.internal:8080"
fetch_timeout_secs = 10
"#,
        )
        .unwrap();

        let args = ServeArgs {
            config: Some(path),
            fetch_timeout_secs: Some(3),
            ..ServeArgs::default()
        };
        let config = ServerConfig::resolve(&args).unwrap();

        assert_eq!(config.bind, "0.0.0.0:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.database_path, PathBuf::from("/var/lib/buildstore/db.sqlite3"));
        assert_eq!(config.artifact_host, "http://ci.internal:8080");
        assert_eq!(config.fetch_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_unknown_file_keys_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "db_password = \"1234\"\n").unwrap();

        assert!(FileConfig::load(&path).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let args = ServeArgs {
            fetch_timeout_secs: Some(0),
            ..ServeArgs::default()
        };
        assert!(ServerConfig::merge(&args, FileConfig::default()).is_err());
    }
}
