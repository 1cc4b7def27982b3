//! Tracing setup shared by buildstore binaries.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "buildstore=info,buildstore_db=info";
const QUIET_CONSOLE_FILTER: &str = "warn,buildstore=info";
const KEEP_LOG_FILES: usize = 7;

/// Logging configuration for a buildstore binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the file filter on stderr instead of warnings only.
    pub verbose: bool,
    /// Override for the log directory (defaults to [`logs_dir`]).
    pub log_dir: Option<PathBuf>,
}

/// Install the global subscriber: a daily log file plus stderr.
///
/// `RUST_LOG` overrides the default filter for both outputs. Keep the returned
/// guard alive for the life of the process or buffered lines are lost.
pub fn init_logging(config: LogConfig<'_>) -> Result<WorkerGuard> {
    let dir = match config.log_dir {
        Some(dir) => dir,
        None => logs_dir(),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;

    let (file_writer, guard) = tracing_appender::non_blocking(file_appender(&dir, config.app_name)?);

    let console_filter = if config.verbose {
        env_filter_or(DEFAULT_LOG_FILTER)
    } else {
        env_filter_or(QUIET_CONSOLE_FILTER)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(env_filter_or(DEFAULT_LOG_FILTER)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Global tracing subscriber already installed")?;

    Ok(guard)
}

fn env_filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Daily-rotated `<app_name>.<date>.log` files in `dir`, oldest pruned.
fn file_appender(dir: &Path, app_name: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(app_name)
        .filename_suffix("log")
        .max_log_files(KEEP_LOG_FILES)
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))
}

/// Buildstore data directory: `$BUILDSTORE_HOME`, else `~/.buildstore`.
pub fn buildstore_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("BUILDSTORE_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".buildstore")
}

/// Logs directory: `<home>/logs`
pub fn logs_dir() -> PathBuf {
    buildstore_home().join("logs")
}
