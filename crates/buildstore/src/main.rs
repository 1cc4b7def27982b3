//! buildstore server
//!
//! Usage:
//!     buildstore serve --bind 127.0.0.1:8090 --database ./buildstore.sqlite3 \
//!         --artifact-host http://localhost:8080

use std::sync::Arc;

use anyhow::Context;
use buildstore::config::{ServeArgs, ServerConfig};
use buildstore::fetcher::HttpArtifactSource;
use buildstore_db::BuildStoreDb;
use buildstore_logging::{init_logging, LogConfig};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "buildstore", about = "Build record store and latest-build API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and event webhooks
    Serve(ServeArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let _log_guard = init_logging(LogConfig {
        app_name: "buildstore-serve",
        verbose: args.verbose,
        log_dir: None,
    })?;

    let config = ServerConfig::resolve(&args)?;
    tracing::info!("Starting buildstore");
    tracing::info!("  Bind: {}", config.bind);
    tracing::info!("  Database: {}", config.database_path.display());
    tracing::info!("  Artifact host: {}", config.artifact_host);

    let db = BuildStoreDb::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    let source = HttpArtifactSource::new(config.artifact_host.as_str(), config.fetch_timeout);
    let ctx = buildstore::build_context(db.clone(), Arc::new(source), config.fetch_timeout);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;

    buildstore::api::serve(listener, ctx, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down");
    })
    .await
    .context("API server failed")?;

    db.close().await;
    Ok(())
}
