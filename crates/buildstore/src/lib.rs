//! buildstore: records build lifecycles and serves the latest build.
//!
//! Wiring, leaves first: [`buildstore_db::BuildStoreDb`] owns the data,
//! [`fetcher::ArtifactFetcher`] downloads artifacts into it,
//! [`ingest::EventIngestor`] turns runner events into writes, and
//! [`query::QueryService`] plus [`api`] serve the read side.

pub mod api;
pub mod config;
pub mod fetcher;
pub mod ingest;
pub mod query;

use std::sync::Arc;
use std::time::Duration;

use buildstore_db::BuildStoreDb;

use crate::api::Ctx;
use crate::fetcher::{ArtifactFetcher, ArtifactSource};
use crate::ingest::EventIngestor;
use crate::query::QueryService;

/// Assemble the API context around one store handle.
pub fn build_context(
    db: BuildStoreDb,
    source: Arc<dyn ArtifactSource>,
    fetch_timeout: Duration,
) -> Ctx {
    let fetcher = ArtifactFetcher::new(db.clone(), source, fetch_timeout);
    Ctx {
        query: QueryService::new(db.clone()),
        ingestor: EventIngestor::new(db, fetcher),
    }
}
