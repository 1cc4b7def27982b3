//! Build lifecycle ingestion.
//!
//! The external runner reports two events per build. Each one becomes a
//! partial upsert; the store's field-wise merge makes the final row
//! independent of the order the events arrive in.

use buildstore_db::{BuildKey, BuildStoreDb, PartialBuild, StoreError, UNKNOWN_STATUS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::fetcher::{ArtifactFetcher, FetchReport};

/// "Build started" notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStarted {
    pub environment: String,
    pub job_name: String,
    pub build_number: i64,
    pub process_name: String,
    pub start_time: DateTime<Utc>,
}

impl BuildStarted {
    pub fn key(&self) -> BuildKey {
        BuildKey::new(&self.environment, self.job_name.as_str(), self.build_number)
    }
}

/// "Build completed" notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildCompleted {
    pub environment: String,
    pub job_name: String,
    pub build_number: i64,
    /// Runner-reported result; missing or blank means the runner did not say.
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub process_name: Option<String>,
}

impl BuildCompleted {
    pub fn key(&self) -> BuildKey {
        BuildKey::new(&self.environment, self.job_name.as_str(), self.build_number)
    }

    fn status(&self) -> String {
        self.result
            .as_deref()
            .map(str::trim)
            .filter(|result| !result.is_empty())
            .unwrap_or(UNKNOWN_STATUS)
            .to_string()
    }
}

/// Turns runner events into record store writes.
#[derive(Clone)]
pub struct EventIngestor {
    db: BuildStoreDb,
    fetcher: ArtifactFetcher,
}

impl EventIngestor {
    pub fn new(db: BuildStoreDb, fetcher: ArtifactFetcher) -> Self {
        Self { db, fetcher }
    }

    /// Record a build start.
    ///
    /// Status is left untouched, so a start that arrives after completion
    /// never reverts the result. Repeated starts keep the first start time.
    pub async fn on_started(&self, event: &BuildStarted) -> Result<BuildKey, StoreError> {
        let key = event.key();
        let partial = PartialBuild::new()
            .with_process_name(event.process_name.as_str())
            .with_start_time(event.start_time);

        self.db.upsert(&key, &partial).await.map_err(|err| {
            error!(build = %key, code = err.code(), error = %err, "Failed to record build start");
            err
        })?;

        info!(build = %key, process = %event.process_name, "Build started");
        Ok(key)
    }

    /// Record a build completion and dispatch the artifact download.
    ///
    /// Returns once the completion itself is stored. The download runs on its
    /// own task; the returned handle resolves to its [`FetchReport`].
    pub async fn on_completed(
        &self,
        event: &BuildCompleted,
    ) -> Result<JoinHandle<FetchReport>, StoreError> {
        let key = event.key();
        let status = event.status();
        let mut partial = PartialBuild::new()
            .with_end_time(Utc::now())
            .with_status(status.as_str());
        if let Some(process_name) = event.process_name.as_deref() {
            partial = partial.with_process_name(process_name);
        }

        self.db.upsert(&key, &partial).await.map_err(|err| {
            error!(build = %key, code = err.code(), error = %err, "Failed to record build completion");
            err
        })?;
        info!(build = %key, %status, "Build completed");

        let fetcher = self.fetcher.clone();
        Ok(tokio::spawn(async move { fetcher.fetch_all(&key).await }))
    }
}
