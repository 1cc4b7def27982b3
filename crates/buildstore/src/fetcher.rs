//! Artifact download from the execution host.
//!
//! Each completed build has three artifacts (log, report, output). They are
//! requested independently and each success is written with its own
//! single-field upsert, so one failing download never holds back the others.
//! Nothing here retries; the report tells the caller what happened.

use async_trait::async_trait;
use buildstore_db::{ArtifactKind, BuildKey, BuildStoreDb, PartialBuild, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from a single artifact request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("artifact not found at {0}")]
    NotFound(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Where artifact content comes from.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Fetch the raw text of one artifact.
    async fn fetch(&self, key: &BuildKey, kind: ArtifactKind) -> Result<String, FetchError>;
}

/// Artifact source backed by the execution host's HTTP file endpoint.
pub struct HttpArtifactSource {
    base_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpArtifactSource {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            request_timeout,
        }
    }

    /// Path of an artifact on the execution host, passed as `filePath`.
    pub fn file_path(key: &BuildKey, kind: ArtifactKind) -> String {
        format!(
            "/jobs/{}/jobs/{}/builds/{}/robot-plugin/{}",
            key.environment,
            key.job_name,
            key.build_number,
            kind.file_name()
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/openLogFile", self.base_url)
    }

    fn map_err(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.request_timeout)
        } else {
            FetchError::NetworkFailure(err.to_string())
        }
    }
}

#[async_trait]
impl ArtifactSource for HttpArtifactSource {
    async fn fetch(&self, key: &BuildKey, kind: ArtifactKind) -> Result<String, FetchError> {
        let file_path = Self::file_path(key, kind);

        let response = self
            .client
            .get(self.endpoint())
            .query(&[("filePath", file_path.as_str())])
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(file_path));
        }
        if !status.is_success() {
            return Err(FetchError::NetworkFailure(format!(
                "HTTP {} for {}",
                status, file_path
            )));
        }

        response.text().await.map_err(|e| self.map_err(e))
    }
}

/// Why one artifact did not end up in the store.
#[derive(Debug, Error)]
pub enum ArtifactFailure {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of fetching all artifacts for one build.
#[derive(Debug)]
pub struct FetchReport {
    pub key: BuildKey,
    pub stored: Vec<ArtifactKind>,
    pub failed: Vec<(ArtifactKind, ArtifactFailure)>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failure(&self, kind: ArtifactKind) -> Option<&ArtifactFailure> {
        self.failed
            .iter()
            .find(|(failed_kind, _)| *failed_kind == kind)
            .map(|(_, failure)| failure)
    }
}

/// Downloads artifacts and writes each one into the record store.
#[derive(Clone)]
pub struct ArtifactFetcher {
    db: BuildStoreDb,
    source: Arc<dyn ArtifactSource>,
    timeout: Duration,
}

impl ArtifactFetcher {
    /// `timeout` bounds every individual request.
    pub fn new(db: BuildStoreDb, source: Arc<dyn ArtifactSource>, timeout: Duration) -> Self {
        Self { db, source, timeout }
    }

    /// Fetch and store all three artifacts of `key` concurrently.
    pub async fn fetch_all(&self, key: &BuildKey) -> FetchReport {
        let (log, report, output) = tokio::join!(
            self.fetch_one(key, ArtifactKind::Log),
            self.fetch_one(key, ArtifactKind::Report),
            self.fetch_one(key, ArtifactKind::Output),
        );

        let mut result = FetchReport {
            key: key.clone(),
            stored: Vec::new(),
            failed: Vec::new(),
        };
        for (kind, outcome) in [
            (ArtifactKind::Log, log),
            (ArtifactKind::Report, report),
            (ArtifactKind::Output, output),
        ] {
            match outcome {
                Ok(()) => result.stored.push(kind),
                Err(err) => {
                    warn!(build = %key, artifact = %kind, error = %err, "Artifact not stored");
                    result.failed.push((kind, err));
                }
            }
        }

        info!(
            build = %key,
            stored = result.stored.len(),
            failed = result.failed.len(),
            "Artifact fetch finished"
        );
        result
    }

    /// Fetch one artifact and store it on its own.
    pub async fn fetch_one(&self, key: &BuildKey, kind: ArtifactKind) -> Result<(), ArtifactFailure> {
        let content = match tokio::time::timeout(self.timeout, self.source.fetch(key, kind)).await {
            Ok(fetched) => fetched?,
            Err(_) => return Err(FetchError::Timeout(self.timeout).into()),
        };

        self.db
            .upsert(key, &PartialBuild::artifact(kind, content))
            .await?;
        Ok(())
    }
}
