//! Route handlers.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use buildstore_db::{ArtifactKind, BuildKey};
use serde::Deserialize;
use serde_json::json;

use super::error::{BoxRequestError, Error};
use super::Ctx;
use crate::ingest::{BuildCompleted, BuildStarted};

/// Handler for the `GET /latest` endpoint
///
/// Returns the build with the most recent start time plus artifact links, or
/// an empty object when nothing has been recorded yet.
#[tracing::instrument(skip_all, err)]
pub async fn latest(State(ctx): State<Ctx>) -> Result<Response, BoxRequestError> {
    let view = ctx.query.get_latest_with_links().await.map_err(|err| {
        tracing::debug!(error = ?err, "failed to load latest build");
        Error::Store(err)
    })?;

    Ok(match view {
        Some(view) => Json(view).into_response(),
        None => Json(json!({})).into_response(),
    })
}

/// Query parameters of `GET /artifact`.
///
/// Kept as raw strings so malformed values get our error body instead of the
/// extractor's rejection.
#[derive(Debug, Deserialize)]
pub struct ArtifactParams {
    pub env: Option<String>,
    pub job: Option<String>,
    pub build: Option<String>,
    pub kind: Option<String>,
}

impl ArtifactParams {
    fn parse(&self) -> Result<(BuildKey, ArtifactKind), Error> {
        let env = required(&self.env, "env")?;
        let job = required(&self.job, "job")?;
        let build = required(&self.build, "build")?;
        let kind = required(&self.kind, "kind")?;

        let build_number: i64 = build
            .trim()
            .parse()
            .map_err(|_| Error::InvalidRequest(format!("build must be an integer, got '{}'", build)))?;
        let kind = kind
            .trim()
            .parse::<u8>()
            .ok()
            .and_then(ArtifactKind::from_code)
            .ok_or_else(|| Error::InvalidRequest(format!("kind must be 1, 2 or 3, got '{}'", kind)))?;

        Ok((BuildKey::new(env, job, build_number), kind))
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, Error> {
    value
        .as_deref()
        .ok_or_else(|| Error::InvalidRequest(format!("missing query parameter '{}'", name)))
}

/// Handler for the `GET /artifact?env=&job=&build=&kind=` endpoint
///
/// Serves stored artifact content with the content type of its kind, or 404
/// when the content was never stored.
#[tracing::instrument(skip_all, err)]
pub async fn artifact(
    State(ctx): State<Ctx>,
    Query(params): Query<ArtifactParams>,
) -> Result<Response, BoxRequestError> {
    let (key, kind) = params.parse()?;

    let content = ctx
        .query
        .get_artifact_content(&key.environment, &key.job_name, key.build_number, kind)
        .await
        .map_err(|err| {
            tracing::debug!(error = ?err, build = %key, "failed to load artifact");
            Error::Store(err)
        })?;

    match content {
        Some(artifact) => Ok((
            [(header::CONTENT_TYPE, artifact.media_type)],
            artifact.content,
        )
            .into_response()),
        None => Err(Error::ArtifactNotFound {
            build: key.to_string(),
            kind: kind.as_str(),
        }
        .into()),
    }
}

/// Handler for the `POST /events/started` webhook
#[tracing::instrument(skip_all, err)]
pub async fn started(
    State(ctx): State<Ctx>,
    Json(event): Json<BuildStarted>,
) -> Result<StatusCode, BoxRequestError> {
    ctx.ingestor.on_started(&event).await.map_err(Error::Store)?;
    Ok(StatusCode::ACCEPTED)
}

/// Handler for the `POST /events/completed` webhook
///
/// Responds once the completion is stored; artifact download continues in
/// the background.
#[tracing::instrument(skip_all, err)]
pub async fn completed(
    State(ctx): State<Ctx>,
    Json(event): Json<BuildCompleted>,
) -> Result<StatusCode, BoxRequestError> {
    // Dropping the handle detaches the download task.
    let _fetch = ctx.ingestor.on_completed(&event).await.map_err(Error::Store)?;
    Ok(StatusCode::ACCEPTED)
}

/// Liveness probe.
pub async fn health() -> &'static str {
    "ok"
}
