//! HTTP API: query endpoints for clients and webhooks for the job runner.

use std::future::Future;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;

use crate::ingest::EventIngestor;
use crate::query::QueryService;

mod error;
mod handlers;

pub use error::{BoxRequestError, Error, RequestError};

/// Shared state for every handler.
#[derive(Clone)]
pub struct Ctx {
    pub query: QueryService,
    pub ingestor: EventIngestor,
}

/// Build the API router.
pub fn router(ctx: Ctx) -> Router {
    Router::new()
        .route("/latest", get(handlers::latest))
        .route("/artifact", get(handlers::artifact))
        .route("/events/started", post(handlers::started))
        .route("/events/completed", post(handlers::completed))
        .route("/health", get(handlers::health))
        .with_state(ctx)
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    ctx: Ctx,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "API listening");

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{ArtifactFetcher, ArtifactSource, FetchError};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use buildstore_db::{ArtifactKind, BuildKey, BuildStoreDb, PartialBuild};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct NoArtifacts;

    #[async_trait]
    impl ArtifactSource for NoArtifacts {
        async fn fetch(&self, _key: &BuildKey, kind: ArtifactKind) -> Result<String, FetchError> {
            Err(FetchError::NotFound(kind.file_name().to_string()))
        }
    }

    async fn app() -> (BuildStoreDb, Router) {
        let db = BuildStoreDb::open_memory().await.unwrap();
        let app = app_with(db.clone());
        (db, app)
    }

    fn app_with(db: BuildStoreDb) -> Router {
        let fetcher = ArtifactFetcher::new(db.clone(), Arc::new(NoArtifacts), Duration::from_secs(1));
        let ctx = Ctx {
            query: QueryService::new(db.clone()),
            ingestor: EventIngestor::new(db, fetcher),
        };
        router(ctx)
    }

    fn post_json(uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_latest_on_empty_store_is_empty_object() {
        let (_db, app) = app().await;

        let response = app.oneshot(get("/latest")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "{}");
    }

    #[tokio::test]
    async fn test_latest_reports_store_failure_as_server_error() {
        let (db, app) = app().await;
        db.pool().close().await;

        let response = app.oneshot(get("/latest")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["error_code"], "CONNECTIVITY_FAILURE");
    }

    #[tokio::test]
    async fn test_artifact_served_with_media_type() {
        let (db, app) = app().await;
        db.upsert(
            &BuildKey::new("prod", "nightly", 42),
            &PartialBuild::artifact(ArtifactKind::Output, "<robot/>"),
        )
        .await
        .unwrap();

        let response = app
            .oneshot(get("/artifact?env=prod&job=nightly&build=42&kind=3"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/xml"
        );
        assert_eq!(body_string(response).await, "<robot/>");
    }

    #[tokio::test]
    async fn test_missing_artifact_is_not_found() {
        let (_db, app) = app().await;

        let response = app
            .oneshot(get("/artifact?env=prod&job=nightly&build=42&kind=1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_kind_is_bad_request() {
        let (_db, app) = app().await;

        for uri in [
            "/artifact?env=prod&job=nightly&build=42&kind=7",
            "/artifact?env=prod&job=nightly&build=abc&kind=1",
            "/artifact?env=prod&build=42&kind=1",
        ] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_started_webhook_records_build() {
        let (db, app) = app().await;
        let request = post_json(
            "/events/started",
            r#"{"environment":"prod","job_name":"nightly","build_number":42,
                "process_name":"release","start_time":"2024-06-01T08:00:00Z"}"#,
        );

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let record = db
            .get(&BuildKey::new("prod", "nightly", 42))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.process_name, "release");
    }

    #[tokio::test]
    async fn test_completed_webhook_reports_store_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("webhook.db");
        let serving = BuildStoreDb::open(&path).await.unwrap();
        let observer = BuildStoreDb::open(&path).await.unwrap();
        let app = app_with(serving.clone());
        serving.pool().close().await;

        let response = app
            .oneshot(post_json(
                "/events/completed",
                r#"{"environment":"prod","job_name":"nightly","build_number":42,"result":"SUCCESS"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["error_code"], "CONNECTIVITY_FAILURE");
        assert_eq!(observer.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_webhooks_reject_incomplete_body() {
        let (db, app) = app().await;

        for uri in ["/events/started", "/events/completed"] {
            let response = app
                .clone()
                .oneshot(post_json(
                    uri,
                    r#"{"environment":"prod","job_name":"nightly","process_name":"release",
                        "start_time":"2024-06-01T08:00:00Z","result":"SUCCESS"}"#,
                ))
                .await
                .unwrap();
            assert!(response.status().is_client_error(), "{} -> {}", uri, response.status());
        }

        assert_eq!(db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_health() {
        let (_db, app) = app().await;
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");
    }
}
