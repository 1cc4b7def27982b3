use std::fmt::Display;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use buildstore_db::StoreError;
use serde_json::json;

pub type BoxRequestError = Box<dyn RequestError>;

/// An error that knows how it should be reported over HTTP.
pub trait RequestError: Display + Send + Sync + 'static {
    fn error_code(&self) -> &'static str;
    fn status_code(&self) -> StatusCode;
}

impl IntoResponse for BoxRequestError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({
            "error_code": self.error_code(),
            "error_message": self.to_string(),
        });

        (self.status_code(), axum::Json(body)).into_response()
    }
}

impl<E: RequestError> From<E> for BoxRequestError {
    fn from(e: E) -> Self {
        Box::new(e)
    }
}

/// API handler errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Artifact content was never stored for this build
    #[error("no {kind} artifact for {build}")]
    ArtifactNotFound { build: String, kind: &'static str },

    /// Invalid request parameters
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Record store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl RequestError for Error {
    fn error_code(&self) -> &'static str {
        match self {
            Error::ArtifactNotFound { .. } => "ARTIFACT_NOT_FOUND",
            Error::InvalidRequest(_) => "INVALID_REQUEST",
            Error::Store(err) => err.code(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::ArtifactNotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
