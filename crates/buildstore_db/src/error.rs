//! Error types for the record store.

use thiserror::Error;

/// Record store result type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Record store errors.
///
/// Every variant carries a stable reason code (see [`StoreError::code`]) so
/// callers can decide whether a retry makes sense.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database could not be reached or the statement failed to run.
    #[error("Connectivity failure: {0}")]
    ConnectivityFailure(#[source] sqlx::Error),

    /// Constraint violation (unique, not-null, check, ...)
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// A content field was rejected at write time.
    #[error("Invalid content for {field}: {reason}")]
    InvalidContent { field: &'static str, reason: String },

    /// IO error (creating the database directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Create an invalid content error.
    pub fn invalid_content(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidContent {
            field,
            reason: reason.into(),
        }
    }

    /// Stable reason code for logs and API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectivityFailure(_) | Self::Io(_) => "CONNECTIVITY_FAILURE",
            Self::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            Self::InvalidContent { .. } => "INVALID_CONTENT",
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        if let sqlx::Error::Database(db_err) = &err {
            match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    return Self::ConstraintViolation(db_err.message().to_string());
                }
                _ => {}
            }
        }
        Self::ConnectivityFailure(err)
    }
}
