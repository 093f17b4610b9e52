use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy shared across the ingestion pipeline.
///
/// Each variant maps to one of the error categories used by the retry
/// service and (in `printarr-server`) to an HTTP status code via
/// [`PrintarrError::category`].
#[derive(Debug, Error)]
pub enum PrintarrError {
    #[error("validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("authentication required for {service}")]
    AuthRequired { service: String },

    #[error("authentication failed for {service}: {message}")]
    AuthFailed { service: String, message: String },

    #[error("rate limited by {service}, retry after {retry_after_secs}s")]
    RateLimited {
        service: String,
        retry_after_secs: u64,
    },

    #[error("upstream error from {service}: {message}")]
    Upstream { service: String, message: String },

    #[error("transient error: {message}")]
    Transient { message: String },

    #[error("permanent error: {message}")]
    Permanent { message: String },

    #[error("database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("io error for {path}: {message}")]
    Io {
        message: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("archive is password protected: {0}")]
    PasswordProtectedArchive(PathBuf),

    #[error("archive is corrupted: {0}")]
    CorruptedArchive(PathBuf),

    #[error("archive is missing a part: {0}")]
    MissingArchivePart(PathBuf),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("json error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("job {job_id} is not in a retryable state")]
    JobNotRetryable { job_id: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PrintarrError>;

/// Category a [`PrintarrError`] belongs to, per the error handling design.
///
/// Used by the Retry Service to decide eligibility, and by the server to
/// pick an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Conflict,
    AuthRequired,
    AuthFailed,
    RateLimited,
    Upstream,
    Transient,
    Permanent,
}

impl PrintarrError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PrintarrError::Validation { .. } => ErrorCategory::Validation,
            PrintarrError::NotFound { .. } | PrintarrError::FileNotFound(_) => {
                ErrorCategory::NotFound
            }
            PrintarrError::Conflict { .. } | PrintarrError::JobNotRetryable { .. } => {
                ErrorCategory::Conflict
            }
            PrintarrError::AuthRequired { .. } => ErrorCategory::AuthRequired,
            PrintarrError::AuthFailed { .. } => ErrorCategory::AuthFailed,
            PrintarrError::RateLimited { .. } => ErrorCategory::RateLimited,
            PrintarrError::Upstream { .. } => ErrorCategory::Upstream,
            PrintarrError::Transient { .. } | PrintarrError::Io { .. } => ErrorCategory::Transient,
            PrintarrError::Permanent { .. }
            | PrintarrError::PasswordProtectedArchive(_)
            | PrintarrError::CorruptedArchive(_)
            | PrintarrError::MissingArchivePart(_)
            | PrintarrError::HashMismatch { .. }
            | PrintarrError::Database { .. }
            | PrintarrError::Json { .. }
            | PrintarrError::Config { .. }
            | PrintarrError::Other(_) => ErrorCategory::Permanent,
        }
    }
}

impl From<rusqlite::Error> for PrintarrError {
    fn from(source: rusqlite::Error) -> Self {
        PrintarrError::Database {
            message: source.to_string(),
            source: Some(source),
        }
    }
}

impl From<serde_json::Error> for PrintarrError {
    fn from(source: serde_json::Error) -> Self {
        PrintarrError::Json {
            message: source.to_string(),
            source,
        }
    }
}
