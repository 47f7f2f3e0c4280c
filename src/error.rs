//! Domain error types for the ingestion service.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.
//! `IngestError` is the tagged pipeline error recorded into request status records;
//! `AppError` is what HTTP handlers return.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::fmt;
use uuid::Uuid;

/// Coarse classification of pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad upload: never retried, the client must change the input.
    ClientInput,
    /// Confirmed attack signal (path traversal in the archive).
    Security,
    /// Document store failure; the client may resubmit the request.
    Persistence,
    /// Object store failure; the client may resubmit the request.
    Storage,
    /// Local filesystem or task failure.
    Internal,
}

/// Pipeline errors. Each variant carries a stable code plus free-text detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("File '{0}' is not a .zip archive")]
    InvalidExtension(String),

    #[error("Unknown processing mode '{0}'")]
    InvalidMode(String),

    #[error("Multipart field 'File' is missing")]
    MissingFile,

    #[error("Upload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Encrypted payload is {len} bytes, shorter than the {nonce_len}-byte nonce")]
    MalformedInput { len: usize, nonce_len: usize },

    #[error("Authentication tag did not verify")]
    AuthenticationFailed,

    #[error("Malformed archive: {0}")]
    MalformedArchive(String),

    #[error("Archive has no '{0}' directory")]
    MissingRequiredAssetGroup(String),

    #[error("Archive entry escapes the working directory: {0}")]
    PathTraversal(String),

    #[error("No manifest file found in archive")]
    ManifestNotFound,

    #[error("Archive contains more than one manifest file: {}", .0.join(", "))]
    AmbiguousManifest(Vec<String>),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid preset file '{file}': {reason}")]
    InvalidPreset { file: String, reason: String },

    #[error("Manifest references '{0}' which is not in the archive")]
    DanglingAssetReference(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Filesystem error: {0}")]
    FileSystem(String),

    #[error("Uploads did not finish within {0} seconds")]
    UploadTimeout(u64),

    #[error("Upload workers stopped after {observed} of {expected} outcomes")]
    IncompleteUpload { observed: usize, expected: usize },
}

impl IngestError {
    /// Stable machine-readable code stored in status records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidExtension(_) => "INVALID_EXTENSION",
            Self::InvalidMode(_) => "INVALID_MODE",
            Self::MissingFile => "MISSING_FILE",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::MalformedInput { .. } => "MALFORMED_INPUT",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::MalformedArchive(_) => "MALFORMED_ARCHIVE",
            Self::MissingRequiredAssetGroup(_) => "MISSING_REQUIRED_ASSET_GROUP",
            Self::PathTraversal(_) => "PATH_TRAVERSAL",
            Self::ManifestNotFound => "MANIFEST_NOT_FOUND",
            Self::AmbiguousManifest(_) => "AMBIGUOUS_MANIFEST",
            Self::InvalidManifest(_) => "INVALID_MANIFEST",
            Self::InvalidPreset { .. } => "INVALID_PRESET",
            Self::DanglingAssetReference(_) => "DANGLING_ASSET_REFERENCE",
            Self::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            Self::StorageFailure(_) => "STORAGE_FAILURE",
            Self::FileSystem(_) => "FILESYSTEM_ERROR",
            Self::UploadTimeout(_) => "UPLOAD_TIMEOUT",
            Self::IncompleteUpload { .. } => "INCOMPLETE_UPLOAD",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidExtension(_)
            | Self::InvalidMode(_)
            | Self::MissingFile
            | Self::PayloadTooLarge { .. }
            | Self::MalformedInput { .. }
            | Self::AuthenticationFailed
            | Self::MalformedArchive(_)
            | Self::MissingRequiredAssetGroup(_)
            | Self::ManifestNotFound
            | Self::AmbiguousManifest(_)
            | Self::InvalidManifest(_)
            | Self::InvalidPreset { .. }
            | Self::DanglingAssetReference(_) => ErrorKind::ClientInput,
            Self::PathTraversal(_) => ErrorKind::Security,
            Self::PersistenceFailure(_) => ErrorKind::Persistence,
            Self::StorageFailure(_) => ErrorKind::Storage,
            Self::FileSystem(_) | Self::UploadTimeout(_) | Self::IncompleteUpload { .. } => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::FileSystem(err.to_string())
    }
}

impl From<zip::result::ZipError> for IngestError {
    fn from(err: zip::result::ZipError) -> Self {
        IngestError::MalformedArchive(err.to_string())
    }
}

impl From<sea_orm::DbErr> for IngestError {
    fn from(err: sea_orm::DbErr) -> Self {
        IngestError::PersistenceFailure(err.to_string())
    }
}

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage (S3) operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Outbound HTTP call failed
    #[error("Webhook error: {0}")]
    Webhook(String),

    /// Server is at capacity
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Feature reserved for a later release
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// An ingestion request failed; detail stays server-side.
    #[error("Ingestion request {request_id} failed: {source}")]
    Ingest {
        request_id: Uuid,
        #[source]
        source: IngestError,
    },
}

impl AppError {
    fn ingest_status(err: &IngestError) -> StatusCode {
        match err {
            IngestError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            IngestError::AuthenticationFailed => StatusCode::UNPROCESSABLE_ENTITY,
            _ => match err.kind() {
                ErrorKind::ClientInput | ErrorKind::Security => StatusCode::BAD_REQUEST,
                ErrorKind::Persistence | ErrorKind::Storage | ErrorKind::Internal => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_code, response_message, request_id) = match self {
            AppError::Database(err_str) => {
                tracing::error!("Database error: {}", err_str);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                    None,
                )
            }
            AppError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                self.to_string(),
                None,
            ),
            AppError::InvalidInput(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                self.to_string(),
                None,
            ),
            AppError::Storage(err_str) => {
                tracing::error!("Storage error: {}", err_str);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "An internal storage error occurred".to_string(),
                    None,
                )
            }
            AppError::Webhook(_) => (
                StatusCode::BAD_GATEWAY,
                "WEBHOOK_ERROR",
                self.to_string(),
                None,
            ),
            AppError::ServiceUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                self.to_string(),
                None,
            ),
            AppError::NotImplemented(_) => (
                StatusCode::NOT_IMPLEMENTED,
                "NOT_IMPLEMENTED",
                self.to_string(),
                None,
            ),
            AppError::Ingest { request_id, source } => (
                Self::ingest_status(source),
                source.code(),
                format!(
                    "Request {} could not be processed. Query its status for details.",
                    request_id
                ),
                Some(*request_id),
            ),
        };

        HttpResponse::build(status).json(ErrorResponse {
            error: error_code.to_string(),
            message: response_message,
            request_id,
        })
    }
}

/// Error response body matching OpenAPI schema.
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("Invalid UUID: {}", err))
    }
}

impl From<AppError> for IngestError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Storage(msg) => IngestError::StorageFailure(msg),
            AppError::Ingest { source, .. } => source,
            other => IngestError::PersistenceFailure(other.to_string()),
        }
    }
}
