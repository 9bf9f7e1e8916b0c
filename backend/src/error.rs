use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// A validation failure tied to a single form field. These never leave the
/// process boundary as anything other than a 422 with per-field messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Outcomes of checking a code against the shared listing secret.
///
/// `InvalidCode` is the only variant that consumes a verification attempt;
/// `ServerMisconfigured` and `Transport` mean the code could not be checked
/// at all and must leave the attempt budget untouched.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("invalid verification code, {remaining_attempts} attempts remaining")]
    InvalidCode { remaining_attempts: u32 },

    #[error("maximum attempts exceeded")]
    Locked,

    #[error("verification code is not configured")]
    ServerMisconfigured,

    #[error("verification transport failure: {0}")]
    Transport(String),

    #[error("unknown or expired verification session")]
    UnknownSession,

    #[error("session has not completed verification")]
    NotVerified,
}

/// Failures while resolving staged previews into durable URLs. The image
/// batch is all-or-nothing: any of these aborts the whole resolve.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unsupported content type: {0}")]
    Rejected(String),

    #[error("unknown preview handle: {0}")]
    UnknownPreview(Uuid),

    #[error("object storage error: {0}")]
    Backend(String),

    #[error("upload timed out after {0:?}")]
    Timeout(Duration),
}

/// Failures while writing a record to the database. No record id exists
/// until the insert fully succeeds, so these are always retryable.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<diesel::result::Error> for PersistError {
    fn from(e: diesel::result::Error) -> Self {
        PersistError::Database(e.to_string())
    }
}

impl From<diesel::result::ConnectionError> for PersistError {
    fn from(e: diesel::result::ConnectionError) -> Self {
        PersistError::Connection(e.to_string())
    }
}

/// Top-level error surfaced by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Validation(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": "validation failed", "fields": fields }),
            ),
            ApiError::Verification(e) => {
                let status = match e {
                    VerificationError::InvalidCode { .. } => StatusCode::UNAUTHORIZED,
                    VerificationError::Locked => StatusCode::TOO_MANY_REQUESTS,
                    VerificationError::ServerMisconfigured => StatusCode::SERVICE_UNAVAILABLE,
                    VerificationError::Transport(_) => StatusCode::BAD_GATEWAY,
                    VerificationError::UnknownSession => StatusCode::UNAUTHORIZED,
                    VerificationError::NotVerified => StatusCode::UNAUTHORIZED,
                };
                let mut body = json!({ "error": e.to_string() });
                if let VerificationError::InvalidCode { remaining_attempts } = e {
                    body["remaining_attempts"] = json!(remaining_attempts);
                }
                (status, body)
            }
            ApiError::Upload(e) => {
                let status = match e {
                    UploadError::Rejected(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    UploadError::UnknownPreview(_) => StatusCode::NOT_FOUND,
                    UploadError::Backend(_) => StatusCode::BAD_GATEWAY,
                    UploadError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                };
                (
                    status,
                    json!({ "error": e.to_string(), "reason": "upload_failed" }),
                )
            }
            ApiError::Persist(e) => {
                log::error!("persistence failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": e.to_string(), "reason": "persist_failed" }),
                )
            }
            ApiError::NotFound => (StatusCode::NOT_FOUND, json!({ "error": "not found" })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
        };
        (status, Json(body)).into_response()
    }
}
