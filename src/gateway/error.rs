//! API Error Types
//!
//! Every failure the gateway sends back is `{ "error": <CODE> }`, with
//! `details` added for payload violations. Internal causes are logged,
//! never serialized.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;

use crate::transaction::payload::FieldViolation;

/// Why a duplicate submission could not be replayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// First submission is still running
    InProgress,
    /// First submission failed; the key is burned
    RetryLater,
}

impl ConflictReason {
    pub fn code(&self) -> &'static str {
        match self {
            ConflictReason::InProgress => "IN_PROGRESS",
            ConflictReason::RetryLater => "RETRY_LATER",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Missing or invalid credentials")]
    Unauthenticated,

    #[error("Asserted owner does not match the caller")]
    Forbidden,

    #[error("Invalid payload: {code}")]
    InvalidPayload {
        code: &'static str,
        details: Vec<FieldViolation>,
    },

    #[error("Idempotency-Key header is required")]
    KeyRequired,

    #[error("Idempotency conflict: {}", .0.code())]
    Conflict(ConflictReason),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Domain error from the remote procedure, relayed verbatim
    #[error("{0}")]
    UpstreamRejected(String),

    #[error("Service unavailable")]
    Unavailable,
}

impl ApiError {
    pub fn invalid(code: &'static str) -> Self {
        ApiError::InvalidPayload {
            code,
            details: Vec::new(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "UNAUTHORIZED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::InvalidPayload { code, .. } => *code,
            ApiError::KeyRequired => "IDEMPOTENCY_KEY_REQUIRED",
            ApiError::Conflict(reason) => reason.code(),
            ApiError::Internal(_) => "INTERNAL",
            ApiError::UpstreamRejected(_) => "UPSTREAM_REJECTED",
            ApiError::Unavailable => "UNAVAILABLE",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::InvalidPayload { .. } => StatusCode::BAD_REQUEST,
            ApiError::KeyRequired => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::UpstreamRejected(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Response body as sent to the client
    pub fn body(&self) -> Value {
        match self {
            ApiError::InvalidPayload { code, details } if !details.is_empty() => {
                json!({ "error": code, "details": details })
            }
            ApiError::UpstreamRejected(message) => json!({ "error": message }),
            other => json!({ "error": other.code() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(cause) = &self {
            tracing::error!(cause = %cause, "request failed with internal error");
        }
        (self.http_status(), Json(self.body())).into_response()
    }
}
