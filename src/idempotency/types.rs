//! Idempotency Record Types
//!
//! Status values are stored as lowercase text in the `status` column.

use std::fmt;

use axum::Json;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

/// Lifecycle of a current-schema ledger record
///
/// ```text
/// IN_PROGRESS → COMPLETED
///      ↓
///    FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdempotencyStatus {
    InProgress,
    Completed,
    Failed,
}

impl IdempotencyStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, IdempotencyStatus::Completed | IdempotencyStatus::Failed)
    }

    /// Only `InProgress` may move, and only to a terminal state.
    pub fn can_transition_to(&self, next: IdempotencyStatus) -> bool {
        matches!(self, IdempotencyStatus::InProgress) && next.is_terminal()
    }

    /// Terminal status for a handler response with this HTTP code
    pub fn for_response(status: StatusCode) -> Self {
        if status.as_u16() >= 400 {
            IdempotencyStatus::Failed
        } else {
            IdempotencyStatus::Completed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyStatus::InProgress => "in_progress",
            IdempotencyStatus::Completed => "completed",
            IdempotencyStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(IdempotencyStatus::InProgress),
            "completed" => Some(IdempotencyStatus::Completed),
            "failed" => Some(IdempotencyStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for IdempotencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unique key of a current-schema record: `(owner, key, route)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyScope {
    pub owner: String,
    pub key: String,
    pub route: String,
}

impl KeyScope {
    pub fn new(owner: impl Into<String>, key: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            key: key.into(),
            route: route.into(),
        }
    }
}

/// Current-schema ledger record
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    pub scope: KeyScope,
    pub status: IdempotencyStatus,
    pub response_body: Option<Value>,
    pub status_code: Option<u16>,
}

impl IdempotencyRecord {
    /// Fresh record claimed by the first request to see the key
    pub fn in_progress(scope: KeyScope) -> Self {
        Self {
            scope,
            status: IdempotencyStatus::InProgress,
            response_body: None,
            status_code: None,
        }
    }
}

/// Finalize patch written once the handler has answered
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPatch {
    pub status: IdempotencyStatus,
    pub response_body: Value,
    pub status_code: u16,
}

impl RecordPatch {
    pub fn from_reply(reply: &Reply) -> Self {
        Self {
            status: IdempotencyStatus::for_response(reply.status),
            response_body: reply.body.clone(),
            status_code: reply.status.as_u16(),
        }
    }
}

/// Pre-migration record: keyed on `(key, path)`, presence means completed
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRecord {
    pub key: String,
    pub path: String,
    pub status_code: Option<u16>,
    pub response_body: Option<Value>,
}

/// Handler output exactly as it left the handler
#[derive(Debug, Clone, PartialEq)]
pub struct WireBody {
    pub headers: HeaderMap,
    pub bytes: Bytes,
}

/// A handler's answer as a plain value: what the client receives and what
/// the ledger stores for replay.
///
/// `body` is the JSON form written to the ledger. A captured reply also
/// carries `wire`, which is sent instead so a first response keeps the
/// handler's headers and bytes (plain-text rejections included). Replays
/// rebuild a JSON response from `body`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
    pub wire: Option<WireBody>,
}

impl Reply {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body,
            wire: None,
        }
    }

    pub fn captured(status: StatusCode, body: Value, headers: HeaderMap, bytes: Bytes) -> Self {
        Self {
            status,
            body,
            wire: Some(WireBody { headers, bytes }),
        }
    }

    /// Rebuild a reply from a stored status code and body.
    ///
    /// Unparseable or missing codes fall back to `default_status`.
    pub fn replay(status_code: Option<u16>, body: Option<Value>, default_status: StatusCode) -> Self {
        let status = status_code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(default_status);
        Self::new(status, body.unwrap_or(Value::Null))
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self.wire {
            Some(wire) => {
                let mut response = (self.status, wire.bytes).into_response();
                *response.headers_mut() = wire.headers;
                response
            }
            None => (self.status, Json(self.body)).into_response(),
        }
    }
}
