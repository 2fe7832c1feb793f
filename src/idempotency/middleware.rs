//! Axum adapter for the idempotency gateway.
//!
//! `Next` is turned into a plain `FnOnce() -> Reply` by buffering the
//! handler's JSON body, so the gateway sees exactly what the client gets.

use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use super::gateway::IdempotentRequest;
use super::types::Reply;
use crate::auth::AuthenticatedUser;
use crate::gateway::state::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Upper bound on a buffered handler body
const MAX_CAPTURED_BODY: usize = 1024 * 1024;

pub async fn idempotency_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let gateway = &state.idempotency;
    if request.method() != Method::POST || request.uri().path() != gateway.route() {
        return next.run(request).await;
    }

    let key = request
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let owner = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.user_id.clone());

    let req = IdempotentRequest {
        key: key.as_deref(),
        owner: owner.as_deref(),
    };
    let result = gateway
        .execute(req, || async move { capture_reply(next.run(request).await).await })
        .await;

    match result {
        Ok(reply) => reply.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Buffer a handler response into a [`Reply`].
///
/// The ledger form is the parsed JSON body; non-JSON bodies are kept as a
/// JSON string and an empty body becomes `null`. Headers and raw bytes ride
/// along so the first response reaches the client unchanged.
pub async fn capture_reply(response: Response) -> Reply {
    let (parts, body) = response.into_parts();
    match to_bytes(body, MAX_CAPTURED_BODY).await {
        Ok(bytes) => {
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            };
            Reply::captured(parts.status, value, parts.headers, bytes)
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to buffer handler response");
            Reply::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "INTERNAL" }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;

    #[tokio::test]
    async fn test_capture_json_body() {
        let response =
            (StatusCode::CREATED, Json(json!({ "transaction": { "id": "t1" } }))).into_response();
        let reply = capture_reply(response).await;
        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.body, json!({ "transaction": { "id": "t1" } }));
    }

    #[tokio::test]
    async fn test_capture_plain_text_body() {
        let response = (StatusCode::BAD_REQUEST, "bad things").into_response();
        let reply = capture_reply(response).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body, Value::String("bad things".into()));
    }

    #[tokio::test]
    async fn test_plain_text_passes_through_unchanged() {
        let response = (StatusCode::PAYLOAD_TOO_LARGE, "length limit exceeded").into_response();
        let response = capture_reply(response).await.into_response();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"length limit exceeded");
    }

    #[tokio::test]
    async fn test_handler_headers_survive() {
        let response = (
            StatusCode::CREATED,
            [("x-request-id", "r-42")],
            Json(json!({ "ok": true })),
        )
            .into_response();
        let response = capture_reply(response).await.into_response();

        assert_eq!(response.headers()["x-request-id"], "r-42");
        assert_eq!(response.headers()["content-type"], "application/json");
    }

    #[tokio::test]
    async fn test_capture_empty_body() {
        let reply = capture_reply(StatusCode::NO_CONTENT.into_response()).await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);
        assert_eq!(reply.body, Value::Null);
    }
}
