//! Trusted-agent entry point
//!
//! Exempt from bearer auth and from the idempotency gateway. Authenticated
//! by a shared secret in `x-api-key`; the payload names the user.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde_json::{Value, json};

use crate::auth::verify_agent_key;
use crate::gateway::error::ApiError;
use crate::gateway::state::AppState;
use crate::transaction::{PayloadRejection, validate_transaction};

/// Create a transaction on behalf of a user
#[utoipa::path(
    post,
    path = "/v1/transactions/agent",
    params(
        ("x-api-key" = String, Header, description = "Agent shared secret")
    ),
    request_body(content = String, description = "Transaction body; userId is required", content_type = "application/json"),
    responses(
        (status = 201, description = "Created", content_type = "application/json"),
        (status = 400, description = "INVALID_PAYLOAD, MISSING_USER, domain code or procedure rejection"),
        (status = 401, description = "Bad or missing agent key")
    ),
    tag = "Agent"
)]
pub async fn create_agent_transaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    verify_agent_key(&headers, state.agent_key.as_deref())?;

    let tx = validate_transaction(&body, None)?;
    let owner = tx.owner.clone().ok_or(PayloadRejection::MissingUser)?;
    let row = state.transactions.create(&owner, &tx).await?;

    tracing::info!(user_id = %owner, kind = tx.kind.as_str(), "agent transaction created");
    Ok((StatusCode::CREATED, Json(json!({ "transaction": row }))))
}
