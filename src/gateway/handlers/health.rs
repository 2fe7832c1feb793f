//! Health check handler

use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::Utc;
use utoipa::ToSchema;

use crate::gateway::error::ApiError;
use crate::gateway::state::AppState;

#[derive(serde::Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = true)]
    pub ok: bool,
    /// Server time in milliseconds
    #[schema(example = 1703494800000_i64)]
    pub ts: i64,
    /// Crate version and git hash
    #[schema(example = "0.1.0+a1b2c3d")]
    pub version: String,
}

/// Health check endpoint
///
/// Pings PostgreSQL when one is attached. Failure details are logged, never
/// returned.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse, content_type = "application/json"),
        (status = 503, description = "Database unreachable")
    ),
    tag = "System"
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    if let Some(db) = &state.db {
        if let Err(e) = db.health_check().await {
            tracing::error!("[HEALTH] PostgreSQL ping failed: {}", e);
            return Err(ApiError::Unavailable);
        }
    }

    Ok(Json(HealthResponse {
        ok: true,
        ts: Utc::now().timestamp_millis(),
        version: format!("{}+{}", env!("CARGO_PKG_VERSION"), env!("GIT_HASH")),
    }))
}
