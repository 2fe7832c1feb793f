//! Identity middleware for Axum.
//!
//! Resolves `Authorization: Bearer <token>` into an [`AuthenticatedUser`]
//! request extension. Exempt routes pass through untouched.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::verifier::IdentityError;
use crate::config::IdentityConfig;
use crate::gateway::error::ApiError;
use crate::gateway::state::AppState;

/// Shared-secret header of the trusted-agent route
pub const AGENT_KEY_HEADER: &str = "x-api-key";

/// Caller identity attached by [`identity_middleware`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// Routes that skip identity resolution: exact paths and explicit prefixes.
#[derive(Debug, Clone, Default)]
pub struct AuthExemptions {
    paths: Vec<String>,
    prefixes: Vec<String>,
}

impl AuthExemptions {
    pub fn new(paths: Vec<String>, prefixes: Vec<String>) -> Self {
        Self { paths, prefixes }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(config.exempt_paths.clone(), config.exempt_prefixes.clone())
    }

    pub fn is_exempt(&self, method: &Method, path: &str) -> bool {
        *method == Method::OPTIONS
            || self.paths.iter().any(|p| p == path)
            || self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

/// Extract the token from an `Authorization` header value.
///
/// The scheme must be exactly `Bearer `; whitespace after it is trimmed.
pub fn bearer_token(header_value: Option<&str>) -> Result<&str, IdentityError> {
    let value = header_value.ok_or(IdentityError::MissingCredential)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(IdentityError::MalformedCredential)?
        .trim();
    if token.is_empty() {
        return Err(IdentityError::MalformedCredential);
    }
    Ok(token)
}

/// Constant-shape comparison of the agent secret.
///
/// An unconfigured secret rejects everything.
pub fn verify_agent_key(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let expected = match expected {
        Some(key) if !key.is_empty() => key,
        _ => return Err(ApiError::Unauthenticated),
    };
    let provided = headers
        .get(AGENT_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthenticated)?;

    let matches = provided.len() == expected.len()
        && provided
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0;
    if matches {
        Ok(())
    } else {
        Err(ApiError::Unauthenticated)
    }
}

pub async fn identity_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if state
        .exemptions
        .is_exempt(request.method(), request.uri().path())
    {
        return next.run(request).await;
    }

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match bearer_token(header_value) {
        Ok(token) => token.to_string(),
        Err(e) => {
            tracing::debug!(reason = e.code(), "rejecting request without bearer token");
            return ApiError::Unauthenticated.into_response();
        }
    };

    match state.identity.verify(&token).await {
        Ok(user_id) => {
            request
                .extensions_mut()
                .insert(AuthenticatedUser { user_id });
            next.run(request).await
        }
        Err(e) => {
            match &e {
                IdentityError::Unavailable(_) => {
                    tracing::warn!(error = %e, "identity service call failed")
                }
                _ => tracing::debug!(error = %e, "bearer token rejected"),
            }
            ApiError::Unauthenticated.into_response()
        }
    }
}
