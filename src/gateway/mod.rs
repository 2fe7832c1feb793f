pub mod error;
pub mod handlers;
pub mod openapi;
pub mod state;


use anyhow::Context;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::identity_middleware;
use crate::config::GatewayConfig;
use crate::idempotency::{IDEMPOTENCY_KEY_HEADER, TRANSACTIONS_ROUTE, idempotency_middleware};
use state::AppState;

/// CORS policy from `gateway.cors_origin`.
///
/// `*` allows any origin; otherwise a comma-separated list of exact origins.
/// Unparseable entries are skipped.
pub fn cors_layer(cors_origin: &str) -> CorsLayer {
    let origin = if cors_origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = cors_origin
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(IDEMPOTENCY_KEY_HEADER),
        ])
}

/// Build the HTTP router.
///
/// CORS is outermost so preflights are answered before identity resolution.
/// Identity wraps every route (exemptions are decided inside the
/// middleware); the idempotency layer sits only on `/v1/transactions`.
pub fn build_router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    // ==========================================================================
    // Guarded route: POST goes through the idempotency gateway
    // ==========================================================================
    let guarded = Router::new()
        .route(
            TRANSACTIONS_ROUTE,
            post(handlers::create_transaction).get(handlers::list_transactions),
        )
        .route_layer(from_fn_with_state(state.clone(), idempotency_middleware));

    // ==========================================================================
    // Everything else
    // ==========================================================================
    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/v1/transactions/agent",
            post(handlers::create_agent_transaction),
        )
        .route(
            "/v1/transactions/{id}",
            put(handlers::update_transaction).delete(handlers::delete_transaction),
        )
        .merge(guarded)
        .with_state(state.clone())
        // Stateless docs, added after with_state
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()));

    app.layer(from_fn_with_state(state, identity_middleware))
        .layer(cors)
}

/// Start HTTP Gateway server
pub async fn run_server(config: &GatewayConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    let idempotency = if state.idempotency.is_enabled() {
        state.idempotency.mode().as_str()
    } else {
        "disabled"
    };
    let app = build_router(state, cors_layer(&config.cors_origin));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {} (port already in use?)", addr))?;

    tracing::info!(
        addr = %addr,
        idempotency = idempotency,
        cors_origin = %config.cors_origin,
        "gateway listening"
    );
    tracing::info!("API docs: http://{}/docs", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
