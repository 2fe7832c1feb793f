//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::gateway::handlers::{HealthResponse, TransactionListResponse};

/// Bearer token issued by the auth service
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Access token from the auth service"))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Moni Gateway API",
        version = "1.0.0",
        description = "Idempotent transaction gateway. POST /v1/transactions requires an Idempotency-Key header.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health::health_check,
        crate::gateway::handlers::transactions::create_transaction,
        crate::gateway::handlers::transactions::list_transactions,
        crate::gateway::handlers::transactions::update_transaction,
        crate::gateway::handlers::transactions::delete_transaction,
        crate::gateway::handlers::agent::create_agent_transaction,
    ),
    components(
        schemas(
            HealthResponse,
            TransactionListResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Transactions", description = "Transaction mutations and queries (bearer auth)"),
        (name = "Agent", description = "Trusted-agent entry point (x-api-key)"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;
