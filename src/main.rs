//! Moni Gateway
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌─────────────┐    ┌────────────┐
//! │  Client  │───▶│ Identity │───▶│ Idempotency │───▶│  Handler   │
//! │ (Bearer) │    │ resolver │    │   gateway   │    │ (Postgres) │
//! └──────────┘    └──────────┘    └─────────────┘    └────────────┘
//! ```
//!
//! Usage: `moni_gateway [--env dev] [--port 8080]`

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};

use moni_gateway::auth::{AuthExemptions, IdentityVerifier, JwtVerifier, RemoteIdentityVerifier};
use moni_gateway::config::{AppConfig, IdentityConfig, IdentityMode, LedgerSchemaSetting};
use moni_gateway::db::Database;
use moni_gateway::gateway::state::AppState;
use moni_gateway::idempotency::{IdempotencyGateway, LedgerMode, PgLedger};
use moni_gateway::transaction::PgTransactions;

fn arg_value(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| names.contains(&a.as_str()))
        .and_then(|i| args.get(i + 1).cloned())
}

fn get_env() -> String {
    arg_value(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    arg_value(&["--port"]).and_then(|p| p.parse().ok())
}

fn build_verifier(config: &IdentityConfig) -> anyhow::Result<Arc<dyn IdentityVerifier>> {
    match config.mode {
        IdentityMode::Jwt => {
            let secret = config
                .jwt_secret
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| anyhow!("identity.mode = jwt requires SUPABASE_JWT_SECRET"))?;
            Ok(Arc::new(JwtVerifier::new(
                secret,
                config.jwt_audience.as_deref(),
            )))
        }
        IdentityMode::Remote => {
            let url = config
                .supabase_url
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| anyhow!("identity.mode = remote requires SUPABASE_URL"))?;
            let anon_key = config.anon_key.as_deref().unwrap_or_default();
            let verifier = RemoteIdentityVerifier::new(
                url,
                anon_key,
                Duration::from_millis(config.request_timeout_ms),
            )
            .context("Failed to build auth service client")?;
            Ok(Arc::new(verifier))
        }
    }
}

async fn resolve_ledger_mode(setting: LedgerSchemaSetting, ledger: &PgLedger) -> LedgerMode {
    match setting {
        LedgerSchemaSetting::Current => LedgerMode::Current,
        LedgerSchemaSetting::Legacy => LedgerMode::Legacy,
        LedgerSchemaSetting::Auto => match ledger.probe_mode().await {
            Ok(mode) => mode,
            Err(e) => {
                // Per-request fallback still covers an unmigrated table
                tracing::warn!("[IDEMPOTENCY] schema probe failed, assuming current: {}", e);
                LedgerMode::Current
            }
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut app_config = AppConfig::load(&env)?;
    if let Some(port) = get_port_override() {
        app_config.gateway.port = port;
    }
    let _log_guard = moni_gateway::logging::init_logging(&app_config);

    tracing::info!("Starting Moni Gateway in {} mode", env);

    let db = Arc::new(
        Database::connect(&app_config.database)
            .await
            .context("Failed to connect to PostgreSQL")?,
    );

    let ledger = Arc::new(PgLedger::new(db.pool().clone()));
    let mode = resolve_ledger_mode(app_config.idempotency.schema, &ledger).await;
    let idempotency = IdempotencyGateway::new(ledger.clone(), ledger, mode)
        .with_enabled(!app_config.idempotency.disabled);
    if app_config.idempotency.disabled {
        tracing::warn!("[IDEMPOTENCY] gateway disabled by operator switch");
    }

    let identity = build_verifier(&app_config.identity)?;
    let transactions = Arc::new(PgTransactions::new(db.pool().clone()));

    let state = AppState::new(
        identity,
        AuthExemptions::from_config(&app_config.identity),
        Arc::new(idempotency),
        transactions,
    )
    .with_agent_key(app_config.agent.api_key.clone())
    .with_database(db);

    moni_gateway::gateway::run_server(&app_config.gateway, Arc::new(state)).await
}
