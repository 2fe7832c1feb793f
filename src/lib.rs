//! Moni Gateway - Idempotent transaction API
//!
//! An HTTP front for the personal-finance ledger. Clients create, list,
//! update and delete transactions; creation is guarded so a retried request
//! with the same `Idempotency-Key` never executes twice.
//!
//! # Modules
//!
//! - [`config`] - YAML + environment configuration
//! - [`logging`] - tracing subscriber setup
//! - [`db`] - PostgreSQL pool
//! - [`auth`] - bearer-token identity and agent key
//! - [`idempotency`] - ledger, state machine and middleware
//! - [`transaction`] - payload validation and stored procedures
//! - [`gateway`] - axum router, handlers and OpenAPI docs

pub mod auth;
pub mod config;
pub mod db;
pub mod gateway;
pub mod idempotency;
pub mod logging;
pub mod transaction;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use gateway::{build_router, cors_layer, run_server};
pub use idempotency::{IdempotencyGateway, LedgerMode, Reply};
