//! Idempotent mutation gateway
//!
//! A client-supplied `Idempotency-Key` maps to at most one execution of the
//! guarded handler, across retries, concurrent duplicates and both ledger
//! layouts.
//!
//! - [`types`]: records, statuses and the `Reply` value
//! - [`ledger`]: store contract and error classes
//! - [`pg`]: PostgreSQL ledger and schema probe
//! - [`gateway`]: the state machine
//! - [`middleware`]: axum adapter

pub mod gateway;
pub mod ledger;
#[cfg(test)]
pub mod memory;
pub mod middleware;
pub mod pg;
pub mod types;

pub use gateway::{IdempotencyGateway, IdempotentRequest, TRANSACTIONS_ROUTE};
pub use ledger::{IdempotencyLedger, LedgerError, LedgerMode, LegacyLedger};
pub use middleware::{IDEMPOTENCY_KEY_HEADER, idempotency_middleware};
pub use pg::PgLedger;
pub use types::{IdempotencyRecord, IdempotencyStatus, KeyScope, LegacyRecord, RecordPatch, Reply};
