//! Ledger Store Contract
//!
//! Insert, read and update by unique key are the whole persistence contract
//! the gateway relies on. Any store that enforces uniqueness of
//! `(owner, key, route)` on insert can back it.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{IdempotencyRecord, KeyScope, LegacyRecord, RecordPatch};

/// Ledger failures, classified for the gateway's branch selection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Another request already holds this `(owner, key, route)`
    #[error("Idempotency key already exists")]
    DuplicateKey,

    /// The store does not know the current schema (unmigrated ledger)
    #[error("Ledger schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Ledger backend error: {0}")]
    Backend(String),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::DuplicateKey => "DUPLICATE_KEY",
            LedgerError::SchemaMismatch(_) => "SCHEMA_MISMATCH",
            LedgerError::Backend(_) => "BACKEND",
        }
    }
}

/// Which record shape the ledger storage currently has
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerMode {
    /// Owner/route scoped records with status tracking
    Current,
    /// Pre-migration `(key, path)` records; transitional only
    Legacy,
}

impl LedgerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerMode::Current => "current",
            LedgerMode::Legacy => "legacy",
        }
    }
}

/// Current-schema ledger accessor
#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    /// Insert a new record. Must fail with [`LedgerError::DuplicateKey`] when
    /// the scope already exists.
    async fn insert(&self, record: &IdempotencyRecord) -> Result<IdempotencyRecord, LedgerError>;

    async fn read_by_key(&self, scope: &KeyScope) -> Result<Option<IdempotencyRecord>, LedgerError>;

    /// Finalize an in-progress record.
    ///
    /// Returns `false` when no in-progress record matched (already terminal or
    /// gone); terminal records are never rewritten.
    async fn update_by_key(&self, scope: &KeyScope, patch: &RecordPatch)
    -> Result<bool, LedgerError>;
}

/// Legacy-schema ledger accessor
#[async_trait]
pub trait LegacyLedger: Send + Sync {
    async fn read_by_key(&self, key: &str, path: &str) -> Result<Option<LegacyRecord>, LedgerError>;

    async fn insert(&self, record: &LegacyRecord) -> Result<(), LedgerError>;
}
