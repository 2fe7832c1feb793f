use std::sync::Arc;

use crate::auth::{AuthExemptions, IdentityVerifier};
use crate::db::Database;
use crate::idempotency::IdempotencyGateway;
use crate::transaction::TransactionBackend;

/// Gateway shared state
#[derive(Clone)]
pub struct AppState {
    /// Bearer token → user id
    pub identity: Arc<dyn IdentityVerifier>,
    /// Routes that skip identity resolution
    pub exemptions: AuthExemptions,
    /// Guards POST /v1/transactions
    pub idempotency: Arc<IdempotencyGateway>,
    /// Transaction procedures
    pub transactions: Arc<dyn TransactionBackend>,
    /// Trusted-agent shared secret (unset rejects all agent calls)
    pub agent_key: Option<String>,
    /// PostgreSQL, pinged by /health when present
    pub db: Option<Arc<Database>>,
}

impl AppState {
    pub fn new(
        identity: Arc<dyn IdentityVerifier>,
        exemptions: AuthExemptions,
        idempotency: Arc<IdempotencyGateway>,
        transactions: Arc<dyn TransactionBackend>,
    ) -> Self {
        Self {
            identity,
            exemptions,
            idempotency,
            transactions,
            agent_key: None,
            db: None,
        }
    }

    pub fn with_agent_key(mut self, key: Option<String>) -> Self {
        self.agent_key = key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_database(mut self, db: Arc<Database>) -> Self {
        self.db = Some(db);
        self
    }
}
