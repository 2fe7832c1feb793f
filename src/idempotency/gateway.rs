//! Idempotency Gateway
//!
//! Maps a client key to at most one handler execution.
//!
//! ```text
//! insert(owner, key, route, in_progress)
//!   ├─ ok              → run handler → finalize(completed | failed) → reply
//!   ├─ duplicate       → read → completed: replay
//!   │                          in_progress: 409 IN_PROGRESS
//!   │                          failed: 409 RETRY_LATER
//!   ├─ schema mismatch → legacy path for this request
//!   └─ other           → 500 INTERNAL
//! ```
//!
//! Mutual exclusion comes only from the ledger's uniqueness on insert, so the
//! gateway holds no in-process state and works across instances.

use std::future::Future;
use std::sync::Arc;

use axum::http::StatusCode;

use super::ledger::{IdempotencyLedger, LedgerError, LedgerMode, LegacyLedger};
use super::types::{IdempotencyRecord, IdempotencyStatus, KeyScope, LegacyRecord, RecordPatch, Reply};
use crate::gateway::error::{ApiError, ConflictReason};

/// The one route guarded by the gateway (POST only)
pub const TRANSACTIONS_ROUTE: &str = "/v1/transactions";

/// Replay status when a completed record has no stored code
const CURRENT_REPLAY_DEFAULT: StatusCode = StatusCode::CREATED;
const LEGACY_REPLAY_DEFAULT: StatusCode = StatusCode::OK;

/// Inputs the gateway needs from the request
#[derive(Debug, Clone, Copy, Default)]
pub struct IdempotentRequest<'a> {
    /// `Idempotency-Key` header value
    pub key: Option<&'a str>,
    /// Resolved caller identity
    pub owner: Option<&'a str>,
}

pub struct IdempotencyGateway {
    ledger: Arc<dyn IdempotencyLedger>,
    legacy: Arc<dyn LegacyLedger>,
    mode: LedgerMode,
    enabled: bool,
    route: String,
}

impl IdempotencyGateway {
    pub fn new(
        ledger: Arc<dyn IdempotencyLedger>,
        legacy: Arc<dyn LegacyLedger>,
        mode: LedgerMode,
    ) -> Self {
        Self {
            ledger,
            legacy,
            mode,
            enabled: true,
            route: TRANSACTIONS_ROUTE.to_string(),
        }
    }

    /// Operator switch; a disabled gateway never touches the ledger
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn mode(&self) -> LedgerMode {
        self.mode
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// Run `handler` under the idempotency protocol.
    ///
    /// `Ok` carries either the handler's reply or a replayed one; `Err` is a
    /// gateway rejection and the handler did not run.
    pub async fn execute<F, Fut>(
        &self,
        request: IdempotentRequest<'_>,
        handler: F,
    ) -> Result<Reply, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Reply>,
    {
        if !self.enabled {
            return Ok(handler().await);
        }

        let key = request
            .key
            .filter(|k| !k.is_empty())
            .ok_or(ApiError::KeyRequired)?;
        let owner = request
            .owner
            .filter(|o| !o.is_empty())
            .ok_or(ApiError::Unauthenticated)?;

        if self.mode == LedgerMode::Legacy {
            return Ok(self.execute_legacy(key, handler).await);
        }

        let scope = KeyScope::new(owner, key, self.route.as_str());
        match self
            .ledger
            .insert(&IdempotencyRecord::in_progress(scope.clone()))
            .await
        {
            Ok(_) => {
                let reply = handler().await;
                self.finalize(&scope, &reply).await;
                Ok(reply)
            }
            Err(LedgerError::DuplicateKey) => self.resolve_conflict(&scope).await,
            Err(LedgerError::SchemaMismatch(detail)) => {
                tracing::warn!(
                    detail = %detail,
                    "idempotency ledger lacks current schema, using legacy records"
                );
                Ok(self.execute_legacy(key, handler).await)
            }
            Err(LedgerError::Backend(cause)) => Err(ApiError::Internal(format!(
                "idempotency insert failed: {}",
                cause
            ))),
        }
    }

    /// Write the handler's outcome; failures are logged and swallowed.
    async fn finalize(&self, scope: &KeyScope, reply: &Reply) {
        let patch = RecordPatch::from_reply(reply);
        match self.ledger.update_by_key(scope, &patch).await {
            Ok(true) => {
                tracing::debug!(key = %scope.key, status = %patch.status, "idempotency record finalized");
            }
            Ok(false) => {
                tracing::warn!(
                    key = %scope.key,
                    owner = %scope.owner,
                    "idempotency record was not in progress at finalize"
                );
            }
            Err(e) => {
                tracing::error!(
                    key = %scope.key,
                    owner = %scope.owner,
                    code = e.code(),
                    error = %e,
                    "idempotency finalize error"
                );
            }
        }
    }

    async fn resolve_conflict(&self, scope: &KeyScope) -> Result<Reply, ApiError> {
        let existing = match self.ledger.read_by_key(scope).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return Err(ApiError::Internal(format!(
                    "idempotency record for key '{}' vanished after conflict",
                    scope.key
                )));
            }
            Err(e) => {
                return Err(ApiError::Internal(format!(
                    "idempotency read after conflict failed: {}",
                    e
                )));
            }
        };

        match existing.status {
            IdempotencyStatus::Completed => {
                tracing::info!(key = %scope.key, "replaying completed idempotent response");
                Ok(Reply::replay(
                    existing.status_code,
                    existing.response_body,
                    CURRENT_REPLAY_DEFAULT,
                ))
            }
            IdempotencyStatus::InProgress => Err(ApiError::Conflict(ConflictReason::InProgress)),
            IdempotencyStatus::Failed => Err(ApiError::Conflict(ConflictReason::RetryLater)),
        }
    }

    /// Pre-migration protocol: replay if a `(key, path)` record exists, else
    /// run and persist best-effort. No in-progress protection.
    async fn execute_legacy<F, Fut>(&self, key: &str, handler: F) -> Reply
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Reply>,
    {
        match self.legacy.read_by_key(key, &self.route).await {
            Ok(Some(record)) => {
                tracing::info!(key = %key, "replaying legacy idempotent response");
                return Reply::replay(record.status_code, record.response_body, LEGACY_REPLAY_DEFAULT);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %key, code = e.code(), error = %e, "legacy idempotency read failed");
            }
        }

        let reply = handler().await;
        let record = LegacyRecord {
            key: key.to_string(),
            path: self.route.clone(),
            status_code: Some(reply.status.as_u16()),
            response_body: Some(reply.body.clone()),
        };
        if let Err(e) = self.legacy.insert(&record).await {
            tracing::error!(key = %key, code = e.code(), error = %e, "idempotency legacy persist error");
        }
        reply
    }
}
