//! In-memory ledger for tests
//!
//! Honors the same contract as the PostgreSQL ledger: `insert` is an atomic
//! check-and-claim on `(owner, key, route)` through the map's entry API.
//! Failure toggles let tests drive every gateway branch.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::ledger::{IdempotencyLedger, LedgerError, LegacyLedger};
use super::types::{IdempotencyRecord, KeyScope, LegacyRecord, RecordPatch};

pub struct MemoryLedger {
    records: DashMap<KeyScope, IdempotencyRecord>,
    legacy: DashMap<(String, String), LegacyRecord>,
    /// Behave like a table without the `route` column
    legacy_only: AtomicBool,
    fail_insert: AtomicBool,
    fail_read: AtomicBool,
    fail_update: AtomicBool,
    insert_count: AtomicUsize,
    update_count: AtomicUsize,
    legacy_insert_count: AtomicUsize,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            legacy: DashMap::new(),
            legacy_only: AtomicBool::new(false),
            fail_insert: AtomicBool::new(false),
            fail_read: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            insert_count: AtomicUsize::new(0),
            update_count: AtomicUsize::new(0),
            legacy_insert_count: AtomicUsize::new(0),
        }
    }

    /// Ledger whose storage has not been migrated yet
    pub fn legacy_only() -> Self {
        let ledger = Self::new();
        ledger.legacy_only.store(true, Ordering::SeqCst);
        ledger
    }

    pub fn set_fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_read(&self, fail: bool) {
        self.fail_read.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    /// Place a record directly, bypassing the insert contract
    pub fn seed(&self, record: IdempotencyRecord) {
        self.records.insert(record.scope.clone(), record);
    }

    pub fn get(&self, scope: &KeyScope) -> Option<IdempotencyRecord> {
        self.records.get(scope).map(|r| r.value().clone())
    }

    pub fn get_legacy(&self, key: &str, path: &str) -> Option<LegacyRecord> {
        self.legacy
            .get(&(key.to_string(), path.to_string()))
            .map(|r| r.value().clone())
    }

    pub fn insert_count(&self) -> usize {
        self.insert_count.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.update_count.load(Ordering::SeqCst)
    }

    pub fn legacy_insert_count(&self) -> usize {
        self.legacy_insert_count.load(Ordering::SeqCst)
    }

    fn check_schema(&self) -> Result<(), LedgerError> {
        if self.legacy_only.load(Ordering::SeqCst) {
            return Err(LedgerError::SchemaMismatch(
                "column \"route\" of relation \"idempotency_keys\" does not exist".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl IdempotencyLedger for MemoryLedger {
    async fn insert(&self, record: &IdempotencyRecord) -> Result<IdempotencyRecord, LedgerError> {
        self.insert_count.fetch_add(1, Ordering::SeqCst);
        self.check_schema()?;
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(LedgerError::Backend("connection reset".into()));
        }

        match self.records.entry(record.scope.clone()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateKey),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(record.clone())
            }
        }
    }

    async fn read_by_key(&self, scope: &KeyScope) -> Result<Option<IdempotencyRecord>, LedgerError> {
        self.check_schema()?;
        if self.fail_read.load(Ordering::SeqCst) {
            return Err(LedgerError::Backend("read timeout".into()));
        }
        Ok(self.get(scope))
    }

    async fn update_by_key(
        &self,
        scope: &KeyScope,
        patch: &RecordPatch,
    ) -> Result<bool, LedgerError> {
        self.update_count.fetch_add(1, Ordering::SeqCst);
        self.check_schema()?;
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(LedgerError::Backend("write timeout".into()));
        }

        match self.records.get_mut(scope) {
            Some(mut record) if record.status.can_transition_to(patch.status) => {
                record.status = patch.status;
                record.response_body = Some(patch.response_body.clone());
                record.status_code = Some(patch.status_code);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl LegacyLedger for MemoryLedger {
    async fn read_by_key(&self, key: &str, path: &str) -> Result<Option<LegacyRecord>, LedgerError> {
        if self.fail_read.load(Ordering::SeqCst) {
            return Err(LedgerError::Backend("read timeout".into()));
        }
        Ok(self.get_legacy(key, path))
    }

    async fn insert(&self, record: &LegacyRecord) -> Result<(), LedgerError> {
        self.legacy_insert_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(LedgerError::Backend("write timeout".into()));
        }
        self.legacy.insert(
            (record.key.clone(), record.path.clone()),
            record.clone(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::types::IdempotencyStatus;
    use serde_json::json;

    fn scope() -> KeyScope {
        KeyScope::new("u1", "k1", "/v1/transactions")
    }

    #[tokio::test]
    async fn test_insert_claims_scope_once() {
        let ledger = MemoryLedger::new();
        let record = IdempotencyRecord::in_progress(scope());

        assert!(IdempotencyLedger::insert(&ledger, &record).await.is_ok());
        assert_eq!(
            IdempotencyLedger::insert(&ledger, &record).await,
            Err(LedgerError::DuplicateKey)
        );
        assert_eq!(ledger.insert_count(), 2);
    }

    #[tokio::test]
    async fn test_scope_includes_owner_and_route() {
        let ledger = MemoryLedger::new();
        let a = IdempotencyRecord::in_progress(KeyScope::new("u1", "k1", "/v1/transactions"));
        let b = IdempotencyRecord::in_progress(KeyScope::new("u2", "k1", "/v1/transactions"));
        let c = IdempotencyRecord::in_progress(KeyScope::new("u1", "k1", "/v1/other"));

        assert!(IdempotencyLedger::insert(&ledger, &a).await.is_ok());
        assert!(IdempotencyLedger::insert(&ledger, &b).await.is_ok());
        assert!(IdempotencyLedger::insert(&ledger, &c).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_never_regresses() {
        let ledger = MemoryLedger::new();
        IdempotencyLedger::insert(&ledger, &IdempotencyRecord::in_progress(scope()))
            .await
            .unwrap();

        let done = RecordPatch {
            status: IdempotencyStatus::Completed,
            response_body: json!({"ok": true}),
            status_code: 201,
        };
        assert!(ledger.update_by_key(&scope(), &done).await.unwrap());

        let failed = RecordPatch {
            status: IdempotencyStatus::Failed,
            response_body: json!({"error": "X"}),
            status_code: 500,
        };
        assert!(!ledger.update_by_key(&scope(), &failed).await.unwrap());
        assert_eq!(
            ledger.get(&scope()).unwrap().status,
            IdempotencyStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_legacy_only_rejects_current_schema() {
        let ledger = MemoryLedger::legacy_only();
        let result =
            IdempotencyLedger::insert(&ledger, &IdempotencyRecord::in_progress(scope())).await;
        assert!(matches!(result, Err(LedgerError::SchemaMismatch(_))));

        let legacy = LegacyRecord {
            key: "k1".into(),
            path: "/v1/transactions".into(),
            status_code: Some(201),
            response_body: Some(json!({"transaction": {"id": "t1"}})),
        };
        LegacyLedger::insert(&ledger, &legacy).await.unwrap();
        assert_eq!(
            LegacyLedger::read_by_key(&ledger, "k1", "/v1/transactions")
                .await
                .unwrap(),
            Some(legacy)
        );
    }
}
