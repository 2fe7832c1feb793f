//! PostgreSQL Idempotency Ledger
//!
//! Both record shapes live in the `idempotency_keys` table. Uses runtime
//! queries so builds don't need a live database. Mutual exclusion comes from
//! the `(user_id, key, route)` unique constraint (see
//! `migrations/0001_idempotency_keys.sql`).

use async_trait::async_trait;
use sqlx::PgPool;

use super::ledger::{IdempotencyLedger, LedgerError, LedgerMode, LegacyLedger};
use super::types::{IdempotencyRecord, IdempotencyStatus, KeyScope, LegacyRecord, RecordPatch};
use crate::db::{SafeRow, sqlstate};

/// unique_violation
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";
/// undefined_column
const SQLSTATE_UNDEFINED_COLUMN: &str = "42703";

/// Map a SQLSTATE to the ledger's error classes
pub fn classify_sqlstate(code: Option<&str>, message: String) -> LedgerError {
    match code {
        Some(SQLSTATE_UNIQUE_VIOLATION) => LedgerError::DuplicateKey,
        Some(SQLSTATE_UNDEFINED_COLUMN) => LedgerError::SchemaMismatch(message),
        _ => LedgerError::Backend(message),
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        let code = sqlstate(&e);
        classify_sqlstate(code.as_deref(), e.to_string())
    }
}

/// Idempotency ledger on PostgreSQL
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Capability probe: does the table carry the current-schema `route`
    /// column?
    pub async fn probe_mode(&self) -> Result<LedgerMode, LedgerError> {
        let has_route = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_name = 'idempotency_keys' AND column_name = 'route'
            )
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(if has_route {
            LedgerMode::Current
        } else {
            LedgerMode::Legacy
        })
    }

    fn row_to_record(
        scope: &KeyScope,
        row: &sqlx::postgres::PgRow,
    ) -> Result<IdempotencyRecord, LedgerError> {
        let status = row
            .try_get_log::<String>("status")
            .ok_or_else(|| LedgerError::Backend("status column unreadable".into()))?;
        let status = IdempotencyStatus::parse(&status)
            .ok_or_else(|| LedgerError::Backend(format!("unknown status '{}'", status)))?;
        let status_code = row.try_get_log::<Option<i32>>("status_code").flatten();

        Ok(IdempotencyRecord {
            scope: scope.clone(),
            status,
            response_body: row
                .try_get_log::<Option<serde_json::Value>>("response_body")
                .flatten(),
            status_code: status_code.and_then(|c| u16::try_from(c).ok()),
        })
    }
}

#[async_trait]
impl IdempotencyLedger for PgLedger {
    async fn insert(&self, record: &IdempotencyRecord) -> Result<IdempotencyRecord, LedgerError> {
        let row = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (user_id, key, route, status)
            VALUES ($1, $2, $3, $4)
            RETURNING status, response_body, status_code
            "#,
        )
        .bind(&record.scope.owner)
        .bind(&record.scope.key)
        .bind(&record.scope.route)
        .bind(record.status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_record(&record.scope, &row)
    }

    async fn read_by_key(&self, scope: &KeyScope) -> Result<Option<IdempotencyRecord>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT status, response_body, status_code
            FROM idempotency_keys
            WHERE user_id = $1 AND key = $2 AND route = $3
            "#,
        )
        .bind(&scope.owner)
        .bind(&scope.key)
        .bind(&scope.route)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_record(scope, &row)?)),
            None => Ok(None),
        }
    }

    async fn update_by_key(
        &self,
        scope: &KeyScope,
        patch: &RecordPatch,
    ) -> Result<bool, LedgerError> {
        // Guarded on in_progress: terminal records never change
        let result = sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET status = $4, response_body = $5, status_code = $6, updated_at = NOW()
            WHERE user_id = $1 AND key = $2 AND route = $3 AND status = 'in_progress'
            "#,
        )
        .bind(&scope.owner)
        .bind(&scope.key)
        .bind(&scope.route)
        .bind(patch.status.as_str())
        .bind(&patch.response_body)
        .bind(i32::from(patch.status_code))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl LegacyLedger for PgLedger {
    async fn read_by_key(&self, key: &str, path: &str) -> Result<Option<LegacyRecord>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT response_body, status_code
            FROM idempotency_keys
            WHERE key = $1 AND path = $2
            "#,
        )
        .bind(key)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let status_code = row.try_get_log::<Option<i32>>("status_code").flatten();
            LegacyRecord {
                key: key.to_string(),
                path: path.to_string(),
                status_code: status_code.and_then(|c| u16::try_from(c).ok()),
                response_body: row
                    .try_get_log::<Option<serde_json::Value>>("response_body")
                    .flatten(),
            }
        }))
    }

    async fn insert(&self, record: &LegacyRecord) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, path, status_code, response_body)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&record.key)
        .bind(&record.path)
        .bind(record.status_code.map(i32::from))
        .bind(&record.response_body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
