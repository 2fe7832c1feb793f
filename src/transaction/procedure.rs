//! Transaction procedures
//!
//! Balance arithmetic and currency conversion live in database functions.
//! This layer only forwards validated input and relays their result.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;

use super::payload::ValidatedTransaction;
use crate::gateway::error::ApiError;

/// Default and maximum page size for listings
pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 500;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcedureError {
    /// The procedure refused the input; message is relayed to the client
    #[error("{0}")]
    Rejected(String),

    #[error("Transaction backend unavailable: {0}")]
    Unavailable(String),
}

impl ProcedureError {
    pub fn code(&self) -> &'static str {
        match self {
            ProcedureError::Rejected(_) => "REJECTED",
            ProcedureError::Unavailable(_) => "UNAVAILABLE",
        }
    }
}

impl From<sqlx::Error> for ProcedureError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            // Raised exceptions, constraint and cast failures come back as
            // database errors and carry a client-facing message.
            sqlx::Error::Database(db_err) => ProcedureError::Rejected(db_err.message().to_string()),
            other => ProcedureError::Unavailable(other.to_string()),
        }
    }
}

impl From<ProcedureError> for ApiError {
    fn from(e: ProcedureError) -> Self {
        tracing::warn!(code = e.code(), error = %e, "transaction procedure failed");
        match e {
            ProcedureError::Rejected(message) => ApiError::UpstreamRejected(message),
            ProcedureError::Unavailable(cause) => ApiError::Internal(cause),
        }
    }
}

/// Listing filters, already normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionFilter {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub transaction_type: Option<String>,
    pub origin_currency: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for TransactionFilter {
    fn default() -> Self {
        Self {
            date_from: None,
            date_to: None,
            transaction_type: None,
            origin_currency: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl TransactionFilter {
    /// Lenient paging: unparseable or non-positive limit → default, capped at
    /// the maximum; unparseable or negative offset → 0.
    pub fn with_paging(mut self, limit: Option<&str>, offset: Option<&str>) -> Self {
        self.limit = limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        self.offset = offset
            .and_then(|o| o.trim().parse::<i64>().ok())
            .unwrap_or(0)
            .max(0);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPage {
    pub transactions: Vec<Value>,
    pub filtered_count: i64,
    pub total_count: i64,
}

/// Remote procedures and table access for transactions
#[async_trait]
pub trait TransactionBackend: Send + Sync {
    /// `create_transaction_with_conversion`; returns the created row
    async fn create(&self, owner: &str, tx: &ValidatedTransaction) -> Result<Value, ProcedureError>;

    /// `update_transaction_with_conversion`; returns the updated row
    async fn update(
        &self,
        owner: &str,
        transaction_id: &str,
        tx: &ValidatedTransaction,
    ) -> Result<Value, ProcedureError>;

    /// Deletes the caller's row; `None` when nothing matched
    async fn delete(&self, owner: &str, transaction_id: &str)
    -> Result<Option<Value>, ProcedureError>;

    async fn list(
        &self,
        owner: &str,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage, ProcedureError>;
}

pub struct PgTransactions {
    pool: PgPool,
}

impl PgTransactions {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionBackend for PgTransactions {
    async fn create(&self, owner: &str, tx: &ValidatedTransaction) -> Result<Value, ProcedureError> {
        let row = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT to_jsonb(t) FROM create_transaction_with_conversion(
                p_user_id => $1::uuid,
                p_transaction_type => $2,
                p_origin_account_id => $3,
                p_destination_account_id => $4,
                p_category_id => $5,
                p_amount => $6,
                p_description => $7,
                p_transaction_date => $8::date
            ) AS t
            "#,
        )
        .bind(owner)
        .bind(tx.kind.as_str())
        .bind(tx.origin_account_id)
        .bind(tx.kind.destination_account_id())
        .bind(tx.kind.category_id())
        .bind(tx.amount)
        .bind(&tx.description)
        .bind(&tx.transaction_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn update(
        &self,
        owner: &str,
        transaction_id: &str,
        tx: &ValidatedTransaction,
    ) -> Result<Value, ProcedureError> {
        let row = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT to_jsonb(t) FROM update_transaction_with_conversion(
                p_user_id => $1::uuid,
                p_transaction_id => $2::uuid,
                p_transaction_type => $3,
                p_origin_account_id => $4,
                p_destination_account_id => $5,
                p_category_id => $6,
                p_amount_origin => $7,
                p_description => $8,
                p_transaction_date => $9::date
            ) AS t
            "#,
        )
        .bind(owner)
        .bind(transaction_id)
        .bind(tx.kind.as_str())
        .bind(tx.origin_account_id)
        .bind(tx.kind.destination_account_id())
        .bind(tx.kind.category_id())
        .bind(tx.amount)
        .bind(&tx.description)
        .bind(&tx.transaction_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn delete(
        &self,
        owner: &str,
        transaction_id: &str,
    ) -> Result<Option<Value>, ProcedureError> {
        let row = sqlx::query_scalar::<_, Value>(
            r#"
            DELETE FROM transactions t
            WHERE t.id = $1::uuid AND t.user_id = $2::uuid
            RETURNING to_jsonb(t)
            "#,
        )
        .bind(transaction_id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list(
        &self,
        owner: &str,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage, ProcedureError> {
        // NULL parameters disable their filter
        let transactions = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT to_jsonb(t) FROM transactions t
            WHERE t.user_id = $1::uuid
              AND ($2::date IS NULL OR t.transaction_date >= $2::date)
              AND ($3::date IS NULL OR t.transaction_date <= $3::date)
              AND ($4::text IS NULL OR t.transaction_type = $4::text)
              AND ($5::text IS NULL OR t.origin_currency_local = $5::text)
            ORDER BY t.transaction_date DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(owner)
        .bind(&filter.date_from)
        .bind(&filter.date_to)
        .bind(&filter.transaction_type)
        .bind(&filter.origin_currency)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        let filtered_count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM transactions t
            WHERE t.user_id = $1::uuid
              AND ($2::date IS NULL OR t.transaction_date >= $2::date)
              AND ($3::date IS NULL OR t.transaction_date <= $3::date)
              AND ($4::text IS NULL OR t.transaction_type = $4::text)
              AND ($5::text IS NULL OR t.origin_currency_local = $5::text)
            "#,
        )
        .bind(owner)
        .bind(&filter.date_from)
        .bind(&filter.date_to)
        .bind(&filter.transaction_type)
        .bind(&filter.origin_currency)
        .fetch_one(&self.pool)
        .await?;

        let total_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM transactions WHERE user_id = $1::uuid",
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;

        Ok(TransactionPage {
            transactions,
            filtered_count,
            total_count,
        })
    }
}
