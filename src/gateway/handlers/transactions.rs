//! Transaction route handlers
//!
//! Thin adapters: validate, forward to the procedure, relay the result.
//! POST runs under the idempotency middleware; the others do not.

use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::{IntoParams, ToSchema};

use crate::auth::AuthenticatedUser;
use crate::gateway::error::ApiError;
use crate::gateway::state::AppState;
use crate::transaction::{TransactionFilter, validate_transaction};

/// Query string of `GET /v1/transactions`
///
/// Paging values stay strings so bad input falls back to defaults instead of
/// failing the request.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListTransactionsQuery {
    /// Inclusive lower bound, `YYYY-MM-DD`
    pub date_from: Option<String>,
    /// Inclusive upper bound, `YYYY-MM-DD`
    pub date_to: Option<String>,
    /// income | expense | transfer
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    pub origin_currency: Option<String>,
    /// Page size, default 100, max 500
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl ListTransactionsQuery {
    pub fn to_filter(&self) -> TransactionFilter {
        fn non_empty(v: &Option<String>) -> Option<String> {
            v.as_ref().filter(|s| !s.is_empty()).cloned()
        }
        TransactionFilter {
            date_from: non_empty(&self.date_from),
            date_to: non_empty(&self.date_to),
            transaction_type: non_empty(&self.transaction_type),
            origin_currency: non_empty(&self.origin_currency),
            ..TransactionFilter::default()
        }
        .with_paging(self.limit.as_deref(), self.offset.as_deref())
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListResponse {
    pub transactions: Vec<Value>,
    pub filtered_count: i64,
    pub total_count: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Create a transaction
///
/// Requires an `Idempotency-Key`; duplicates replay the first response.
#[utoipa::path(
    post,
    path = "/v1/transactions",
    params(
        ("Idempotency-Key" = String, Header, description = "Client-chosen key; one execution per key")
    ),
    request_body(content = String, description = "transaction_type, origin_account_id, destination_account_id, category_id, amount, description, transaction_date, userId", content_type = "application/json"),
    responses(
        (status = 201, description = "Created (or replayed)", content_type = "application/json"),
        (status = 400, description = "Invalid payload, missing key or procedure rejection"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "userId does not match the caller"),
        (status = 409, description = "IN_PROGRESS or RETRY_LATER"),
        (status = 500, description = "Ledger failure")
    ),
    security(("bearer_auth" = [])),
    tag = "Transactions"
)]
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let tx = validate_transaction(&body, Some(&user.user_id))?;
    let row = state.transactions.create(&user.user_id, &tx).await?;

    tracing::info!(user_id = %user.user_id, kind = tx.kind.as_str(), "transaction created");
    Ok((StatusCode::CREATED, Json(json!({ "transaction": row }))))
}

/// List the caller's transactions
#[utoipa::path(
    get,
    path = "/v1/transactions",
    params(ListTransactionsQuery),
    responses(
        (status = 200, description = "Page of transactions", body = TransactionListResponse),
        (status = 400, description = "Query rejected by the database"),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    security(("bearer_auth" = [])),
    tag = "Transactions"
)]
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<TransactionListResponse>, ApiError> {
    let filter = query.to_filter();
    let page = state.transactions.list(&user.user_id, &filter).await?;

    Ok(Json(TransactionListResponse {
        transactions: page.transactions,
        filtered_count: page.filtered_count,
        total_count: page.total_count,
        limit: filter.limit,
        offset: filter.offset,
    }))
}

/// Update a transaction
#[utoipa::path(
    put,
    path = "/v1/transactions/{id}",
    params(
        ("id" = String, Path, description = "Transaction id (UUID)")
    ),
    request_body(content = String, description = "Same body as create", content_type = "application/json"),
    responses(
        (status = 200, description = "Updated", content_type = "application/json"),
        (status = 400, description = "Invalid payload or procedure rejection"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "userId does not match the caller")
    ),
    security(("bearer_auth" = [])),
    tag = "Transactions"
)]
pub async fn update_transaction(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let tx = validate_transaction(&body, Some(&user.user_id))?;
    let row = state.transactions.update(&user.user_id, &id, &tx).await?;
    Ok(Json(json!({ "transaction": row })))
}

/// Delete a transaction
///
/// `transaction` is null when no row of the caller matched.
#[utoipa::path(
    delete,
    path = "/v1/transactions/{id}",
    params(
        ("id" = String, Path, description = "Transaction id (UUID)")
    ),
    responses(
        (status = 200, description = "Deleted row or null", content_type = "application/json"),
        (status = 400, description = "Rejected by the database"),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    security(("bearer_auth" = [])),
    tag = "Transactions"
)]
pub async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let row = state.transactions.delete(&user.user_id, &id).await?;
    Ok(Json(json!({ "transaction": row })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_to_filter() {
        let query = ListTransactionsQuery {
            date_from: Some("2024-01-01".into()),
            date_to: Some(String::new()),
            transaction_type: Some("expense".into()),
            origin_currency: None,
            limit: Some("900".into()),
            offset: Some("10".into()),
        };
        let filter = query.to_filter();
        assert_eq!(filter.date_from.as_deref(), Some("2024-01-01"));
        assert_eq!(filter.date_to, None);
        assert_eq!(filter.transaction_type.as_deref(), Some("expense"));
        assert_eq!(filter.limit, 500);
        assert_eq!(filter.offset, 10);
    }

    #[test]
    fn test_list_response_is_camel_case() {
        let body = serde_json::to_value(TransactionListResponse {
            transactions: vec![],
            filtered_count: 0,
            total_count: 3,
            limit: 100,
            offset: 0,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "transactions": [],
                "filteredCount": 0,
                "totalCount": 3,
                "limit": 100,
                "offset": 0
            })
        );
    }
}
