pub mod agent;
pub mod health;
pub mod transactions;

pub use agent::create_agent_transaction;
pub use health::{HealthResponse, health_check};
pub use transactions::{
    ListTransactionsQuery, TransactionListResponse, create_transaction, delete_transaction,
    list_transactions, update_transaction,
};
