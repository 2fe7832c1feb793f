//! Financial mutation payloads and the procedures they feed

pub mod payload;
pub mod procedure;

pub use payload::{
    FieldViolation, PayloadRejection, RawTransactionPayload, TransactionKind,
    ValidatedTransaction, validate_payload, validate_transaction,
};
pub use procedure::{
    PgTransactions, ProcedureError, TransactionBackend, TransactionFilter, TransactionPage,
};
