//! Transaction payload validation
//!
//! - `RawTransactionPayload`: HTTP body deserialization plus field rules
//! - `ValidatedTransaction`: typed result; the `TransactionKind` variant holds
//!   exactly the reference its type needs
//!
//! Check order: structure, asserted owner, then the domain rules.

use std::borrow::Cow;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::gateway::error::ApiError;

/// One field-level problem in a malformed payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Raw payload
// ============================================================================

fn validate_uuid(value: &str) -> Result<(), ValidationError> {
    Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| ValidationError::new("uuid").with_message(Cow::Borrowed("must be a UUID")))
}

/// Transaction body as sent by clients (create and update share it)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RawTransactionPayload {
    /// Owner asserted by the caller
    #[serde(rename = "userId", default)]
    #[validate(custom(function = "validate_uuid"))]
    pub user_id: Option<String>,
    pub transaction_type: String,
    #[validate(custom(function = "validate_uuid"))]
    pub origin_account_id: String,
    #[serde(default)]
    #[validate(custom(function = "validate_uuid"))]
    pub destination_account_id: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_uuid"))]
    pub category_id: Option<String>,
    /// JSON number only; quoted amounts are malformed
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(default)]
    #[validate(length(max = 200, message = "must be at most 200 characters"))]
    pub description: Option<String>,
    /// `YYYY-MM-DD`
    pub transaction_date: String,
}

// ============================================================================
// Validated transaction
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionKind {
    Income { category_id: Uuid },
    Expense { category_id: Uuid },
    Transfer { destination_account_id: Uuid },
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income { .. } => "income",
            TransactionKind::Expense { .. } => "expense",
            TransactionKind::Transfer { .. } => "transfer",
        }
    }

    pub fn category_id(&self) -> Option<Uuid> {
        match self {
            TransactionKind::Income { category_id } | TransactionKind::Expense { category_id } => {
                Some(*category_id)
            }
            TransactionKind::Transfer { .. } => None,
        }
    }

    pub fn destination_account_id(&self) -> Option<Uuid> {
        match self {
            TransactionKind::Transfer {
                destination_account_id,
            } => Some(*destination_account_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTransaction {
    /// Asserted owner, already checked against the caller when one was resolved
    pub owner: Option<String>,
    pub kind: TransactionKind,
    pub origin_account_id: Uuid,
    pub amount: Decimal,
    pub description: Option<String>,
    pub transaction_date: String,
}

// ============================================================================
// Rejections
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PayloadRejection {
    #[error("Payload is malformed")]
    Malformed(Vec<FieldViolation>),

    #[error("Asserted owner does not match the caller")]
    OwnerMismatch,

    #[error("Unknown transaction type")]
    InvalidTransactionType,

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Transfers need a destination account")]
    DestinationRequired,

    #[error("Income and expense need a category")]
    CategoryRequired,

    #[error("Date must be YYYY-MM-DD")]
    InvalidDate,

    #[error("Agent requests must name the user")]
    MissingUser,
}

impl PayloadRejection {
    pub fn code(&self) -> &'static str {
        match self {
            PayloadRejection::Malformed(_) => "INVALID_PAYLOAD",
            PayloadRejection::OwnerMismatch => "FORBIDDEN",
            PayloadRejection::InvalidTransactionType => "INVALID_TRANSACTION_TYPE",
            PayloadRejection::InvalidAmount => "INVALID_AMOUNT",
            PayloadRejection::DestinationRequired => "DESTINATION_REQUIRED",
            PayloadRejection::CategoryRequired => "CATEGORY_REQUIRED",
            PayloadRejection::InvalidDate => "INVALID_DATE",
            PayloadRejection::MissingUser => "MISSING_USER",
        }
    }
}

impl From<PayloadRejection> for ApiError {
    fn from(rejection: PayloadRejection) -> Self {
        match rejection {
            PayloadRejection::OwnerMismatch => ApiError::Forbidden,
            PayloadRejection::Malformed(details) => ApiError::InvalidPayload {
                code: "INVALID_PAYLOAD",
                details,
            },
            other => ApiError::invalid(other.code()),
        }
    }
}

fn violations(errors: &ValidationErrors) -> Vec<FieldViolation> {
    let mut out: Vec<FieldViolation> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                FieldViolation::new(field.to_string(), message)
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, PayloadRejection> {
    Uuid::parse_str(value)
        .map_err(|_| PayloadRejection::Malformed(vec![FieldViolation::new(field, "must be a UUID")]))
}

/// `^\d{4}-\d{2}-\d{2}$`; calendar validity is left to the database
pub fn is_iso_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// Validate a raw JSON body.
///
/// `resolved` is the caller's identity; when present, an asserted `userId`
/// must equal it. The agent flow passes `None`.
pub fn validate_transaction(
    body: &[u8],
    resolved: Option<&str>,
) -> Result<ValidatedTransaction, PayloadRejection> {
    let raw: RawTransactionPayload = serde_json::from_slice(body).map_err(|e| {
        PayloadRejection::Malformed(vec![FieldViolation::new("body", e.to_string())])
    })?;
    validate_payload(raw, resolved)
}

/// Same as [`validate_transaction`] for an already-deserialized payload
pub fn validate_payload(
    raw: RawTransactionPayload,
    resolved: Option<&str>,
) -> Result<ValidatedTransaction, PayloadRejection> {
    raw.validate()
        .map_err(|e| PayloadRejection::Malformed(violations(&e)))?;

    if let (Some(asserted), Some(caller)) = (raw.user_id.as_deref(), resolved) {
        if asserted != caller {
            return Err(PayloadRejection::OwnerMismatch);
        }
    }

    let transaction_type = raw.transaction_type.as_str();
    if !matches!(transaction_type, "income" | "expense" | "transfer") {
        return Err(PayloadRejection::InvalidTransactionType);
    }

    if raw.amount <= Decimal::ZERO {
        return Err(PayloadRejection::InvalidAmount);
    }

    let kind = match transaction_type {
        "transfer" => {
            let dest = raw
                .destination_account_id
                .as_deref()
                .ok_or(PayloadRejection::DestinationRequired)?;
            TransactionKind::Transfer {
                destination_account_id: parse_uuid("destination_account_id", dest)?,
            }
        }
        _ => {
            let category = raw
                .category_id
                .as_deref()
                .ok_or(PayloadRejection::CategoryRequired)?;
            let category_id = parse_uuid("category_id", category)?;
            if transaction_type == "income" {
                TransactionKind::Income { category_id }
            } else {
                TransactionKind::Expense { category_id }
            }
        }
    };

    if !is_iso_date(&raw.transaction_date) {
        return Err(PayloadRejection::InvalidDate);
    }

    Ok(ValidatedTransaction {
        owner: raw.user_id,
        kind,
        origin_account_id: parse_uuid("origin_account_id", &raw.origin_account_id)?,
        amount: raw.amount,
        description: raw.description,
        transaction_date: raw.transaction_date,
    })
}
