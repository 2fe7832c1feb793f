use moni_gateway::transaction::{PayloadRejection, TransactionKind, validate_transaction};
use serde_json::{Value, json};

const USER: &str = "0b8e6d7c-0000-4000-8000-000000000001";
const ORIGIN: &str = "0b8e6d7c-0000-4000-8000-0000000000a1";
const DEST: &str = "0b8e6d7c-0000-4000-8000-0000000000a2";
const CATEGORY: &str = "0b8e6d7c-0000-4000-8000-0000000000c1";

fn base(kind: &str) -> Value {
    json!({
        "transaction_type": kind,
        "origin_account_id": ORIGIN,
        "destination_account_id": DEST,
        "category_id": CATEGORY,
        "amount": 10.00,
        "transaction_date": "2024-02-29"
    })
}

fn run(body: &Value, caller: Option<&str>) -> Result<TransactionKind, PayloadRejection> {
    validate_transaction(body.to_string().as_bytes(), caller).map(|tx| tx.kind)
}

#[test]
fn qa_description_length_boundary() {
    let mut body = base("expense");
    body["description"] = json!("x".repeat(200));
    assert!(run(&body, Some(USER)).is_ok());

    body["description"] = json!("x".repeat(201));
    match run(&body, Some(USER)) {
        Err(PayloadRejection::Malformed(details)) => {
            assert_eq!(details.len(), 1);
            assert_eq!(details[0].field, "description");
        }
        other => panic!("expected malformed, got {:?}", other),
    }
}

#[test]
fn qa_smallest_positive_amount_accepted() {
    let mut body = base("income");
    body["amount"] = json!(0.01);
    assert!(matches!(
        run(&body, None),
        Ok(TransactionKind::Income { .. })
    ));

    body["amount"] = json!(-0.01);
    assert_eq!(run(&body, None), Err(PayloadRejection::InvalidAmount));
}

#[test]
fn qa_transfer_keeps_only_destination() {
    let kind = run(&base("transfer"), Some(USER)).unwrap();
    assert_eq!(kind.category_id(), None);
    assert_eq!(kind.destination_account_id().map(|d| d.to_string()).as_deref(), Some(DEST));
}

#[test]
fn qa_expense_keeps_only_category() {
    let kind = run(&base("expense"), Some(USER)).unwrap();
    assert_eq!(kind.destination_account_id(), None);
    assert_eq!(kind.category_id().map(|c| c.to_string()).as_deref(), Some(CATEGORY));
}

#[test]
fn qa_owner_check_precedes_domain_rules() {
    let mut body = base("bogus");
    body["userId"] = json!("0b8e6d7c-0000-4000-8000-000000000099");
    assert_eq!(run(&body, Some(USER)), Err(PayloadRejection::OwnerMismatch));

    // Same body from the agent path: nobody to compare against
    assert_eq!(run(&body, None), Err(PayloadRejection::InvalidTransactionType));
}

#[test]
fn qa_date_shape() {
    for date in ["2024-1-05", "05/01/2024", "2024-01-05T00:00:00Z", ""] {
        let mut body = base("expense");
        body["transaction_date"] = json!(date);
        assert_eq!(run(&body, None), Err(PayloadRejection::InvalidDate), "{}", date);
    }
}

#[test]
fn qa_not_json_is_malformed() {
    let result = validate_transaction(b"not json", Some(USER));
    match result {
        Err(PayloadRejection::Malformed(details)) => assert_eq!(details[0].field, "body"),
        other => panic!("expected malformed, got {:?}", other),
    }
}

#[test]
fn qa_amount_must_be_a_number() {
    let mut body = base("expense");
    body["amount"] = json!("12.5");
    assert!(matches!(run(&body, None), Err(PayloadRejection::Malformed(_))));
}
