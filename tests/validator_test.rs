mod common;

use common::*;
use ledger_pay::{
    error::ValidationError,
    services::{check_transfer, derive_asset_sub_account, validate_transfer, TransferCriteria},
};
use rust_decimal_macros::dec;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

const LAMPORTS: u64 = 1_000_000_000;

#[tokio::test]
async fn test_native_transfer_above_expected_amount_passes() {
    let ledger = ScriptedLedger::new();
    let recipient = key(2);
    let record = native_transfer(signature(1), key(1), recipient, (0, 10_700_000_000), &[]);
    ledger.script_transactions([Lookup::Found(record)]);

    let criteria = TransferCriteria::new(recipient, dec!(10.5));
    let validated = validate_transfer(&ledger, &signature(1), &criteria).await;

    assert!(validated.is_ok());
}

#[test]
fn test_native_transfer_below_expected_amount_fails() {
    let recipient = key(2);
    let record = native_transfer(signature(1), key(1), recipient, (0, 10 * LAMPORTS), &[]);

    let criteria = TransferCriteria::new(recipient, dec!(10.5));
    match check_transfer(&record, &criteria) {
        Err(ValidationError::AmountNotTransferred { expected, received }) => {
            assert_eq!(expected, dec!(10.5));
            assert_eq!(received, dec!(10));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_exact_amount_passes() {
    let recipient = key(2);
    let record = native_transfer(
        signature(1),
        key(1),
        recipient,
        (LAMPORTS, LAMPORTS + 10_500_000_000),
        &[],
    );

    assert_ok!(check_transfer(&record, &TransferCriteria::new(recipient, dec!(10.5))));
}

#[test]
fn test_recipient_missing_from_accounts() {
    let record = native_transfer(signature(1), key(1), key(2), (0, LAMPORTS), &[]);
    let criteria = TransferCriteria::new(key(3), dec!(1));

    assert!(matches!(
        check_transfer(&record, &criteria),
        Err(ValidationError::RecipientNotFound)
    ));
}

#[test]
fn test_token_transfer_into_sub_account() {
    let asset = key(5);
    let recipient = key(2);
    let sub_account = derive_asset_sub_account(&asset, &recipient);
    let record = token_transfer(
        signature(1),
        asset,
        sub_account,
        Some("1000000"),
        "11500000",
        6,
        &[],
    );

    let criteria = TransferCriteria::new(recipient, dec!(10.5)).with_spl_token(Some(asset));
    assert!(check_transfer(&record, &criteria).is_ok());

    let criteria = TransferCriteria::new(recipient, dec!(10.500001)).with_spl_token(Some(asset));
    assert!(matches!(
        check_transfer(&record, &criteria),
        Err(ValidationError::AmountNotTransferred { .. })
    ));
}

#[test]
fn test_token_sub_account_created_in_same_transaction() {
    let asset = key(5);
    let recipient = key(2);
    let sub_account = derive_asset_sub_account(&asset, &recipient);
    let record = token_transfer(signature(1), asset, sub_account, None, "2500000", 6, &[]);

    let criteria = TransferCriteria::new(recipient, dec!(2.5)).with_spl_token(Some(asset));
    assert_ok!(check_transfer(&record, &criteria));
}

#[test]
fn test_unreadable_token_balance_is_rejected() {
    let asset = key(5);
    let recipient = key(2);
    let sub_account = derive_asset_sub_account(&asset, &recipient);
    let criteria = TransferCriteria::new(recipient, dec!(1)).with_spl_token(Some(asset));

    let garbled = token_transfer(signature(1), asset, sub_account, Some("12x"), "5000000", 6, &[]);
    let err = assert_err!(check_transfer(&garbled, &criteria));
    assert!(matches!(err, ValidationError::UnreadableTokenBalance { account_index: 1 }));
    assert!(!err.is_retryable());

    let out_of_range = token_transfer(signature(1), asset, sub_account, Some("1"), "5", 29, &[]);
    let err = assert_err!(check_transfer(&out_of_range, &criteria));
    assert!(matches!(err, ValidationError::UnreadableTokenBalance { .. }));
}

#[test]
fn test_token_sub_account_missing() {
    let asset = key(5);
    let recipient = key(2);
    // Paid to the owner directly instead of its derived sub-account.
    let record = token_transfer(signature(1), asset, recipient, Some("0"), "5000000", 6, &[]);

    let criteria = TransferCriteria::new(recipient, dec!(1)).with_spl_token(Some(asset));
    let err = assert_err!(check_transfer(&record, &criteria));
    assert!(matches!(err, ValidationError::RecipientNotFound));
}

#[test]
fn test_every_reference_must_be_present() {
    let recipient = key(2);
    let (r1, r2, r3) = (key(11), key(12), key(13));
    let record = native_transfer(signature(1), key(1), recipient, (0, LAMPORTS), &[r1, r2]);

    let criteria = TransferCriteria::new(recipient, dec!(1)).with_references(vec![r1, r3]);
    match check_transfer(&record, &criteria) {
        Err(ValidationError::ReferenceNotFound(missing)) => assert_eq!(missing, r3),
        other => panic!("unexpected result: {:?}", other),
    }

    let criteria = TransferCriteria::new(recipient, dec!(1)).with_references(vec![r2, r1]);
    assert!(check_transfer(&record, &criteria).is_ok());
}

#[test]
fn test_failed_transaction_is_rejected() {
    let recipient = key(2);
    let mut record = native_transfer(signature(1), key(1), recipient, (0, LAMPORTS), &[]);
    record.meta.as_mut().unwrap().err = Some(json!({ "InstructionError": [0, "Custom"] }));

    let result = check_transfer(&record, &TransferCriteria::new(recipient, dec!(1)));
    assert!(matches!(result, Err(ValidationError::LedgerExecution(_))));
    assert!(!result.unwrap_err().is_retryable());
}

#[tokio::test]
async fn test_unknown_and_metadata_less_transactions_are_retryable() {
    let ledger = ScriptedLedger::new();
    ledger.script_transactions([Lookup::Missing, Lookup::NoMeta, Lookup::Unavailable]);
    let criteria = TransferCriteria::new(key(2), dec!(1));

    let missing = validate_transfer(&ledger, &signature(1), &criteria).await.unwrap_err();
    assert!(matches!(missing, ValidationError::NotFound));
    assert!(missing.is_retryable());

    let no_meta = validate_transfer(&ledger, &signature(1), &criteria).await.unwrap_err();
    assert!(matches!(no_meta, ValidationError::MissingMetadata));
    assert!(no_meta.is_retryable());

    let unavailable = validate_transfer(&ledger, &signature(1), &criteria).await.unwrap_err();
    assert!(matches!(unavailable, ValidationError::Rpc(_)));
    assert!(unavailable.is_retryable());
}
