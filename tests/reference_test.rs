mod common;

use common::*;
use ledger_pay::{error::FindReferenceError, models::Finality, services::find_reference};
use std::sync::atomic::Ordering;

#[tokio::test]
async fn test_failed_later_page_keeps_oldest_seen() {
    let ledger = ScriptedLedger::new();
    let reference = key(30);
    let signatures = ledger.attach_many(reference, 1000);
    ledger.fail_later_pages();

    let found = find_reference(&ledger, &reference, Finality::Confirmed)
        .await
        .unwrap();

    assert_eq!(Some(&found.signature), signatures.last());
    assert_eq!(ledger.search_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_first_page_is_an_error() {
    let ledger = ScriptedLedger::new();
    let reference = key(30);
    ledger.attach(reference, signature(9));
    ledger.fail_searches(1);

    let result = find_reference(&ledger, &reference, Finality::Confirmed).await;
    assert!(matches!(result, Err(FindReferenceError::Rpc(_))));

    let found = find_reference(&ledger, &reference, Finality::Confirmed)
        .await
        .unwrap();
    assert_eq!(found.signature, signature(9));
}
