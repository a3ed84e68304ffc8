mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use coaching_core::credits::{CreditError, CreditLedger};
use coaching_core::domain::{CreditBalance, CreditKind, DeductionRequest};
use coaching_core::ports::CreditStore;
use common::Backend;
use uuid::Uuid;

fn ledger(backend: &Arc<Backend>) -> CreditLedger {
    CreditLedger::new(backend.clone() as Arc<dyn CreditStore>, Uuid::new_v4())
}

#[tokio::test]
async fn check_is_false_until_balance_is_fetched() {
    let backend = Backend::with_balance(50, 3);
    let ledger = ledger(&backend);

    assert!(!ledger.check_credits(1));
    assert_eq!(ledger.balance(), None);

    ledger.refresh().await.unwrap();
    assert!(ledger.check_credits(50));
    assert!(!ledger.check_credits(51));
    assert!(ledger.check_health_score_credits(3));
    assert!(!ledger.check_health_score_credits(4));
}

#[tokio::test]
async fn successful_deduction_lowers_balance_by_exact_amount() {
    let backend = Backend::with_balance(20, 0);
    let ledger = ledger(&backend);
    ledger.refresh().await.unwrap();

    let charge = ledger.deduct_credits(15, "Package creation: Growth", "package").await.unwrap();

    assert_eq!(charge.amount, 15);
    assert_eq!(ledger.balance().unwrap().credits, 5);
    assert_eq!(backend.balance().credits, 5);

    let audit = backend.audit.lock().unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].amount, -15);
    assert_eq!(audit[0].reason, "Package creation: Growth");
    assert_eq!(audit[0].category, "package");
}

#[tokio::test]
async fn insufficient_balance_changes_nothing() {
    let backend = Backend::with_balance(8, 0);
    let ledger = ledger(&backend);
    ledger.refresh().await.unwrap();

    let err = ledger.deduct_credits(10, "too much", "package").await.unwrap_err();

    assert!(err.is_insufficient());
    assert_eq!(err.to_string(), "Insufficient credits: need 10, have 8");
    assert_eq!(ledger.balance().unwrap().credits, 8);
    assert_eq!(backend.balance().credits, 8);
    assert!(backend.audit.lock().unwrap().is_empty());
}

#[tokio::test]
async fn transport_failure_is_distinct_and_leaves_cache_alone() {
    let backend = Backend::with_balance(30, 0);
    let ledger = ledger(&backend);
    ledger.refresh().await.unwrap();
    backend.fail_next_deduction.store(true, Ordering::SeqCst);

    let err = ledger.deduct_credits(10, "exercise", "exercise").await.unwrap_err();

    assert!(matches!(err, CreditError::Remote(_)));
    assert_eq!(ledger.balance().unwrap().credits, 30);
    assert_eq!(backend.balance().credits, 30);
}

#[tokio::test]
async fn retrying_a_request_whose_reply_was_lost_charges_once() {
    let backend = Backend::with_balance(30, 0);
    let ledger = ledger(&backend);
    ledger.refresh().await.unwrap();
    backend.lose_next_deduction_reply.store(true, Ordering::SeqCst);

    let request = DeductionRequest {
        request_id: Uuid::new_v4(),
        kind: CreditKind::General,
        amount: 10,
        reason: "New company analysis: Acme".into(),
        category: "new_company".into(),
    };

    assert!(ledger.deduct(request.clone()).await.is_err());
    let charge = ledger.deduct(request).await.unwrap();

    assert_eq!(charge.balance_after.credits, 20);
    assert_eq!(backend.balance().credits, 20);
    assert_eq!(backend.audit.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn health_score_credits_are_tracked_separately() {
    let backend = Backend::with_balance(5, 1);
    let ledger = ledger(&backend);
    ledger.refresh().await.unwrap();

    ledger.deduct_health_score_credits(1, "Business health score: Acme").await.unwrap();
    assert_eq!(
        ledger.balance(),
        Some(CreditBalance {
            credits: 5,
            health_score_credits: 0
        })
    );

    let err = ledger.deduct_health_score_credits(1, "again").await.unwrap_err();
    assert!(matches!(err, CreditError::InsufficientHealthScore { needed: 1, available: 0 }));
}

#[tokio::test]
async fn refund_restores_the_charge() {
    let backend = Backend::with_balance(10, 0);
    let ledger = ledger(&backend);
    ledger.refresh().await.unwrap();

    let charge = ledger.deduct_credits(10, "Package creation: Exit", "package").await.unwrap();
    assert_eq!(ledger.balance().unwrap().credits, 0);

    let balance = ledger.refund(&charge, "Refund: package creation failed").await.unwrap();
    assert_eq!(balance.credits, 10);
    assert_eq!(ledger.balance().unwrap().credits, 10);
}

#[tokio::test]
async fn stale_cache_is_corrected_by_server_verdict() {
    let backend = Backend::with_balance(20, 0);
    let ledger = ledger(&backend);
    ledger.refresh().await.unwrap();

    // Another session spends credits behind this ledger's back.
    backend.balance.lock().unwrap().credits = 4;
    assert!(ledger.check_credits(10));

    let err = ledger.deduct_credits(10, "exercise", "exercise").await.unwrap_err();
    assert_eq!(err.to_string(), "Insufficient credits: need 10, have 4");
    assert_eq!(ledger.balance().unwrap().credits, 4);
}
