mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use coaching_core::credits::CreditLedger;
use coaching_core::domain::{ChangeEvent, ChangeKind, ChangeTable};
use coaching_core::flows::{package_wizard, submit_package, FlowError, PackageForm};
use coaching_core::packages::{PackageEntry, PackageError, PackageManager, PackageSelection};
use coaching_core::ports::{ChangeFeed, CreditStore, PackageStore, RemoteFunctions};
use coaching_core::wizard::SubmitError;
use common::Backend;
use futures::StreamExt;
use uuid::Uuid;

struct Fixture {
    backend: Arc<Backend>,
    ledger: CreditLedger,
    packages: PackageManager,
    report_id: Uuid,
}

fn fixture(credits: u32) -> Fixture {
    let backend = Backend::with_balance(credits, 0);
    let user_id = Uuid::new_v4();
    Fixture {
        ledger: CreditLedger::new(backend.clone() as Arc<dyn CreditStore>, user_id),
        packages: PackageManager::new(
            backend.clone() as Arc<dyn PackageStore>,
            backend.clone() as Arc<dyn RemoteFunctions>,
            backend.clone() as Arc<dyn ChangeFeed>,
            user_id,
        ),
        report_id: Uuid::new_v4(),
        backend,
    }
}

fn two_documents(report_id: Uuid) -> PackageForm {
    PackageForm {
        report_id: Some(report_id),
        package_name: "Growth".into(),
        documents: vec!["Plan".into(), "Forecast".into()],
    }
}

#[tokio::test]
async fn insufficient_credits_block_submission_without_any_request() {
    let f = fixture(8);
    let mut wizard = package_wizard(two_documents(f.report_id));
    assert_eq!(wizard.next(), coaching_core::wizard::Transition::Moved(2));

    let err = submit_package(&mut wizard, &f.ledger, &f.packages).await.unwrap_err();

    match err {
        FlowError::Submit(SubmitError::PreCheck(message)) => {
            assert_eq!(message, "Insufficient credits: need 10, have 8");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(f.backend.deduct_calls.load(Ordering::SeqCst), 0);
    assert!(f.backend.package_requests.lock().unwrap().is_empty());
    assert_eq!(f.backend.balance().credits, 8);
    assert!(!wizard.is_submitting());
}

#[tokio::test]
async fn package_is_requested_after_charge() {
    let f = fixture(25);
    let mut wizard = package_wizard(two_documents(f.report_id));
    wizard.jump_to(2);

    submit_package(&mut wizard, &f.ledger, &f.packages).await.unwrap();

    assert!(wizard.is_completed());
    assert_eq!(f.backend.balance().credits, 15);
    let requests = f.backend.package_requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].credits_charged, 10);
    assert_eq!(requests[0].documents, vec!["Plan".to_string(), "Forecast".to_string()]);
}

#[tokio::test]
async fn failed_deduction_means_no_create_request() {
    let f = fixture(25);
    f.ledger.refresh().await.unwrap();
    f.backend.fail_next_deduction.store(true, Ordering::SeqCst);

    let selection = PackageSelection {
        report_id: f.report_id,
        package_name: "Growth".into(),
        documents: vec!["Plan".into()],
    };
    let err = f.packages.create(&f.ledger, &selection).await.unwrap_err();

    assert!(matches!(err, PackageError::Credits(_)));
    assert!(f.backend.package_requests.lock().unwrap().is_empty());
    assert_eq!(f.backend.balance().credits, 25);
}

#[tokio::test]
async fn failed_create_request_is_refunded() {
    let f = fixture(25);
    f.backend.fail_functions.store(true, Ordering::SeqCst);

    let selection = PackageSelection {
        report_id: f.report_id,
        package_name: "Growth".into(),
        documents: vec!["Plan".into(), "Forecast".into()],
    };
    let err = f.packages.create(&f.ledger, &selection).await.unwrap_err();

    assert!(matches!(err, PackageError::Remote(_)));
    assert_eq!(f.backend.balance().credits, 25);
    assert_eq!(f.ledger.balance().unwrap().credits, 25);
    let audit = f.backend.audit.lock().unwrap();
    assert_eq!(audit.iter().map(|a| a.amount).sum::<i64>(), 0);
}

#[tokio::test]
async fn empty_selection_is_invalid() {
    let f = fixture(25);
    let selection = PackageSelection {
        report_id: f.report_id,
        package_name: "Growth".into(),
        documents: vec![],
    };
    let err = f.packages.create(&f.ledger, &selection).await.unwrap_err();
    assert!(matches!(err, PackageError::Invalid(_)));
    assert_eq!(f.backend.deduct_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn list_groups_versions_by_name() {
    let f = fixture(0);
    f.backend.seed_package(f.report_id, "Growth", 60);
    f.backend.seed_package(f.report_id, "Growth", 5);
    f.backend.seed_package(f.report_id, "Exit", 30);
    f.backend.seed_package(Uuid::new_v4(), "Growth", 1);

    let entries = f.packages.list(f.report_id).await.unwrap();

    assert_eq!(entries.len(), 2);
    match &entries[0] {
        PackageEntry::Folder { name, versions } => {
            assert_eq!(name, "Growth");
            assert_eq!(versions.len(), 2);
        }
        other => panic!("expected folder first, got {:?}", other),
    }
    assert!(matches!(entries[1], PackageEntry::Single { .. }));
}

#[tokio::test]
async fn watch_refetches_on_every_event() {
    let f = fixture(25);
    let mut snapshots = f.packages.watch(f.report_id);

    let first = snapshots.next().await.unwrap().unwrap();
    assert!(first.entries.is_empty());
    assert!(first.queued.is_empty());

    let selection = PackageSelection {
        report_id: f.report_id,
        package_name: "Growth".into(),
        documents: vec!["Plan".into()],
    };
    f.packages.create(&f.ledger, &selection).await.unwrap();
    let event = ChangeEvent {
        table: ChangeTable::PackageQueue,
        kind: ChangeKind::Insert,
        report_id: f.report_id,
    };
    f.backend.emit(event);

    let queued = snapshots.next().await.unwrap().unwrap();
    assert_eq!(queued.queued.len(), 1);
    assert_eq!(queued.queued[0].package_name, "Growth");

    // The generator finishes; a duplicate event must be harmless.
    f.backend.seed_package(f.report_id, "Growth", 0);
    let done = ChangeEvent {
        table: ChangeTable::Packages,
        kind: ChangeKind::Insert,
        report_id: f.report_id,
    };
    f.backend.emit(done);
    f.backend.emit(done);

    let completed = snapshots.next().await.unwrap().unwrap();
    assert_eq!(completed.entries.len(), 1);
    assert!(completed.queued.is_empty());
    let again = snapshots.next().await.unwrap().unwrap();
    assert_eq!(again, completed);

    assert_eq!(f.backend.package_list_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn templates_come_from_the_coach_function() {
    let f = fixture(0);
    let templates = f.packages.templates().await.unwrap();
    assert_eq!(templates[0].name, "Growth");
}
