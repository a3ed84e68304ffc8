mod common;

use std::sync::Arc;

use coaching_core::domain::{Notification, ReportStatus, ReportType};
use coaching_core::ports::{Notifier, ReportStore};
use coaching_core::reports::{CreateReportOptions, ReportError, ReportFilter, ReportManager};
use common::Backend;
use uuid::Uuid;

fn manager(backend: &Arc<Backend>, user_id: Uuid) -> ReportManager {
    ReportManager::new(
        backend.clone() as Arc<dyn ReportStore>,
        backend.clone() as Arc<dyn Notifier>,
        user_id,
    )
}

#[tokio::test]
async fn new_report_starts_in_progress_with_exercise_id() {
    let backend = Backend::with_balance(0, 0);
    let user_id = Uuid::new_v4();
    let reports = manager(&backend, user_id);

    let report = reports
        .create("Acme", "Exercise 7: Pricing power", CreateReportOptions::default())
        .await
        .unwrap();

    assert_eq!(report.status, ReportStatus::InProgress);
    assert_eq!(report.report_type, ReportType::New);
    assert_eq!(report.exercise_id, "7");
    assert_eq!(report.company_id, None);
    assert_eq!(report.title, "Acme - Exercise 7: Pricing power");
}

#[tokio::test]
async fn title_without_exercise_number_maps_to_unknown() {
    let backend = Backend::with_balance(0, 0);
    let reports = manager(&backend, Uuid::new_v4());

    let report = reports
        .create("Acme", "Free-form reflection", CreateReportOptions::default())
        .await
        .unwrap();

    assert_eq!(report.exercise_id, "unknown");
}

#[tokio::test]
async fn existing_report_links_to_earliest_new_report() {
    let backend = Backend::with_balance(0, 0);
    let user_id = Uuid::new_v4();
    let earliest = backend.seed_report(user_id, "Acme", ReportType::New, 120);
    backend.seed_report(user_id, "Acme", ReportType::New, 30);
    backend.seed_report(user_id, "Globex", ReportType::New, 500);
    let reports = manager(&backend, user_id);

    let report = reports
        .create(
            "Acme",
            "Exercise 2: People",
            CreateReportOptions {
                report_type: ReportType::Existing,
                company_id: Some(Uuid::new_v4()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(report.report_type, ReportType::Existing);
    assert_eq!(report.company_id, Some(earliest.id));
}

#[tokio::test]
async fn existing_report_falls_back_to_caller_company_id() {
    let backend = Backend::with_balance(0, 0);
    let reports = manager(&backend, Uuid::new_v4());
    let supplied = Uuid::new_v4();

    let report = reports
        .create(
            "Initech",
            "Exercise 2: People",
            CreateReportOptions {
                report_type: ReportType::Existing,
                company_id: Some(supplied),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(report.company_id, Some(supplied));
}

#[tokio::test]
async fn existing_report_without_any_origin_is_stored_as_new() {
    let backend = Backend::with_balance(0, 0);
    let reports = manager(&backend, Uuid::new_v4());

    let report = reports
        .create(
            "Initech",
            "Exercise 2: People",
            CreateReportOptions {
                report_type: ReportType::Existing,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(report.report_type, ReportType::New);
    assert_eq!(report.company_id, None);
}

#[tokio::test]
async fn creation_notifies_the_webhook() {
    let backend = Backend::with_balance(0, 0);
    let user_id = Uuid::new_v4();
    let reports = manager(&backend, user_id);

    let report = reports
        .create("Acme", "Exercise 1: Plan", CreateReportOptions::default())
        .await
        .unwrap();

    let notifications = backend.notifications.lock().unwrap();
    assert_eq!(
        notifications.as_slice(),
        &[Notification::ReportCreated {
            report_id: report.id,
            user_id,
            company_name: "Acme".into(),
            exercise_id: "1".into(),
            exercise_title: "Exercise 1: Plan".into(),
        }]
    );
}

#[tokio::test]
async fn blank_company_name_is_rejected() {
    let backend = Backend::with_balance(0, 0);
    let reports = manager(&backend, Uuid::new_v4());

    let err = reports
        .create("   ", "Exercise 1: Plan", CreateReportOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::Invalid(_)));
    assert!(backend.reports.lock().unwrap().is_empty());
    assert!(backend.notifications.lock().unwrap().is_empty());
}

#[tokio::test]
async fn list_applies_all_filters() {
    let backend = Backend::with_balance(0, 0);
    let user_id = Uuid::new_v4();
    backend.seed_report(user_id, "Acme", ReportType::New, 10);
    backend.seed_report(user_id, "Acme Labs", ReportType::Existing, 5);
    backend.seed_report(user_id, "Globex", ReportType::New, 1);
    backend.seed_report(Uuid::new_v4(), "Acme", ReportType::New, 1);
    let reports = manager(&backend, user_id);

    let all = reports.list(&ReportFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);

    let acme_new = reports
        .list(&ReportFilter {
            search: Some("acme".into()),
            report_type: Some(ReportType::New),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(acme_new.len(), 1);
    assert_eq!(acme_new[0].company_name, "Acme");

    let in_progress = reports
        .list(&ReportFilter {
            status: Some(ReportStatus::InProgress),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(in_progress.is_empty());
}

#[tokio::test]
async fn rerun_resets_status() {
    let backend = Backend::with_balance(0, 0);
    let user_id = Uuid::new_v4();
    let seeded = backend.seed_report(user_id, "Acme", ReportType::New, 10);
    let reports = manager(&backend, user_id);

    let report = reports.rerun(seeded.id).await.unwrap();

    assert_eq!(report.status, ReportStatus::InProgress);
    assert_eq!(reports.get(seeded.id).await.unwrap().status, ReportStatus::InProgress);
}

#[tokio::test]
async fn delete_of_unknown_report_is_not_found() {
    let backend = Backend::with_balance(0, 0);
    let reports = manager(&backend, Uuid::new_v4());
    let id = Uuid::new_v4();

    let err = reports.delete(id).await.unwrap_err();
    assert!(matches!(err, ReportError::NotFound(missing) if missing == id));
}

#[tokio::test]
async fn company_history_collects_linked_reports() {
    let backend = Backend::with_balance(0, 0);
    let user_id = Uuid::new_v4();
    let origin = backend.seed_report(user_id, "Acme", ReportType::New, 60);
    let reports = manager(&backend, user_id);

    for title in ["Exercise 1: Plan", "Exercise 2: People"] {
        reports
            .create(
                "Acme",
                title,
                CreateReportOptions {
                    report_type: ReportType::Existing,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let history = reports.company_history(origin.id).await.unwrap();
    assert_eq!(history.origin.id, origin.id);
    assert_eq!(history.follow_ups.len(), 2);
    assert!(history.follow_ups.iter().all(|r| r.company_id == Some(origin.id)));
}
