mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use coaching_core::credits::CreditLedger;
use coaching_core::domain::{ReportStatus, ReportType};
use coaching_core::flows::{
    exercise_wizard, health_score_wizard, new_company_wizard, submit_exercise,
    submit_health_score, submit_new_company, Exercise, ExerciseForm, ExerciseQuestion, FlowError,
    HealthScoreForm, NewCompanyForm, HEALTH_SCORE_EXERCISE_ID,
};
use coaching_core::ports::{CreditStore, Notifier, ReportStore};
use coaching_core::reports::ReportManager;
use coaching_core::wizard::SubmitError;
use common::Backend;
use uuid::Uuid;

fn setup(credits: u32, health: u32) -> (Arc<Backend>, CreditLedger, ReportManager) {
    let backend = Backend::with_balance(credits, health);
    let user_id = Uuid::new_v4();
    let ledger = CreditLedger::new(backend.clone() as Arc<dyn CreditStore>, user_id);
    let reports = ReportManager::new(
        backend.clone() as Arc<dyn ReportStore>,
        backend.clone() as Arc<dyn Notifier>,
        user_id,
    );
    (backend, ledger, reports)
}

fn filled_health_form() -> HealthScoreForm {
    HealthScoreForm {
        company_name: "Acme".into(),
        plan: Some(6),
        people: Some(7),
        profits: Some(4),
        purpose_impact: Some(8),
        stress_leadership: Some(3),
        ..Default::default()
    }
}

#[tokio::test]
async fn health_score_submission_charges_one_credit_and_calls_function() {
    let (backend, ledger, reports) = setup(0, 1);
    let mut wizard = health_score_wizard(filled_health_form());

    let report = submit_health_score(&mut wizard, &ledger, &reports, backend.as_ref())
        .await
        .unwrap();

    assert!(wizard.is_completed());
    assert_eq!(backend.balance().health_score_credits, 0);
    assert_eq!(report.exercise_id, HEALTH_SCORE_EXERCISE_ID);
    assert_eq!(report.status, ReportStatus::InProgress);

    let submissions = backend.health_submissions.lock().unwrap();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].company_name, "Acme");
    assert_eq!(submissions[0].exercise_id, "business-health-score");
    assert_eq!(submissions[0].report_id, report.id);
    assert_eq!(submissions[0].answers.len(), 5);
}

#[tokio::test]
async fn health_score_without_credits_is_blocked_up_front() {
    let (backend, ledger, reports) = setup(50, 0);
    let mut wizard = health_score_wizard(filled_health_form());

    let err = submit_health_score(&mut wizard, &ledger, &reports, backend.as_ref())
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::Submit(SubmitError::PreCheck(_))));
    assert!(backend.reports.lock().unwrap().is_empty());
    assert!(backend.health_submissions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_submission_refunds_and_removes_the_report() {
    let (backend, ledger, reports) = setup(0, 1);
    backend.fail_functions.store(true, Ordering::SeqCst);
    let mut wizard = health_score_wizard(filled_health_form());

    let err = submit_health_score(&mut wizard, &ledger, &reports, backend.as_ref())
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::Remote(_)));
    assert_eq!(backend.balance().health_score_credits, 1);
    assert!(backend.reports.lock().unwrap().is_empty());
    assert!(!wizard.is_completed());
    assert!(!wizard.is_submitting());
}

#[tokio::test]
async fn exercise_submission_creates_linked_report() {
    let (backend, ledger, reports) = setup(10, 0);
    let user_id = ledger.user_id();
    let origin = backend.seed_report(user_id, "Acme", ReportType::New, 90);
    let exercise = Exercise {
        title: "Exercise 4: Cash".into(),
        questions: vec![ExerciseQuestion {
            id: "runway".into(),
            prompt: "How many months of runway?".into(),
            required: true,
        }],
        questions_per_step: 3,
    };
    let mut form = ExerciseForm {
        company_name: "Acme".into(),
        ..Default::default()
    };
    form.answers.insert("runway".into(), "9".into());
    let mut wizard = exercise_wizard(&exercise, form);

    let report = submit_exercise(&mut wizard, &exercise, &ledger, &reports).await.unwrap();

    assert_eq!(report.exercise_id, "4");
    assert_eq!(report.report_type, ReportType::Existing);
    assert_eq!(report.company_id, Some(origin.id));
    assert_eq!(backend.balance().credits, 0);
}

#[tokio::test]
async fn exercise_for_unknown_company_is_stored_as_new() {
    let (backend, ledger, reports) = setup(10, 0);
    let exercise = Exercise {
        title: "Exercise 2: Hiring".into(),
        questions: vec![ExerciseQuestion {
            id: "roles".into(),
            prompt: "Which roles are open?".into(),
            required: true,
        }],
        questions_per_step: 3,
    };
    let mut form = ExerciseForm {
        company_name: "Globex".into(),
        ..Default::default()
    };
    form.answers.insert("roles".into(), "Sales lead".into());
    let mut wizard = exercise_wizard(&exercise, form);

    let report = submit_exercise(&mut wizard, &exercise, &ledger, &reports).await.unwrap();

    assert_eq!(report.report_type, ReportType::New);
    assert_eq!(report.company_id, None);
    let stored = backend.reports.lock().unwrap();
    assert!(!stored
        .iter()
        .any(|r| r.report_type == ReportType::Existing && r.company_id.is_none()));
}

#[tokio::test]
async fn new_company_submission_costs_ten_credits() {
    let (backend, ledger, reports) = setup(12, 0);
    let mut wizard = new_company_wizard(NewCompanyForm {
        company_name: "Globex".into(),
        industry: "Energy".into(),
        description: "Utility-scale batteries for rural grids".into(),
        website: None,
        document_url: Some("https://files/deck.pdf".into()),
    });
    wizard.fast_forward().unwrap();

    let report = submit_new_company(&mut wizard, &ledger, &reports).await.unwrap();

    assert_eq!(report.report_type, ReportType::New);
    assert_eq!(report.document_url.as_deref(), Some("https://files/deck.pdf"));
    assert_eq!(backend.balance().credits, 2);
    assert_eq!(backend.notifications.lock().unwrap().len(), 1);
}
