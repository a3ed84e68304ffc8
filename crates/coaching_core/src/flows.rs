//! crates/coaching_core/src/flows.rs
//!
//! The concrete wizards (new-company onboarding, exercise questionnaires, the
//! business health score and package creation) and the paid submissions that
//! finish them. Every submission charges first and refunds if the artifact
//! could not be requested.

use std::collections::BTreeMap;
use std::future::Future;

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::credits::{Charge, CreditError, CreditLedger};
use crate::domain::{CreditKind, Report, ReportType};
use crate::packages::{PackageError, PackageManager, PackageSelection};
use crate::ports::{HealthSubmission, PortError, QuestionAnswer, RemoteFunctions};
use crate::pricing::{
    package_cost, EXERCISE_ANALYSIS_CREDITS, HEALTH_SCORE_CREDITS, NEW_COMPANY_ANALYSIS_CREDITS,
};
use crate::reports::{CreateReportOptions, ReportError, ReportManager};
use crate::wizard::{FieldError, Step, SubmitError, Wizard};

pub const HEALTH_SCORE_EXERCISE_ID: &str = "business-health-score";
pub const HEALTH_SCORE_TITLE: &str = "Business Health Score";
pub const NEW_COMPANY_EXERCISE_ID: &str = "new-company";
pub const NEW_COMPANY_TITLE: &str = "New Company Analysis";

/// Highest value on every health score rating scale.
pub const MAX_RATING: u8 = 10;

#[derive(Debug, Clone, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Credits(#[from] CreditError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error("Remote function failed: {0}")]
    Remote(#[from] PortError),
}

pub type FlowResult<T> = Result<T, FlowError>;

fn required(field: &str, value: &str, errors: &mut Vec<FieldError>) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "This field is required"));
    }
}

//=========================================================================================
// Business Health Score (1 step)
//=========================================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthScoreForm {
    pub company_name: String,
    pub report_type: Option<ReportType>,
    pub plan: Option<u8>,
    pub people: Option<u8>,
    pub profits: Option<u8>,
    pub purpose_impact: Option<u8>,
    pub stress_leadership: Option<u8>,
    pub notes: Option<String>,
}

impl HealthScoreForm {
    fn ratings(&self) -> [(&'static str, &'static str, Option<u8>); 5] {
        [
            ("plan", "How clear and current is your business plan?", self.plan),
            ("people", "How well is your team performing?", self.people),
            ("profits", "How healthy are your profits?", self.profits),
            (
                "purposeImpact",
                "How strongly does the business live its purpose?",
                self.purpose_impact,
            ),
            (
                "stressLeadership",
                "How well are you handling stress as a leader?",
                self.stress_leadership,
            ),
        ]
    }

    pub fn answers(&self) -> Vec<QuestionAnswer> {
        let mut answers: Vec<QuestionAnswer> = self
            .ratings()
            .iter()
            .filter_map(|(_, question, value)| {
                value.map(|v| QuestionAnswer {
                    question: question.to_string(),
                    answer: v.to_string(),
                })
            })
            .collect();
        if let Some(notes) = self.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            answers.push(QuestionAnswer {
                question: "Anything else we should know?".to_string(),
                answer: notes.to_string(),
            });
        }
        answers
    }
}

pub fn health_score_wizard(form: HealthScoreForm) -> Wizard<HealthScoreForm> {
    let step = Step::new(
        "Business Health Score",
        &[
            "companyName",
            "plan",
            "people",
            "profits",
            "purposeImpact",
            "stressLeadership",
        ],
        |f: &HealthScoreForm| {
            let mut errors = Vec::new();
            required("companyName", &f.company_name, &mut errors);
            for (field, _, value) in f.ratings() {
                match value {
                    None => errors.push(FieldError::new(field, "Please pick a rating")),
                    Some(v) if v > MAX_RATING => errors.push(FieldError::new(
                        field,
                        format!("Rating must be between 0 and {}", MAX_RATING),
                    )),
                    Some(_) => {}
                }
            }
            errors
        },
    );
    Wizard::new(vec![step], form)
}

//=========================================================================================
// New company onboarding (3 steps)
//=========================================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewCompanyForm {
    pub company_name: String,
    pub industry: String,
    pub description: String,
    pub website: Option<String>,
    pub document_url: Option<String>,
}

/// Shortest accepted business description, in characters.
pub const MIN_DESCRIPTION_CHARS: usize = 20;

pub fn new_company_wizard(form: NewCompanyForm) -> Wizard<NewCompanyForm> {
    let steps = vec![
        Step::new("Company", &["companyName", "industry"], |f: &NewCompanyForm| {
            let mut errors = Vec::new();
            required("companyName", &f.company_name, &mut errors);
            required("industry", &f.industry, &mut errors);
            errors
        }),
        Step::new("About the business", &["description"], |f: &NewCompanyForm| {
            if f.description.trim().chars().count() < MIN_DESCRIPTION_CHARS {
                vec![FieldError::new(
                    "description",
                    format!("Please describe the business in at least {} characters", MIN_DESCRIPTION_CHARS),
                )]
            } else {
                vec![]
            }
        }),
        Step::new("Documents", &["website"], |f: &NewCompanyForm| {
            match f.website.as_deref().map(str::trim) {
                Some(url) if !url.is_empty() && !(url.starts_with("https://") || url.starts_with("http://")) => {
                    vec![FieldError::new("website", "Website must start with http:// or https://")]
                }
                _ => vec![],
            }
        }),
    ];
    Wizard::new(steps, form)
}

//=========================================================================================
// Exercise questionnaires (company step + one step per question group)
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExerciseQuestion {
    pub id: String,
    pub prompt: String,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// An exercise definition, e.g. `"Exercise 3: Know your numbers"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub title: String,
    pub questions: Vec<ExerciseQuestion>,
    #[serde(default = "default_questions_per_step")]
    pub questions_per_step: usize,
}

fn default_questions_per_step() -> usize {
    3
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExerciseForm {
    pub company_name: String,
    pub report_type: Option<ReportType>,
    pub company_id: Option<Uuid>,
    pub answers: BTreeMap<String, String>,
}

impl ExerciseForm {
    pub fn answers_for(&self, exercise: &Exercise) -> Vec<QuestionAnswer> {
        exercise
            .questions
            .iter()
            .filter_map(|q| {
                self.answers.get(&q.id).map(|a| QuestionAnswer {
                    question: q.prompt.clone(),
                    answer: a.clone(),
                })
            })
            .collect()
    }
}

/// Starts on the first question group when the company was preselected.
pub fn exercise_wizard(exercise: &Exercise, form: ExerciseForm) -> Wizard<ExerciseForm> {
    let mut steps = vec![Step::new("Company", &["companyName"], |f: &ExerciseForm| {
        let mut errors = Vec::new();
        required("companyName", &f.company_name, &mut errors);
        errors
    })];

    let per_step = exercise.questions_per_step.max(1);
    for (n, group) in exercise.questions.chunks(per_step).enumerate() {
        let ids: Vec<&str> = group.iter().map(|q| q.id.as_str()).collect();
        let required_ids: Vec<String> = group
            .iter()
            .filter(|q| q.required)
            .map(|q| q.id.clone())
            .collect();
        steps.push(Step::new(
            format!("Questions {}", n + 1),
            &ids,
            move |f: &ExerciseForm| {
                required_ids
                    .iter()
                    .filter(|id| f.answers.get(*id).map_or(true, |a| a.trim().is_empty()))
                    .map(|id| FieldError::new(id.clone(), "Please answer this question"))
                    .collect()
            },
        ));
    }

    let start = if form.company_name.trim().is_empty() { 0 } else { 1 };
    Wizard::starting_at(steps, form, start)
}

//=========================================================================================
// Package creation (3 steps)
//=========================================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageForm {
    pub report_id: Option<Uuid>,
    pub package_name: String,
    pub documents: Vec<String>,
}

impl PackageForm {
    pub fn cost(&self) -> u32 {
        package_cost(self.documents.len())
    }
}

/// Starts on the document step when a report was preselected.
pub fn package_wizard(form: PackageForm) -> Wizard<PackageForm> {
    let steps = vec![
        Step::new("Report", &["reportId"], |f: &PackageForm| {
            if f.report_id.is_none() {
                vec![FieldError::new("reportId", "Please choose a report")]
            } else {
                vec![]
            }
        }),
        Step::new("Documents", &["packageName", "documents"], |f: &PackageForm| {
            let mut errors = Vec::new();
            required("packageName", &f.package_name, &mut errors);
            if f.documents.is_empty() {
                errors.push(FieldError::new("documents", "Select at least one document"));
            }
            errors
        }),
        Step::review("Review"),
    ];
    let start = if form.report_id.is_some() { 1 } else { 0 };
    Wizard::starting_at(steps, form, start)
}

//=========================================================================================
// Paid submissions
//=========================================================================================

/// Runs `work` after `charge` was taken; gives the charge back if `work` fails.
async fn keep_charge_if<T, Fut>(ledger: &CreditLedger, charge: &Charge, label: &str, work: Fut) -> FlowResult<T>
where
    Fut: Future<Output = FlowResult<T>>,
{
    match work.await {
        Ok(value) => Ok(value),
        Err(e) => {
            if let Err(refund_err) = ledger.refund(charge, &format!("Refund: {} failed", label)).await {
                warn!(request_id = %charge.request_id, error = %refund_err, "Refund did not go through");
            }
            Err(e)
        }
    }
}

fn precheck(ledger: &CreditLedger, kind: CreditKind, amount: u32) -> Result<(), String> {
    ledger.require(kind, amount).map_err(|e| e.to_string())
}

/// Finishes the health score wizard: one health-score credit, a report, and
/// the remote analysis submission.
pub async fn submit_health_score(
    wizard: &mut Wizard<HealthScoreForm>,
    ledger: &CreditLedger,
    reports: &ReportManager,
    functions: &dyn RemoteFunctions,
) -> FlowResult<Report> {
    ledger.ensure_loaded().await?;
    let form = wizard
        .begin_submit(|_| precheck(ledger, CreditKind::HealthScore, HEALTH_SCORE_CREDITS))?
        .clone();

    let result = async {
        let charge = ledger
            .deduct_health_score_credits(
                HEALTH_SCORE_CREDITS,
                &format!("Business health score: {}", form.company_name.trim()),
            )
            .await?;

        keep_charge_if(ledger, &charge, "business health score", async {
            let report = reports
                .create(
                    &form.company_name,
                    HEALTH_SCORE_TITLE,
                    CreateReportOptions {
                        report_type: form.report_type.unwrap_or(ReportType::New),
                        exercise_id: Some(HEALTH_SCORE_EXERCISE_ID.to_string()),
                        ..Default::default()
                    },
                )
                .await?;

            let submission = HealthSubmission {
                company_name: report.company_name.clone(),
                exercise_id: HEALTH_SCORE_EXERCISE_ID.to_string(),
                report_id: report.id,
                user_id: ledger.user_id(),
                answers: form.answers(),
            };
            if let Err(e) = functions.submit_business_health(&submission).await {
                if let Err(cleanup) = reports.delete(report.id).await {
                    warn!(report_id = %report.id, error = %cleanup, "Could not remove report after failed submission");
                }
                return Err(FlowError::Remote(e));
            }
            info!(report_id = %report.id, "Business health score submitted");
            Ok::<_, FlowError>(report)
        })
        .await
    }
    .await;

    wizard.finish_submit(result.is_ok());
    result
}

/// Finishes an exercise questionnaire: charges the analysis and creates the report.
pub async fn submit_exercise(
    wizard: &mut Wizard<ExerciseForm>,
    exercise: &Exercise,
    ledger: &CreditLedger,
    reports: &ReportManager,
) -> FlowResult<Report> {
    ledger.ensure_loaded().await?;
    let form = wizard
        .begin_submit(|_| precheck(ledger, CreditKind::General, EXERCISE_ANALYSIS_CREDITS))?
        .clone();

    let result = async {
        let charge = ledger
            .deduct_credits(
                EXERCISE_ANALYSIS_CREDITS,
                &format!("{}: {}", exercise.title, form.company_name.trim()),
                "exercise",
            )
            .await?;

        keep_charge_if(ledger, &charge, "exercise analysis", async {
            let report = reports
                .create(
                    &form.company_name,
                    &exercise.title,
                    CreateReportOptions {
                        report_type: form.report_type.unwrap_or(ReportType::Existing),
                        company_id: form.company_id,
                        ..Default::default()
                    },
                )
                .await?;
            Ok::<_, FlowError>(report)
        })
        .await
    }
    .await;

    wizard.finish_submit(result.is_ok());
    result
}

/// Finishes onboarding: charges the new-company analysis and creates the `New` report.
pub async fn submit_new_company(
    wizard: &mut Wizard<NewCompanyForm>,
    ledger: &CreditLedger,
    reports: &ReportManager,
) -> FlowResult<Report> {
    ledger.ensure_loaded().await?;
    let form = wizard
        .begin_submit(|_| precheck(ledger, CreditKind::General, NEW_COMPANY_ANALYSIS_CREDITS))?
        .clone();

    let result = async {
        let charge = ledger
            .deduct_credits(
                NEW_COMPANY_ANALYSIS_CREDITS,
                &format!("New company analysis: {}", form.company_name.trim()),
                "new_company",
            )
            .await?;

        keep_charge_if(ledger, &charge, "new company analysis", async {
            let report = reports
                .create(
                    &form.company_name,
                    NEW_COMPANY_TITLE,
                    CreateReportOptions {
                        report_type: ReportType::New,
                        exercise_id: Some(NEW_COMPANY_EXERCISE_ID.to_string()),
                        document_url: form.document_url.clone(),
                        ..Default::default()
                    },
                )
                .await?;
            Ok::<_, FlowError>(report)
        })
        .await
    }
    .await;

    wizard.finish_submit(result.is_ok());
    result
}

/// Finishes the package wizard. The credit check runs before anything is sent.
pub async fn submit_package(
    wizard: &mut Wizard<PackageForm>,
    ledger: &CreditLedger,
    packages: &PackageManager,
) -> FlowResult<()> {
    ledger.ensure_loaded().await?;
    let form = wizard
        .begin_submit(|f| precheck(ledger, CreditKind::General, f.cost()))?
        .clone();

    let result = match form.report_id {
        Some(report_id) => packages
            .create(
                ledger,
                &PackageSelection {
                    report_id,
                    package_name: form.package_name.clone(),
                    documents: form.documents.clone(),
                },
            )
            .await
            .map_err(FlowError::from),
        None => Err(FlowError::Package(PackageError::Invalid(
            "a report is required".to_string(),
        ))),
    };

    wizard.finish_submit(result.is_ok());
    result
}
