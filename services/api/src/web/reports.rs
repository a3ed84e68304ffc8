//! services/api/src/web/reports.rs
//!
//! Report endpoints: listing, lifecycle and the three paid submission flows
//! (business health score, exercise questionnaire, new company onboarding).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use coaching_core::credits::CreditLedger;
use coaching_core::domain::{CreditKind, Report, ReportStatus, ReportType};
use coaching_core::flows::{
    exercise_wizard, health_score_wizard, new_company_wizard, submit_exercise,
    submit_health_score, submit_new_company, Exercise, ExerciseForm, FlowError,
    HealthScoreForm, NewCompanyForm,
};
use coaching_core::pricing::{
    EXERCISE_ANALYSIS_CREDITS, HEALTH_SCORE_CREDITS, NEW_COMPANY_ANALYSIS_CREDITS,
};
use coaching_core::reports::{CompanyHistory, CreateReportOptions, ReportFilter};
use coaching_core::wizard::{FieldError, SubmitError, Wizard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::web::errors::{
    bad_request, credit_error, flow_error, report_error, ErrorBody, HandlerError, HandlerResult,
};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ScoresResponse {
    pub plan: Option<f64>,
    pub people: Option<f64>,
    pub profits: Option<f64>,
    pub purpose_impact: Option<f64>,
    pub stress_leadership: Option<f64>,
    pub overall: Option<f64>,
}

#[derive(Serialize, ToSchema)]
pub struct ReportResponse {
    pub id: Uuid,
    pub title: String,
    pub company_name: String,
    pub exercise_id: String,
    /// `In Progress` or `Completed`.
    pub status: String,
    /// `New` or `Existing`.
    pub report_type: String,
    pub scores: ScoresResponse,
    pub document_url: Option<String>,
    pub company_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Report> for ReportResponse {
    fn from(r: Report) -> Self {
        Self {
            id: r.id,
            title: r.title,
            company_name: r.company_name,
            exercise_id: r.exercise_id,
            status: r.status.as_str().to_string(),
            report_type: r.report_type.as_str().to_string(),
            scores: ScoresResponse {
                plan: r.scores.plan,
                people: r.scores.people,
                profits: r.scores.profits,
                purpose_impact: r.scores.purpose_impact,
                stress_leadership: r.scores.stress_leadership,
                overall: r.scores.overall,
            },
            document_url: r.document_url,
            company_id: r.company_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CompanyHistoryResponse {
    pub origin: ReportResponse,
    pub follow_ups: Vec<ReportResponse>,
}

impl From<CompanyHistory> for CompanyHistoryResponse {
    fn from(h: CompanyHistory) -> Self {
        Self {
            origin: h.origin.into(),
            follow_ups: h.follow_ups.into_iter().map(ReportResponse::from).collect(),
        }
    }
}

#[derive(Deserialize, IntoParams)]
pub struct ReportQuery {
    /// Case-insensitive match on company name or title.
    pub search: Option<String>,
    pub status: Option<String>,
    pub report_type: Option<String>,
}

impl ReportQuery {
    fn to_filter(&self) -> Result<ReportFilter, HandlerError> {
        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(
                ReportStatus::parse(s).ok_or_else(|| bad_request(format!("Unknown status '{}'", s)))?,
            ),
            None => None,
        };
        let report_type = match self.report_type.as_deref().filter(|s| !s.is_empty()) {
            Some(t) => Some(parse_report_type(t)?),
            None => None,
        };
        Ok(ReportFilter {
            search: self.search.clone().filter(|s| !s.trim().is_empty()),
            status,
            report_type,
        })
    }
}

fn parse_report_type(value: &str) -> Result<ReportType, HandlerError> {
    ReportType::parse(value).ok_or_else(|| bad_request(format!("Unknown report type '{}'", value)))
}

#[derive(Deserialize, ToSchema)]
pub struct CreateReportRequest {
    pub company_name: String,
    /// e.g. `Exercise 3: Know your numbers`; the exercise id is taken from it.
    pub exercise_title: String,
    /// `New` (default) or `Existing`.
    pub report_type: Option<String>,
    pub company_id: Option<Uuid>,
    pub title: Option<String>,
    pub document_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseSubmission {
    pub exercise: Exercise,
    pub form: ExerciseForm,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Loads the balance and refuses early with a 402 carrying `needed`/`available`.
async fn require_credits(ledger: &CreditLedger, kind: CreditKind, amount: u32) -> HandlerResult<()> {
    ledger.ensure_loaded().await.map_err(|e| credit_error(&e))?;
    ledger.require(kind, amount).map_err(|e| credit_error(&e))
}

/// Walks a server-side wizard to its last step, failing on the first invalid one.
fn complete_wizard<F: Clone>(wizard: &mut Wizard<F>) -> HandlerResult<()> {
    wizard
        .fast_forward()
        .map_err(|fields: Vec<FieldError>| flow_error(&FlowError::Submit(SubmitError::Invalid(fields))))
}

/// Validation runs before the balance is fetched: a bad form is a 400 even
/// for a user without credits.
async fn prepare_submission<F: Clone>(
    wizard: &mut Wizard<F>,
    ledger: &CreditLedger,
    kind: CreditKind,
    amount: u32,
) -> HandlerResult<()> {
    complete_wizard(wizard)?;
    require_credits(ledger, kind, amount).await
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List the user's reports, newest first.
#[utoipa::path(
    get,
    path = "/reports",
    params(ReportQuery),
    responses(
        (status = 200, description = "Reports", body = [ReportResponse]),
        (status = 400, description = "Unknown filter value", body = ErrorBody)
    )
)]
pub async fn list_reports_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<ReportQuery>,
) -> HandlerResult<Json<Vec<ReportResponse>>> {
    let filter = query.to_filter()?;
    let reports = state
        .report_manager(user_id)
        .list(&filter)
        .await
        .map_err(|e| report_error(&e))?;
    Ok(Json(reports.into_iter().map(ReportResponse::from).collect()))
}

/// Create a report for an exercise. Charges the exercise analysis price.
#[utoipa::path(
    post,
    path = "/reports",
    request_body = CreateReportRequest,
    responses(
        (status = 201, description = "Report created", body = ReportResponse),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 402, description = "Insufficient credits", body = ErrorBody),
        (status = 502, description = "Remote failure", body = ErrorBody)
    )
)]
pub async fn create_report_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CreateReportRequest>,
) -> HandlerResult<impl IntoResponse> {
    let report_type = match req.report_type.as_deref() {
        Some(t) => parse_report_type(t)?,
        None => ReportType::New,
    };
    if req.company_name.trim().is_empty() {
        return Err(bad_request("company name is required"));
    }

    let ledger = state.ledger(user_id);
    require_credits(&ledger, CreditKind::General, EXERCISE_ANALYSIS_CREDITS).await?;
    let charge = ledger
        .deduct_credits(
            EXERCISE_ANALYSIS_CREDITS,
            &format!("{}: {}", req.exercise_title, req.company_name.trim()),
            "exercise",
        )
        .await
        .map_err(|e| credit_error(&e))?;

    let created = state
        .report_manager(user_id)
        .create(
            &req.company_name,
            &req.exercise_title,
            CreateReportOptions {
                report_type,
                company_id: req.company_id,
                title: req.title,
                document_url: req.document_url,
                exercise_id: None,
            },
        )
        .await;

    match created {
        Ok(report) => Ok((StatusCode::CREATED, Json(ReportResponse::from(report)))),
        Err(e) => {
            if let Err(refund_err) = ledger.refund(&charge, "Refund: report creation failed").await {
                warn!(request_id = %charge.request_id, error = %refund_err, "Refund did not go through");
            }
            Err(report_error(&e))
        }
    }
}

/// Delete a report and its packages.
#[utoipa::path(
    delete,
    path = "/reports/{id}",
    params(("id" = Uuid, Path, description = "Report id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such report", body = ErrorBody)
    )
)]
pub async fn delete_report_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(report_id): Path<Uuid>,
) -> HandlerResult<StatusCode> {
    state
        .report_manager(user_id)
        .delete(report_id)
        .await
        .map_err(|e| report_error(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Put a report back to `In Progress` so the analysis runs again.
#[utoipa::path(
    post,
    path = "/reports/{id}/rerun",
    params(("id" = Uuid, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report reset", body = ReportResponse),
        (status = 404, description = "No such report", body = ErrorBody)
    )
)]
pub async fn rerun_report_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(report_id): Path<Uuid>,
) -> HandlerResult<Json<ReportResponse>> {
    let report = state
        .report_manager(user_id)
        .rerun(report_id)
        .await
        .map_err(|e| report_error(&e))?;
    Ok(Json(report.into()))
}

/// A `New` report together with the `Existing` reports that continue it.
#[utoipa::path(
    get,
    path = "/reports/{id}/history",
    params(("id" = Uuid, Path, description = "Id of the originating New report")),
    responses(
        (status = 200, description = "Company history", body = CompanyHistoryResponse),
        (status = 404, description = "No such report", body = ErrorBody)
    )
)]
pub async fn company_history_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(report_id): Path<Uuid>,
) -> HandlerResult<Json<CompanyHistoryResponse>> {
    let history = state
        .report_manager(user_id)
        .company_history(report_id)
        .await
        .map_err(|e| report_error(&e))?;
    Ok(Json(history.into()))
}

/// Submit the business health score questionnaire. Costs one health score credit.
#[utoipa::path(
    post,
    path = "/reports/health-score",
    request_body(content_type = "application/json", description = "Company name and the five 0-10 ratings."),
    responses(
        (status = 201, description = "Report created and analysis requested", body = ReportResponse),
        (status = 400, description = "Invalid answers", body = ErrorBody),
        (status = 402, description = "Insufficient health score credits", body = ErrorBody),
        (status = 502, description = "Remote failure; nothing was charged", body = ErrorBody)
    )
)]
pub async fn health_score_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(form): Json<HealthScoreForm>,
) -> HandlerResult<impl IntoResponse> {
    let ledger = state.ledger(user_id);
    let mut wizard = health_score_wizard(form);
    prepare_submission(&mut wizard, &ledger, CreditKind::HealthScore, HEALTH_SCORE_CREDITS).await?;

    let report = submit_health_score(
        &mut wizard,
        &ledger,
        &state.report_manager(user_id),
        state.functions.as_ref(),
    )
    .await
    .map_err(|e| flow_error(&e))?;

    info!(%user_id, report_id = %report.id, "Health score submitted");
    Ok((StatusCode::CREATED, Json(ReportResponse::from(report))))
}

/// Submit an exercise questionnaire. Costs the exercise analysis price.
#[utoipa::path(
    post,
    path = "/reports/exercise",
    request_body(content_type = "application/json", description = "The exercise definition and the filled form."),
    responses(
        (status = 201, description = "Report created", body = ReportResponse),
        (status = 400, description = "Invalid answers", body = ErrorBody),
        (status = 402, description = "Insufficient credits", body = ErrorBody),
        (status = 502, description = "Remote failure; nothing was charged", body = ErrorBody)
    )
)]
pub async fn exercise_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(submission): Json<ExerciseSubmission>,
) -> HandlerResult<impl IntoResponse> {
    let ledger = state.ledger(user_id);
    let mut wizard = exercise_wizard(&submission.exercise, submission.form);
    prepare_submission(&mut wizard, &ledger, CreditKind::General, EXERCISE_ANALYSIS_CREDITS).await?;

    let report = submit_exercise(
        &mut wizard,
        &submission.exercise,
        &ledger,
        &state.report_manager(user_id),
    )
    .await
    .map_err(|e| flow_error(&e))?;

    Ok((StatusCode::CREATED, Json(ReportResponse::from(report))))
}

/// Submit the new company onboarding form. Costs the new company analysis price.
#[utoipa::path(
    post,
    path = "/reports/new-company",
    request_body(content_type = "application/json", description = "Company details from the onboarding wizard."),
    responses(
        (status = 201, description = "Report created", body = ReportResponse),
        (status = 400, description = "Invalid details", body = ErrorBody),
        (status = 402, description = "Insufficient credits", body = ErrorBody),
        (status = 502, description = "Remote failure; nothing was charged", body = ErrorBody)
    )
)]
pub async fn new_company_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(form): Json<NewCompanyForm>,
) -> HandlerResult<impl IntoResponse> {
    let ledger = state.ledger(user_id);
    let mut wizard = new_company_wizard(form);
    prepare_submission(&mut wizard, &ledger, CreditKind::General, NEW_COMPANY_ANALYSIS_CREDITS).await?;

    let report = submit_new_company(&mut wizard, &ledger, &state.report_manager(user_id))
        .await
        .map_err(|e| flow_error(&e))?;

    Ok((StatusCode::CREATED, Json(ReportResponse::from(report))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use coaching_core::domain::{CreditBalance, DeductionOutcome, DeductionRequest};
    use coaching_core::ports::{CreditStore, PortError, PortResult};

    /// A wallet with nothing in it. Charging is never expected.
    struct EmptyWallet;

    #[async_trait]
    impl CreditStore for EmptyWallet {
        async fn fetch_balance(&self, _user_id: Uuid) -> PortResult<CreditBalance> {
            Ok(CreditBalance {
                credits: 0,
                health_score_credits: 0,
            })
        }

        async fn deduct(&self, _user_id: Uuid, _request: &DeductionRequest) -> PortResult<DeductionOutcome> {
            Err(PortError::Unexpected("deduct called".into()))
        }

        async fn refund(
            &self,
            _user_id: Uuid,
            _request_id: Uuid,
            _kind: CreditKind,
            _amount: u32,
            _reason: &str,
        ) -> PortResult<CreditBalance> {
            Err(PortError::Unexpected("refund called".into()))
        }
    }

    fn empty_ledger() -> CreditLedger {
        CreditLedger::new(Arc::new(EmptyWallet), Uuid::new_v4())
    }

    fn rated(company_name: &str) -> HealthScoreForm {
        HealthScoreForm {
            company_name: company_name.into(),
            plan: Some(6),
            people: Some(7),
            profits: Some(5),
            purpose_impact: Some(8),
            stress_leadership: Some(4),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn invalid_form_without_credits_is_a_bad_request() {
        let ledger = empty_ledger();
        let mut wizard = health_score_wizard(rated("  "));

        let (status, Json(body)) =
            prepare_submission(&mut wizard, &ledger, CreditKind::HealthScore, HEALTH_SCORE_CREDITS)
                .await
                .unwrap_err();

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.needed.is_none());
    }

    #[tokio::test]
    async fn valid_form_without_credits_is_payment_required() {
        let ledger = empty_ledger();
        let mut wizard = new_company_wizard(NewCompanyForm {
            company_name: "Globex".into(),
            industry: "Energy".into(),
            description: "Utility-scale batteries for rural grids".into(),
            website: None,
            document_url: None,
        });

        let (status, Json(body)) = prepare_submission(
            &mut wizard,
            &ledger,
            CreditKind::General,
            NEW_COMPANY_ANALYSIS_CREDITS,
        )
        .await
        .unwrap_err();

        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body.needed, Some(NEW_COMPANY_ANALYSIS_CREDITS));
        assert_eq!(body.available, Some(0));
    }

    #[test]
    fn query_parses_into_filter() {
        let query = ReportQuery {
            search: Some("  ".into()),
            status: Some("In Progress".into()),
            report_type: Some("Existing".into()),
        };
        let filter = query.to_filter().unwrap();
        assert_eq!(filter.search, None);
        assert_eq!(filter.status, Some(ReportStatus::InProgress));
        assert_eq!(filter.report_type, Some(ReportType::Existing));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let query = ReportQuery {
            search: None,
            status: Some("Archived".into()),
            report_type: None,
        };
        let (status, _) = query.to_filter().unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
