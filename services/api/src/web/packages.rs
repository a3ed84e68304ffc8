//! services/api/src/web/packages.rs
//!
//! Package endpoints. Listing returns the grouped entries and the queued
//! placeholders together; creation goes through the package wizard so the
//! same validation and credit check apply as in the browser.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use coaching_core::domain::{CreditKind, Package, PackageDocument, PackageTemplate, QueuedPackage};
use coaching_core::flows::{package_wizard, submit_package, FlowError, PackageForm};
use coaching_core::packages::{PackageEntry, PackageSnapshot};
use coaching_core::pricing::package_cost;
use coaching_core::wizard::SubmitError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::errors::{
    credit_error, flow_error, package_error, report_error, ErrorBody, HandlerResult,
};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct PackageDocumentResponse {
    pub name: String,
    pub urls: Vec<String>,
}

impl From<PackageDocument> for PackageDocumentResponse {
    fn from(d: PackageDocument) -> Self {
        Self {
            name: d.name,
            urls: d.urls,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PackageResponse {
    pub id: Uuid,
    pub package_name: String,
    pub documents: Vec<PackageDocumentResponse>,
    pub cover_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Package> for PackageResponse {
    fn from(p: Package) -> Self {
        Self {
            id: p.id,
            package_name: p.package_name,
            documents: p.documents.into_iter().map(PackageDocumentResponse::from).collect(),
            cover_image_url: p.cover_image_url,
            created_at: p.created_at,
        }
    }
}

/// A single package, or a folder of same-named versions (newest first).
#[derive(Serialize, ToSchema)]
pub struct PackageEntryResponse {
    /// `single` or `folder`.
    pub kind: String,
    pub name: String,
    /// Taken from the latest version.
    pub cover_image_url: Option<String>,
    pub versions: Vec<PackageResponse>,
}

impl From<PackageEntry> for PackageEntryResponse {
    fn from(entry: PackageEntry) -> Self {
        let name = entry.name().to_string();
        let cover_image_url = entry.cover_image_url().map(str::to_string);
        let (kind, versions) = match entry {
            PackageEntry::Single { package } => ("single", vec![package]),
            PackageEntry::Folder { versions, .. } => ("folder", versions),
        };
        Self {
            kind: kind.to_string(),
            name,
            cover_image_url,
            versions: versions.into_iter().map(PackageResponse::from).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct QueuedPackageResponse {
    pub id: Uuid,
    pub package_name: String,
    pub estimated_completion: DateTime<Utc>,
    /// Seconds until the estimate, never negative.
    pub remaining_seconds: i64,
}

impl QueuedPackageResponse {
    fn new(queued: QueuedPackage, now: DateTime<Utc>) -> Self {
        Self {
            remaining_seconds: queued.remaining(now).num_seconds(),
            id: queued.id,
            package_name: queued.package_name,
            estimated_completion: queued.estimated_completion,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PackageListResponse {
    pub report_id: Uuid,
    pub entries: Vec<PackageEntryResponse>,
    pub queued: Vec<QueuedPackageResponse>,
}

impl PackageListResponse {
    pub fn from_snapshot(snapshot: PackageSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            report_id: snapshot.report_id,
            entries: snapshot.entries.into_iter().map(PackageEntryResponse::from).collect(),
            queued: snapshot
                .queued
                .into_iter()
                .map(|q| QueuedPackageResponse::new(q, now))
                .collect(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreatePackageBody {
    pub package_name: String,
    /// Names of the documents to generate, e.g. from a template.
    pub documents: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct TemplateResponse {
    pub name: String,
    pub description: Option<String>,
    pub documents: Vec<String>,
    /// What creating this template as-is would cost.
    pub cost: u32,
}

impl From<PackageTemplate> for TemplateResponse {
    fn from(t: PackageTemplate) -> Self {
        Self {
            cost: package_cost(t.documents.len()),
            name: t.name,
            description: t.description,
            documents: t.documents,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Packages of a report, grouped, plus the ones still being generated.
#[utoipa::path(
    get,
    path = "/reports/{id}/packages",
    params(("id" = Uuid, Path, description = "Report id")),
    responses(
        (status = 200, description = "Packages", body = PackageListResponse),
        (status = 404, description = "No such report", body = ErrorBody)
    )
)]
pub async fn list_packages_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(report_id): Path<Uuid>,
) -> HandlerResult<Json<PackageListResponse>> {
    state
        .report_manager(user_id)
        .get(report_id)
        .await
        .map_err(|e| report_error(&e))?;

    let snapshot = state
        .package_manager(user_id)
        .snapshot(report_id)
        .await
        .map_err(|e| package_error(&e))?;
    Ok(Json(PackageListResponse::from_snapshot(snapshot, Utc::now())))
}

/// Request a package for a report. Costs five credits per document.
#[utoipa::path(
    post,
    path = "/reports/{id}/packages",
    params(("id" = Uuid, Path, description = "Report id")),
    request_body = CreatePackageBody,
    responses(
        (status = 202, description = "Package queued"),
        (status = 400, description = "Invalid selection", body = ErrorBody),
        (status = 402, description = "Insufficient credits", body = ErrorBody),
        (status = 404, description = "No such report", body = ErrorBody),
        (status = 502, description = "Generator unavailable; the charge was refunded", body = ErrorBody)
    )
)]
pub async fn create_package_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(report_id): Path<Uuid>,
    Json(body): Json<CreatePackageBody>,
) -> HandlerResult<impl IntoResponse> {
    state
        .report_manager(user_id)
        .get(report_id)
        .await
        .map_err(|e| report_error(&e))?;

    let mut wizard = package_wizard(PackageForm {
        report_id: Some(report_id),
        package_name: body.package_name,
        documents: body.documents,
    });
    wizard
        .fast_forward()
        .map_err(|fields| flow_error(&FlowError::Submit(SubmitError::Invalid(fields))))?;

    let ledger = state.ledger(user_id);
    ledger.ensure_loaded().await.map_err(|e| credit_error(&e))?;
    ledger
        .require(CreditKind::General, wizard.form().cost())
        .map_err(|e| credit_error(&e))?;

    submit_package(&mut wizard, &ledger, &state.package_manager(user_id))
        .await
        .map_err(|e| flow_error(&e))?;
    Ok(StatusCode::ACCEPTED)
}

/// Delete one package version.
#[utoipa::path(
    delete,
    path = "/packages/{id}",
    params(("id" = Uuid, Path, description = "Package id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such package", body = ErrorBody)
    )
)]
pub async fn delete_package_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(package_id): Path<Uuid>,
) -> HandlerResult<StatusCode> {
    state
        .package_manager(user_id)
        .delete(package_id)
        .await
        .map_err(|e| package_error(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Package shapes the coach offers.
#[utoipa::path(
    get,
    path = "/package-templates",
    responses(
        (status = 200, description = "Templates", body = [TemplateResponse]),
        (status = 502, description = "Coach service unavailable", body = ErrorBody)
    )
)]
pub async fn templates_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> HandlerResult<Json<Vec<TemplateResponse>>> {
    let templates = state
        .package_manager(user_id)
        .templates()
        .await
        .map_err(|e| package_error(&e))?;
    Ok(Json(templates.into_iter().map(TemplateResponse::from).collect()))
}
