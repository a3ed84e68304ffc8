//! services/api/src/web/rest.rs
//!
//! Contains the master definition for the OpenAPI document and the
//! account-level REST handlers: credit balances and the document library.

use crate::web::errors::{
    bad_request, credit_error, document_error, error_response, ErrorBody, FieldErrorBody,
    HandlerResult,
};
use crate::web::state::AppState;
use crate::web::{auth, chat, packages, reader, reports};
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use coaching_core::documents::UploadFile;
use coaching_core::domain::{CreditBalance, Document};
use coaching_core::pricing::{
    EXERCISE_ANALYSIS_CREDITS, HEALTH_SCORE_CREDITS, NEW_COMPANY_ANALYSIS_CREDITS,
    PACKAGE_CREDITS_PER_DOCUMENT, PRICING_VERSION,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        credits_handler,
        list_documents_handler,
        upload_document_handler,
        delete_document_handler,
        reports::list_reports_handler,
        reports::create_report_handler,
        reports::delete_report_handler,
        reports::rerun_report_handler,
        reports::company_history_handler,
        reports::health_score_handler,
        reports::exercise_handler,
        reports::new_company_handler,
        packages::list_packages_handler,
        packages::create_package_handler,
        packages::delete_package_handler,
        packages::templates_handler,
        reader::reader_handler,
        reader::navigate_handler,
        chat::chat_handler,
    ),
    components(
        schemas(
            ErrorBody, FieldErrorBody, CreditsResponse, PriceList, DocumentResponse,
            auth::SignupRequest, auth::LoginRequest, auth::AuthResponse, auth::MeResponse,
            reports::ReportResponse, reports::ScoresResponse, reports::CreateReportRequest,
            reports::CompanyHistoryResponse,
            packages::PackageListResponse, packages::PackageEntryResponse,
            packages::PackageResponse, packages::PackageDocumentResponse,
            packages::QueuedPackageResponse, packages::CreatePackageBody,
            packages::TemplateResponse,
            reader::ReaderResponse, reader::NoticeResponse, reader::NavigateRequest,
            chat::ChatRequest, chat::ChatResponse, chat::ChatTurnBody,
        )
    ),
    tags(
        (name = "Business Coaching API", description = "Credits, documents, reports, packages, the e-book reader and the advisor chat.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// What each paid action costs.
#[derive(Serialize, ToSchema)]
pub struct PriceList {
    pub version: String,
    pub package_per_document: u32,
    pub new_company_analysis: u32,
    pub exercise_analysis: u32,
    pub health_score: u32,
}

#[derive(Serialize, ToSchema)]
pub struct CreditsResponse {
    pub credits: u32,
    pub health_score_credits: u32,
    pub prices: PriceList,
}

impl From<CreditBalance> for CreditsResponse {
    fn from(balance: CreditBalance) -> Self {
        Self {
            credits: balance.credits,
            health_score_credits: balance.health_score_credits,
            prices: PriceList {
                version: PRICING_VERSION.to_string(),
                package_per_document: PACKAGE_CREDITS_PER_DOCUMENT,
                new_company_analysis: NEW_COMPANY_ANALYSIS_CREDITS,
                exercise_analysis: EXERCISE_ANALYSIS_CREDITS,
                health_score: HEALTH_SCORE_CREDITS,
            },
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Document> for DocumentResponse {
    fn from(d: Document) -> Self {
        Self {
            id: d.id,
            name: d.name,
            size_bytes: d.size_bytes,
            mime_type: d.kind.mime_type().to_string(),
            uploaded_at: d.uploaded_at,
        }
    }
}

const TOO_LARGE_CODE: &str = "too-large";

//=========================================================================================
// Credits
//=========================================================================================

/// Current credit balances, fetched from the server.
#[utoipa::path(
    get,
    path = "/credits",
    responses(
        (status = 200, description = "Balances and prices", body = CreditsResponse),
        (status = 502, description = "Credit service unavailable", body = ErrorBody)
    )
)]
pub async fn credits_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> HandlerResult<Json<CreditsResponse>> {
    let balance = state
        .ledger(user_id)
        .refresh()
        .await
        .map_err(|e| credit_error(&e))?;
    Ok(Json(balance.into()))
}

//=========================================================================================
// Documents
//=========================================================================================

/// List the user's documents, most recent first.
#[utoipa::path(
    get,
    path = "/documents",
    responses(
        (status = 200, description = "Documents", body = [DocumentResponse]),
        (status = 502, description = "Storage unavailable", body = ErrorBody)
    )
)]
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> HandlerResult<Json<Vec<DocumentResponse>>> {
    let documents = state
        .library(user_id)
        .list()
        .await
        .map_err(|e| document_error(&e))?;
    Ok(Json(documents.into_iter().map(DocumentResponse::from).collect()))
}

/// Upload a document.
///
/// Accepts a multipart/form-data request with a single file part. PDF, TXT and
/// DOCX files up to 10 MB are accepted.
#[utoipa::path(
    post,
    path = "/documents",
    request_body(content_type = "multipart/form-data", description = "The document to upload."),
    responses(
        (status = 201, description = "Document stored", body = DocumentResponse),
        (status = 400, description = "Invalid or empty file", body = ErrorBody),
        (status = 413, description = "File too large", body = ErrorBody),
        (status = 502, description = "Storage unavailable", body = ErrorBody)
    )
)]
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    mut multipart: Multipart,
) -> HandlerResult<impl IntoResponse> {
    let multipart_failed = |e: axum::extract::multipart::MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            let (status, Json(mut body)) =
                error_response(StatusCode::PAYLOAD_TOO_LARGE, "File too large (max 10 MB)");
            body.code = Some(TOO_LARGE_CODE.to_string());
            (status, Json(body))
        } else {
            error!("Failed to read multipart data: {}", e);
            bad_request(format!("Failed to read multipart data: {}", e))
        }
    };

    let field = multipart
        .next_field()
        .await
        .map_err(multipart_failed)?
        .ok_or_else(|| bad_request("Multipart form must include a file"))?;

    let name = field.file_name().unwrap_or("untitled").to_string();
    let mime_type = field.content_type().unwrap_or_default().to_string();
    let content = field.bytes().await.map_err(multipart_failed)?;

    let document = state
        .library(user_id)
        .upload(UploadFile {
            name,
            mime_type,
            content: content.to_vec(),
        })
        .await
        .map_err(|e| document_error(&e))?;

    Ok((StatusCode::CREATED, Json(DocumentResponse::from(document))))
}

/// Delete a document. Deleting a document that is already gone succeeds.
#[utoipa::path(
    delete,
    path = "/documents/{id}",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 502, description = "Storage unavailable", body = ErrorBody)
    )
)]
pub async fn delete_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
) -> HandlerResult<StatusCode> {
    state
        .library(user_id)
        .delete(document_id)
        .await
        .map_err(|e| document_error(&e))?;
    info!(%user_id, %document_id, "Document delete handled");
    Ok(StatusCode::NO_CONTENT)
}

/// Used by handlers that need a JSON error for an unavailable feature.
pub fn not_configured(feature: &str) -> crate::web::errors::HandlerError {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        format!("{} is not configured on this server", feature),
    )
}
