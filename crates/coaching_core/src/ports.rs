//! crates/coaching_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture: the hosted
//! database, object storage, serverless functions, realtime feed and webhook
//! all live behind them, so the core never depends on a concrete backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    ChangeEvent, ChatTurn, CreditBalance, CreditKind, DeductionOutcome, DeductionRequest,
    Document, NewDocument, NewReport, Notification, Package, PackageTemplate, Profile,
    QueuedPackage, Report, ReportStatus, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Typed remote function requests
//=========================================================================================

/// A single question/answer pair captured by a questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
}

/// Payload of the business health submission function.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSubmission {
    pub company_name: String,
    pub exercise_id: String,
    pub report_id: Uuid,
    pub user_id: Uuid,
    pub answers: Vec<QuestionAnswer>,
}

/// Payload of the package generation function.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePackageRequest {
    pub report_id: Uuid,
    pub user_id: Uuid,
    pub package_name: String,
    pub documents: Vec<String>,
    pub credits_charged: u32,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Auth Methods ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Profile ---
    async fn get_profile(&self, user_id: Uuid) -> PortResult<Profile>;
}

/// The server-arbitrated credit balances and their audit ledger.
#[async_trait]
pub trait CreditStore: Send + Sync {
    async fn fetch_balance(&self, user_id: Uuid) -> PortResult<CreditBalance>;

    /// Atomically decrements one balance if it covers `request.amount` and
    /// appends an audit record. Replaying a `request_id` returns the current
    /// balance as `Applied` without charging again.
    async fn deduct(
        &self,
        user_id: Uuid,
        request: &DeductionRequest,
    ) -> PortResult<DeductionOutcome>;

    /// Returns credits taken by `request_id`. Audited like a deduction.
    async fn refund(
        &self,
        user_id: Uuid,
        request_id: Uuid,
        kind: CreditKind,
        amount: u32,
        reason: &str,
    ) -> PortResult<CreditBalance>;
}

/// Object storage plus metadata for user documents.
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    async fn put_document(&self, user_id: Uuid, document: &NewDocument) -> PortResult<Document>;

    /// Most recent first.
    async fn list_documents(&self, user_id: Uuid) -> PortResult<Vec<Document>>;

    /// Fails with `NotFound` when the id does not exist for this user.
    async fn delete_document(&self, user_id: Uuid, document_id: Uuid) -> PortResult<()>;

    async fn read_document(&self, user_id: Uuid, document_id: Uuid) -> PortResult<Vec<u8>>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn insert_report(&self, report: &NewReport) -> PortResult<Report>;

    async fn get_report(&self, user_id: Uuid, report_id: Uuid) -> PortResult<Report>;

    async fn list_reports(&self, user_id: Uuid) -> PortResult<Vec<Report>>;

    /// `New` reports for a company, earliest first.
    async fn list_new_reports_for_company(
        &self,
        user_id: Uuid,
        company_name: &str,
    ) -> PortResult<Vec<Report>>;

    async fn set_report_status(
        &self,
        user_id: Uuid,
        report_id: Uuid,
        status: ReportStatus,
    ) -> PortResult<Report>;

    async fn delete_report(&self, user_id: Uuid, report_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait PackageStore: Send + Sync {
    async fn list_packages(&self, report_id: Uuid) -> PortResult<Vec<Package>>;

    async fn list_queued(&self, report_id: Uuid) -> PortResult<Vec<QueuedPackage>>;

    async fn delete_package(&self, user_id: Uuid, package_id: Uuid) -> PortResult<()>;
}

/// The serverless procedures that do the real analysis and generation work.
/// Each operation has its own input and output; there is no free-form envelope.
#[async_trait]
pub trait RemoteFunctions: Send + Sync {
    async fn submit_business_health(&self, submission: &HealthSubmission) -> PortResult<()>;

    async fn coach_packages(&self) -> PortResult<Vec<PackageTemplate>>;

    /// Enqueues generation. The queue row and the finished package arrive
    /// through the store and the change feed.
    async fn create_package(&self, request: &CreatePackageRequest) -> PortResult<()>;
}

/// Push-based change notifications scoped to one report.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, report_id: Uuid) -> BoxStream<'static, ChangeEvent>;
}

/// Fire-and-forget notification side channel.
///
/// Implementations must return immediately and must never fail the caller;
/// delivery problems are theirs to log.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

#[async_trait]
pub trait AdvisorChat: Send + Sync {
    /// Answers a question about the user's documents, continuing `history`.
    async fn answer(
        &self,
        question: &str,
        context: &str,
        history: &[ChatTurn],
    ) -> PortResult<String>;
}
