//! crates/coaching_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or transport format; the
//! serde derives only describe how they appear on the JSON API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//=========================================================================================
// Users and Auth
//=========================================================================================

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Per-user profile flags that gate content.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub subscribed: bool,
}

//=========================================================================================
// Credits
//=========================================================================================

/// The two independently tracked balances of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    pub credits: u32,
    pub health_score_credits: u32,
}

impl CreditBalance {
    pub fn of(&self, kind: CreditKind) -> u32 {
        match kind {
            CreditKind::General => self.credits,
            CreditKind::HealthScore => self.health_score_credits,
        }
    }
}

/// Which balance an operation draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditKind {
    General,
    HealthScore,
}

impl CreditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditKind::General => "general",
            CreditKind::HealthScore => "health_score",
        }
    }
}

/// A single server-side decrement, carrying its audit trail.
///
/// `request_id` identifies the logical request: the store applies a given id at
/// most once, so a retry after an ambiguous failure cannot double-charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeductionRequest {
    pub request_id: Uuid,
    pub kind: CreditKind,
    pub amount: u32,
    pub reason: String,
    pub category: String,
}

/// What the server decided about a deduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeductionOutcome {
    /// The decrement was committed; carries the post-deduction balance.
    Applied(CreditBalance),
    /// The balance was too low; nothing was changed.
    Insufficient(CreditBalance),
}

//=========================================================================================
// Documents
//=========================================================================================

/// The file types accepted into a user's workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Txt,
    Docx,
}

impl DocumentKind {
    pub const PDF_MIME: &'static str = "application/pdf";
    pub const TXT_MIME: &'static str = "text/plain";
    pub const DOCX_MIME: &'static str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => Self::PDF_MIME,
            DocumentKind::Txt => Self::TXT_MIME,
            DocumentKind::Docx => Self::DOCX_MIME,
        }
    }

    /// Maps a MIME type to a kind. Parameters such as `; charset=utf-8` are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            Self::PDF_MIME => Some(DocumentKind::Pdf),
            Self::TXT_MIME => Some(DocumentKind::Txt),
            Self::DOCX_MIME => Some(DocumentKind::Docx),
            _ => None,
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" => Some(DocumentKind::Txt),
            "docx" => Some(DocumentKind::Docx),
            _ => None,
        }
    }
}

/// A stored source document. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub size_bytes: u64,
    pub kind: DocumentKind,
    pub uploaded_at: DateTime<Utc>,
}

/// A validated upload on its way to storage.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub name: String,
    pub kind: DocumentKind,
    pub content: Vec<u8>,
}

//=========================================================================================
// Reports
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::InProgress => "In Progress",
            ReportStatus::Completed => "Completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "In Progress" => Some(ReportStatus::InProgress),
            "Completed" => Some(ReportStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a report starts a company's history or continues it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportType {
    New,
    Existing,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::New => "New",
            ReportType::Existing => "Existing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "New" => Some(ReportType::New),
            "Existing" => Some(ReportType::Existing),
            _ => None,
        }
    }
}

/// Per-dimension scores written by the external analysis. The overall score is
/// supplied by that analysis as well and is never derived here.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionScores {
    pub plan: Option<f64>,
    pub people: Option<f64>,
    pub profits: Option<f64>,
    pub purpose_impact: Option<f64>,
    pub stress_leadership: Option<f64>,
    pub overall: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub company_name: String,
    pub exercise_id: String,
    pub status: ReportStatus,
    pub report_type: ReportType,
    pub scores: DimensionScores,
    pub document_url: Option<String>,
    /// For `Existing` reports, the id of the originating `New` report.
    pub company_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The row handed to the store on creation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub user_id: Uuid,
    pub title: String,
    pub company_name: String,
    pub exercise_id: String,
    pub status: ReportStatus,
    pub report_type: ReportType,
    pub document_url: Option<String>,
    pub company_id: Option<Uuid>,
}

//=========================================================================================
// Packages
//=========================================================================================

/// One generated document inside a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDocument {
    pub name: String,
    pub urls: Vec<String>,
}

/// A completed bundle of generated documents for a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: Uuid,
    pub report_id: Uuid,
    pub package_name: String,
    pub documents: Vec<PackageDocument>,
    pub cover_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Placeholder for a package the remote system is still generating.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedPackage {
    pub id: Uuid,
    pub report_id: Uuid,
    pub package_name: String,
    pub estimated_completion: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl QueuedPackage {
    /// Time left until the estimate, never negative.
    pub fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        let left = self.estimated_completion - now;
        if left < chrono::Duration::zero() {
            chrono::Duration::zero()
        } else {
            left
        }
    }
}

/// A package shape offered by the coach, listing the documents it will contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageTemplate {
    pub name: String,
    pub description: Option<String>,
    pub documents: Vec<String>,
}

//=========================================================================================
// Realtime and notifications
//=========================================================================================

/// The tables a change feed reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Packages,
    PackageQueue,
    Reports,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change. Consumers treat it as a trigger to re-fetch, never as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub kind: ChangeKind,
    pub report_id: Uuid,
}

/// Best-effort side-channel messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    ReportCreated {
        report_id: Uuid,
        user_id: Uuid,
        company_name: String,
        exercise_id: String,
        exercise_title: String,
    },
}

//=========================================================================================
// Chat
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A previous exchange in an advisor conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}
