//! crates/coaching_core/src/reports.rs
//!
//! Creation, listing and lifecycle of business-health reports. Status and
//! scores are written by the external analysis; the local copy may be stale,
//! so callers re-fetch rather than assume freshness after a create.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{NewReport, Notification, Report, ReportStatus, ReportType};
use crate::ports::{Notifier, PortError, ReportStore};

/// Fallback exercise id when a title carries no `Exercise N:` prefix.
pub const UNKNOWN_EXERCISE: &str = "unknown";

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReportError {
    #[error("Invalid report: {0}")]
    Invalid(String),
    #[error("Report not found: {0}")]
    NotFound(Uuid),
    #[error("Report service failed: {0}")]
    Remote(PortError),
}

impl ReportError {
    fn from_port(report_id: Uuid, e: PortError) -> Self {
        match e {
            PortError::NotFound(_) => ReportError::NotFound(report_id),
            other => ReportError::Remote(other),
        }
    }
}

impl From<PortError> for ReportError {
    fn from(e: PortError) -> Self {
        ReportError::Remote(e)
    }
}

pub type ReportResult<T> = Result<T, ReportError>;

/// Extracts `N` from titles like `"Exercise 3: Know your numbers"`.
pub fn exercise_id_from_title(title: &str) -> String {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"Exercise (\d+):").ok())
        .as_ref()
        .and_then(|re| re.captures(title))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_EXERCISE.to_string())
}

/// Caller choices for a new report.
#[derive(Debug, Clone)]
pub struct CreateReportOptions {
    pub report_type: ReportType,
    /// Used for `Existing` reports when no `New` report of the company is found.
    pub company_id: Option<Uuid>,
    pub title: Option<String>,
    pub document_url: Option<String>,
    /// Overrides the id derived from the exercise title.
    pub exercise_id: Option<String>,
}

impl Default for CreateReportOptions {
    fn default() -> Self {
        Self {
            report_type: ReportType::New,
            company_id: None,
            title: None,
            document_url: None,
            exercise_id: None,
        }
    }
}

/// List filters; every populated field must match.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    /// Case-insensitive substring of company name or title.
    pub search: Option<String>,
    pub status: Option<ReportStatus>,
    pub report_type: Option<ReportType>,
}

impl ReportFilter {
    pub fn matches(&self, report: &Report) -> bool {
        if let Some(status) = self.status {
            if report.status != status {
                return false;
            }
        }
        if let Some(report_type) = self.report_type {
            if report.report_type != report_type {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                report.company_name.to_lowercase().contains(&term)
                    || report.title.to_lowercase().contains(&term)
            }
            _ => true,
        }
    }
}

/// A `New` report together with the `Existing` reports that continue it.
#[derive(Debug, Clone)]
pub struct CompanyHistory {
    pub origin: Report,
    pub follow_ups: Vec<Report>,
}

pub struct ReportManager {
    store: Arc<dyn ReportStore>,
    notifier: Arc<dyn Notifier>,
    user_id: Uuid,
}

impl ReportManager {
    pub fn new(store: Arc<dyn ReportStore>, notifier: Arc<dyn Notifier>, user_id: Uuid) -> Self {
        Self {
            store,
            notifier,
            user_id,
        }
    }

    /// Creates a report in `In Progress` and fires the creation webhook.
    pub async fn create(
        &self,
        company_name: &str,
        exercise_title: &str,
        options: CreateReportOptions,
    ) -> ReportResult<Report> {
        let company_name = company_name.trim();
        if company_name.is_empty() {
            return Err(ReportError::Invalid("company name is required".to_string()));
        }

        let exercise_id = options
            .exercise_id
            .clone()
            .unwrap_or_else(|| exercise_id_from_title(exercise_title));

        let (report_type, company_id) = match options.report_type {
            ReportType::New => (ReportType::New, None),
            ReportType::Existing => match self
                .resolve_company_id(company_name)
                .await?
                .or(options.company_id)
            {
                Some(id) => (ReportType::Existing, Some(id)),
                None => {
                    warn!(company = %company_name, "No company to continue; storing the report as New");
                    (ReportType::New, None)
                }
            },
        };

        let title = options
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("{} - {}", company_name, exercise_title));

        let report = self
            .store
            .insert_report(&NewReport {
                user_id: self.user_id,
                title,
                company_name: company_name.to_string(),
                exercise_id: exercise_id.clone(),
                status: ReportStatus::InProgress,
                report_type,
                document_url: options.document_url,
                company_id,
            })
            .await?;

        info!(
            report_id = %report.id,
            company = %report.company_name,
            exercise_id = %report.exercise_id,
            report_type = report.report_type.as_str(),
            "Report created"
        );

        self.notifier.notify(Notification::ReportCreated {
            report_id: report.id,
            user_id: self.user_id,
            company_name: report.company_name.clone(),
            exercise_id,
            exercise_title: exercise_title.to_string(),
        });

        Ok(report)
    }

    /// The earliest `New` report for the company, if any.
    async fn resolve_company_id(&self, company_name: &str) -> ReportResult<Option<Uuid>> {
        let candidates = self
            .store
            .list_new_reports_for_company(self.user_id, company_name)
            .await?;
        let earliest = candidates.iter().min_by_key(|r| r.created_at).map(|r| r.id);
        if earliest.is_none() {
            debug!(company = %company_name, "No originating New report found for Existing report");
        }
        Ok(earliest)
    }

    pub async fn list(&self, filter: &ReportFilter) -> ReportResult<Vec<Report>> {
        let reports = self.store.list_reports(self.user_id).await?;
        Ok(reports.into_iter().filter(|r| filter.matches(r)).collect())
    }

    pub async fn get(&self, report_id: Uuid) -> ReportResult<Report> {
        self.store
            .get_report(self.user_id, report_id)
            .await
            .map_err(|e| ReportError::from_port(report_id, e))
    }

    pub async fn delete(&self, report_id: Uuid) -> ReportResult<()> {
        self.store
            .delete_report(self.user_id, report_id)
            .await
            .map_err(|e| ReportError::from_port(report_id, e))?;
        info!(%report_id, "Report deleted");
        Ok(())
    }

    /// Puts a report back to `In Progress`; the external analysis does the rest.
    pub async fn rerun(&self, report_id: Uuid) -> ReportResult<Report> {
        let report = self
            .store
            .set_report_status(self.user_id, report_id, ReportStatus::InProgress)
            .await
            .map_err(|e| ReportError::from_port(report_id, e))?;
        info!(%report_id, "Report re-run requested");
        Ok(report)
    }

    /// Gathers a `New` report and every `Existing` report linked to it.
    pub async fn company_history(&self, origin_id: Uuid) -> ReportResult<CompanyHistory> {
        let reports = self.store.list_reports(self.user_id).await?;
        let origin = reports
            .iter()
            .find(|r| r.id == origin_id && r.report_type == ReportType::New)
            .cloned()
            .ok_or(ReportError::NotFound(origin_id))?;
        let mut follow_ups: Vec<Report> = reports
            .into_iter()
            .filter(|r| r.report_type == ReportType::Existing && r.company_id == Some(origin_id))
            .collect();
        follow_ups.sort_by_key(|r| r.created_at);
        Ok(CompanyHistory { origin, follow_ups })
    }
}
