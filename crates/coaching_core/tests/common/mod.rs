//! Common test utilities: one in-memory backend implementing every port,
//! recording each call so tests can assert on what was (not) sent.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use coaching_core::domain::{
    ChangeEvent, CreditBalance, CreditKind, DeductionOutcome, DeductionRequest, DimensionScores,
    Document, NewDocument, NewReport, Notification, Package, PackageTemplate, QueuedPackage, Report,
    ReportStatus, ReportType,
};
use coaching_core::ports::{
    ChangeFeed, CreatePackageRequest, CreditStore, DocumentStorage, HealthSubmission, Notifier,
    PackageStore, PortError, PortResult, RemoteFunctions, ReportStore,
};
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use uuid::Uuid;

/// One audit line: signed amount, kind, reason, category.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub amount: i64,
    pub kind: CreditKind,
    pub reason: String,
    pub category: String,
}

#[derive(Default)]
pub struct Backend {
    pub balance: Mutex<CreditBalance>,
    pub applied_requests: Mutex<HashSet<Uuid>>,
    pub audit: Mutex<Vec<AuditEntry>>,
    pub deduct_calls: AtomicUsize,
    /// Next deduction fails before reaching the balance.
    pub fail_next_deduction: AtomicBool,
    /// Next deduction is committed but the reply is lost.
    pub lose_next_deduction_reply: AtomicBool,

    pub documents: Mutex<Vec<(Document, Vec<u8>)>>,
    pub storage_calls: AtomicUsize,
    pub fail_storage: AtomicBool,

    pub reports: Mutex<Vec<Report>>,
    pub notifications: Mutex<Vec<Notification>>,

    pub packages: Mutex<Vec<Package>>,
    pub queued: Mutex<Vec<QueuedPackage>>,
    pub package_list_calls: AtomicUsize,
    pub package_requests: Mutex<Vec<CreatePackageRequest>>,
    pub health_submissions: Mutex<Vec<HealthSubmission>>,
    pub fail_functions: AtomicBool,

    subscribers: Mutex<Vec<(Uuid, mpsc::UnboundedSender<ChangeEvent>)>>,
}

impl Backend {
    pub fn with_balance(credits: u32, health_score_credits: u32) -> Arc<Self> {
        let backend = Self::default();
        *backend.balance.lock().unwrap() = CreditBalance {
            credits,
            health_score_credits,
        };
        Arc::new(backend)
    }

    pub fn balance(&self) -> CreditBalance {
        *self.balance.lock().unwrap()
    }

    /// Inserts a report directly, as the analysis system or an earlier session would.
    pub fn seed_report(
        &self,
        user_id: Uuid,
        company: &str,
        report_type: ReportType,
        minutes_ago: i64,
    ) -> Report {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        let report = Report {
            id: Uuid::new_v4(),
            user_id,
            title: format!("{} - seeded", company),
            company_name: company.to_string(),
            exercise_id: "1".to_string(),
            status: ReportStatus::Completed,
            report_type,
            scores: DimensionScores::default(),
            document_url: None,
            company_id: None,
            created_at: at,
            updated_at: at,
        };
        self.reports.lock().unwrap().push(report.clone());
        report
    }

    pub fn seed_package(&self, report_id: Uuid, name: &str, minutes_ago: i64) -> Package {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        let package = Package {
            id: Uuid::new_v4(),
            report_id,
            package_name: name.to_string(),
            documents: vec![],
            cover_image_url: None,
            created_at: at,
            updated_at: at,
        };
        self.packages.lock().unwrap().push(package.clone());
        package
    }

    /// Emits a change event to every subscriber of the report.
    pub fn emit(&self, event: ChangeEvent) {
        for (report_id, tx) in self.subscribers.lock().unwrap().iter() {
            if *report_id == event.report_id {
                let _ = tx.unbounded_send(event);
            }
        }
    }
}

#[async_trait]
impl CreditStore for Backend {
    async fn fetch_balance(&self, _user_id: Uuid) -> PortResult<CreditBalance> {
        Ok(self.balance())
    }

    async fn deduct(&self, _user_id: Uuid, request: &DeductionRequest) -> PortResult<DeductionOutcome> {
        self.deduct_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_deduction.swap(false, Ordering::SeqCst) {
            return Err(PortError::Unexpected("connection reset".into()));
        }

        let mut balance = self.balance.lock().unwrap();
        if self.applied_requests.lock().unwrap().contains(&request.request_id) {
            return Ok(DeductionOutcome::Applied(*balance));
        }
        let slot = match request.kind {
            CreditKind::General => &mut balance.credits,
            CreditKind::HealthScore => &mut balance.health_score_credits,
        };
        if *slot < request.amount {
            return Ok(DeductionOutcome::Insufficient(*balance));
        }
        *slot -= request.amount;
        self.applied_requests.lock().unwrap().insert(request.request_id);
        self.audit.lock().unwrap().push(AuditEntry {
            amount: -(request.amount as i64),
            kind: request.kind,
            reason: request.reason.clone(),
            category: request.category.clone(),
        });

        if self.lose_next_deduction_reply.swap(false, Ordering::SeqCst) {
            return Err(PortError::Unexpected("gateway timeout".into()));
        }
        Ok(DeductionOutcome::Applied(*balance))
    }

    async fn refund(
        &self,
        _user_id: Uuid,
        _request_id: Uuid,
        kind: CreditKind,
        amount: u32,
        reason: &str,
    ) -> PortResult<CreditBalance> {
        let mut balance = self.balance.lock().unwrap();
        match kind {
            CreditKind::General => balance.credits += amount,
            CreditKind::HealthScore => balance.health_score_credits += amount,
        }
        self.audit.lock().unwrap().push(AuditEntry {
            amount: amount as i64,
            kind,
            reason: reason.to_string(),
            category: "refund".to_string(),
        });
        Ok(*balance)
    }
}

#[async_trait]
impl DocumentStorage for Backend {
    async fn put_document(&self, user_id: Uuid, document: &NewDocument) -> PortResult<Document> {
        self.storage_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_storage.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("bucket unavailable".into()));
        }
        let stored = Document {
            id: Uuid::new_v4(),
            user_id,
            name: document.name.clone(),
            size_bytes: document.content.len() as u64,
            kind: document.kind,
            uploaded_at: Utc::now(),
        };
        self.documents
            .lock()
            .unwrap()
            .push((stored.clone(), document.content.clone()));
        Ok(stored)
    }

    async fn list_documents(&self, user_id: Uuid) -> PortResult<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d.user_id == user_id)
            .map(|(d, _)| d.clone())
            .collect();
        docs.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(docs)
    }

    async fn delete_document(&self, user_id: Uuid, document_id: Uuid) -> PortResult<()> {
        self.storage_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_storage.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("bucket unavailable".into()));
        }
        let mut docs = self.documents.lock().unwrap();
        let before = docs.len();
        docs.retain(|(d, _)| !(d.id == document_id && d.user_id == user_id));
        if docs.len() == before {
            return Err(PortError::NotFound(format!("Document {}", document_id)));
        }
        Ok(())
    }

    async fn read_document(&self, user_id: Uuid, document_id: Uuid) -> PortResult<Vec<u8>> {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .find(|(d, _)| d.id == document_id && d.user_id == user_id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| PortError::NotFound(format!("Document {}", document_id)))
    }
}

#[async_trait]
impl ReportStore for Backend {
    async fn insert_report(&self, report: &NewReport) -> PortResult<Report> {
        let now = Utc::now();
        let stored = Report {
            id: Uuid::new_v4(),
            user_id: report.user_id,
            title: report.title.clone(),
            company_name: report.company_name.clone(),
            exercise_id: report.exercise_id.clone(),
            status: report.status,
            report_type: report.report_type,
            scores: DimensionScores::default(),
            document_url: report.document_url.clone(),
            company_id: report.company_id,
            created_at: now,
            updated_at: now,
        };
        self.reports.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn get_report(&self, user_id: Uuid, report_id: Uuid) -> PortResult<Report> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == report_id && r.user_id == user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Report {}", report_id)))
    }

    async fn list_reports(&self, user_id: Uuid) -> PortResult<Vec<Report>> {
        Ok(self
            .reports
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_new_reports_for_company(
        &self,
        user_id: Uuid,
        company_name: &str,
    ) -> PortResult<Vec<Report>> {
        let mut found: Vec<Report> = self
            .reports
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                r.user_id == user_id
                    && r.report_type == ReportType::New
                    && r.company_name == company_name
            })
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }

    async fn set_report_status(
        &self,
        user_id: Uuid,
        report_id: Uuid,
        status: ReportStatus,
    ) -> PortResult<Report> {
        let mut reports = self.reports.lock().unwrap();
        let report = reports
            .iter_mut()
            .find(|r| r.id == report_id && r.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("Report {}", report_id)))?;
        report.status = status;
        report.updated_at = Utc::now();
        Ok(report.clone())
    }

    async fn delete_report(&self, user_id: Uuid, report_id: Uuid) -> PortResult<()> {
        let mut reports = self.reports.lock().unwrap();
        let before = reports.len();
        reports.retain(|r| !(r.id == report_id && r.user_id == user_id));
        if reports.len() == before {
            return Err(PortError::NotFound(format!("Report {}", report_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl PackageStore for Backend {
    async fn list_packages(&self, report_id: Uuid) -> PortResult<Vec<Package>> {
        self.package_list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .packages
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.report_id == report_id)
            .cloned()
            .collect())
    }

    async fn list_queued(&self, report_id: Uuid) -> PortResult<Vec<QueuedPackage>> {
        Ok(self
            .queued
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.report_id == report_id)
            .cloned()
            .collect())
    }

    async fn delete_package(&self, _user_id: Uuid, package_id: Uuid) -> PortResult<()> {
        let mut packages = self.packages.lock().unwrap();
        let before = packages.len();
        packages.retain(|p| p.id != package_id);
        if packages.len() == before {
            return Err(PortError::NotFound(format!("Package {}", package_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteFunctions for Backend {
    async fn submit_business_health(&self, submission: &HealthSubmission) -> PortResult<()> {
        if self.fail_functions.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("function returned 500".into()));
        }
        self.health_submissions.lock().unwrap().push(submission.clone());
        Ok(())
    }

    async fn coach_packages(&self) -> PortResult<Vec<PackageTemplate>> {
        Ok(vec![PackageTemplate {
            name: "Growth".into(),
            description: None,
            documents: vec!["Plan".into(), "Forecast".into()],
        }])
    }

    async fn create_package(&self, request: &CreatePackageRequest) -> PortResult<()> {
        if self.fail_functions.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("function returned 500".into()));
        }
        self.package_requests.lock().unwrap().push(request.clone());
        let now = Utc::now();
        self.queued.lock().unwrap().push(QueuedPackage {
            id: Uuid::new_v4(),
            report_id: request.report_id,
            package_name: request.package_name.clone(),
            estimated_completion: now + Duration::minutes(10),
            created_at: now,
        });
        Ok(())
    }
}

impl ChangeFeed for Backend {
    fn subscribe(&self, report_id: Uuid) -> BoxStream<'static, ChangeEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers.lock().unwrap().push((report_id, tx));
        rx.boxed()
    }
}

impl Notifier for Backend {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}
