//! crates/coaching_core/src/packages.rs
//!
//! Packages are bundles of generated documents attached to a report. Creation
//! is asynchronous: the remote generator first inserts a queue placeholder and
//! later the completed package row. Every change event triggers a full
//! re-fetch of both lists instead of patching local state.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::credits::{CreditError, CreditLedger};
use crate::domain::{CreditKind, Package, PackageTemplate, QueuedPackage};
use crate::ports::{ChangeFeed, CreatePackageRequest, PackageStore, PortError, RemoteFunctions};
use crate::pricing::package_cost;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PackageError {
    #[error("Invalid package request: {0}")]
    Invalid(String),
    #[error(transparent)]
    Credits(#[from] CreditError),
    #[error("Package service failed: {0}")]
    Remote(#[from] PortError),
}

pub type PackageResult<T> = Result<T, PackageError>;

/// How packages are presented: same-named versions collapse into a folder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PackageEntry {
    Single { package: Package },
    /// Versions are ordered newest first.
    Folder { name: String, versions: Vec<Package> },
}

impl PackageEntry {
    pub fn name(&self) -> &str {
        match self {
            PackageEntry::Single { package } => &package.package_name,
            PackageEntry::Folder { name, .. } => name,
        }
    }

    /// The most recently created version; drives cover image and summary.
    pub fn latest(&self) -> &Package {
        match self {
            PackageEntry::Single { package } => package,
            // Folders are only built with at least two versions.
            PackageEntry::Folder { versions, .. } => &versions[0],
        }
    }

    pub fn cover_image_url(&self) -> Option<&str> {
        self.latest().cover_image_url.as_deref()
    }
}

/// Groups packages by name. Entries are ordered by their latest version, newest first.
pub fn group_packages(packages: Vec<Package>) -> Vec<PackageEntry> {
    let mut by_name: BTreeMap<String, Vec<Package>> = BTreeMap::new();
    for package in packages {
        by_name
            .entry(package.package_name.clone())
            .or_default()
            .push(package);
    }

    let mut entries: Vec<PackageEntry> = by_name
        .into_iter()
        .map(|(name, mut versions)| {
            versions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            if versions.len() == 1 {
                PackageEntry::Single {
                    package: versions.remove(0),
                }
            } else {
                PackageEntry::Folder { name, versions }
            }
        })
        .collect();
    entries.sort_by(|a, b| b.latest().created_at.cmp(&a.latest().created_at));
    entries
}

/// Completed entries plus the placeholders still being generated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageSnapshot {
    pub report_id: Uuid,
    pub entries: Vec<PackageEntry>,
    pub queued: Vec<QueuedPackage>,
}

impl PackageSnapshot {
    /// A placeholder is superseded once a package with its name was created at
    /// or after the placeholder itself.
    pub fn build(report_id: Uuid, packages: Vec<Package>, queued: Vec<QueuedPackage>) -> Self {
        let queued = queued
            .into_iter()
            .filter(|q| {
                !packages
                    .iter()
                    .any(|p| p.package_name == q.package_name && p.created_at >= q.created_at)
            })
            .collect();
        Self {
            report_id,
            entries: group_packages(packages),
            queued,
        }
    }

    /// Remaining seconds per queued placeholder, clamped at zero.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> Vec<(Uuid, i64)> {
        self.queued
            .iter()
            .map(|q| (q.id, q.remaining(now).num_seconds()))
            .collect()
    }
}

/// What the user picked in the package-creation wizard.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageSelection {
    pub report_id: Uuid,
    pub package_name: String,
    pub documents: Vec<String>,
}

impl PackageSelection {
    pub fn cost(&self) -> u32 {
        package_cost(self.documents.len())
    }
}

pub struct PackageManager {
    store: Arc<dyn PackageStore>,
    functions: Arc<dyn RemoteFunctions>,
    feed: Arc<dyn ChangeFeed>,
    user_id: Uuid,
}

impl PackageManager {
    pub fn new(
        store: Arc<dyn PackageStore>,
        functions: Arc<dyn RemoteFunctions>,
        feed: Arc<dyn ChangeFeed>,
        user_id: Uuid,
    ) -> Self {
        Self {
            store,
            functions,
            feed,
            user_id,
        }
    }

    pub async fn list(&self, report_id: Uuid) -> PackageResult<Vec<PackageEntry>> {
        let packages = self.store.list_packages(report_id).await?;
        Ok(group_packages(packages))
    }

    pub async fn list_queued(&self, report_id: Uuid) -> PackageResult<Vec<QueuedPackage>> {
        Ok(self.store.list_queued(report_id).await?)
    }

    pub async fn snapshot(&self, report_id: Uuid) -> PackageResult<PackageSnapshot> {
        fetch_snapshot(self.store.as_ref(), report_id).await
    }

    pub async fn templates(&self) -> PackageResult<Vec<PackageTemplate>> {
        Ok(self.functions.coach_packages().await?)
    }

    /// Charges for the selection and then asks the generator for it.
    ///
    /// The create call is only made after a successful charge. If the create
    /// call fails, the charge is refunded.
    pub async fn create(
        &self,
        ledger: &CreditLedger,
        selection: &PackageSelection,
    ) -> PackageResult<()> {
        let name = selection.package_name.trim();
        if name.is_empty() {
            return Err(PackageError::Invalid("package name is required".to_string()));
        }
        if selection.documents.is_empty() {
            return Err(PackageError::Invalid(
                "select at least one document".to_string(),
            ));
        }

        let cost = selection.cost();
        ledger.ensure_loaded().await?;
        ledger.require(CreditKind::General, cost)?;

        let charge = ledger
            .deduct_credits(cost, &format!("Package creation: {}", name), "package")
            .await?;

        let request = CreatePackageRequest {
            report_id: selection.report_id,
            user_id: self.user_id,
            package_name: name.to_string(),
            documents: selection.documents.clone(),
            credits_charged: cost,
        };

        if let Err(e) = self.functions.create_package(&request).await {
            error!(report_id = %selection.report_id, error = %e, "Package creation request failed");
            if let Err(refund_err) = ledger
                .refund(&charge, &format!("Refund: package creation failed: {}", name))
                .await
            {
                warn!(request_id = %charge.request_id, error = %refund_err, "Refund after failed package creation did not go through");
            }
            return Err(PackageError::Remote(e));
        }

        info!(
            report_id = %selection.report_id,
            package = %name,
            documents = selection.documents.len(),
            cost,
            "Package creation queued"
        );
        Ok(())
    }

    pub async fn delete(&self, package_id: Uuid) -> PackageResult<()> {
        self.store.delete_package(self.user_id, package_id).await?;
        info!(%package_id, "Package deleted");
        Ok(())
    }

    /// A snapshot now, then a fresh snapshot after every change event for the
    /// report. Duplicate or reordered events only cause redundant re-fetches.
    pub fn watch(&self, report_id: Uuid) -> BoxStream<'static, PackageResult<PackageSnapshot>> {
        let store = Arc::clone(&self.store);
        let events = self.feed.subscribe(report_id);

        let initial = stream::once(async {});
        let triggers = events.map(|event| {
            debug!(?event, "Package change received");
        });

        initial
            .chain(triggers)
            .then(move |_| {
                let store = Arc::clone(&store);
                async move { fetch_snapshot(store.as_ref(), report_id).await }
            })
            .boxed()
    }
}

async fn fetch_snapshot(store: &dyn PackageStore, report_id: Uuid) -> PackageResult<PackageSnapshot> {
    let packages = store.list_packages(report_id).await?;
    let queued = store.list_queued(report_id).await?;
    Ok(PackageSnapshot::build(report_id, packages, queued))
}
