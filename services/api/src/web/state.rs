//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-user component
//! constructors handlers work through.

use crate::config::Config;
use coaching_core::credits::CreditLedger;
use coaching_core::documents::DocumentLibrary;
use coaching_core::packages::PackageManager;
use coaching_core::ports::{
    AdvisorChat, ChangeFeed, CreditStore, DatabaseService, DocumentStorage, Notifier,
    PackageStore, PortError, PortResult, RemoteFunctions, ReportStore,
};
use coaching_core::reader::Chapter;
use coaching_core::reports::ReportManager;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub credits: Arc<dyn CreditStore>,
    pub documents: Arc<dyn DocumentStorage>,
    pub reports: Arc<dyn ReportStore>,
    pub packages: Arc<dyn PackageStore>,
    pub functions: Arc<dyn RemoteFunctions>,
    pub changes: Arc<dyn ChangeFeed>,
    pub notifier: Arc<dyn Notifier>,
    /// `None` when no model API key is configured.
    pub chat: Option<Arc<dyn AdvisorChat>>,
    pub config: Arc<Config>,
    pub book: Arc<Vec<Chapter>>,
}

impl AppState {
    /// A fresh ledger per request; the server stays the only balance authority.
    pub fn ledger(&self, user_id: Uuid) -> CreditLedger {
        CreditLedger::new(Arc::clone(&self.credits), user_id)
    }

    pub fn library(&self, user_id: Uuid) -> DocumentLibrary {
        DocumentLibrary::new(Arc::clone(&self.documents), user_id)
    }

    pub fn report_manager(&self, user_id: Uuid) -> ReportManager {
        ReportManager::new(Arc::clone(&self.reports), Arc::clone(&self.notifier), user_id)
    }

    pub fn package_manager(&self, user_id: Uuid) -> PackageManager {
        PackageManager::new(
            Arc::clone(&self.packages),
            Arc::clone(&self.functions),
            Arc::clone(&self.changes),
            user_id,
        )
    }

    /// Users without a profile row are treated as not subscribed.
    pub async fn subscribed(&self, user_id: Uuid) -> PortResult<bool> {
        match self.db.get_profile(user_id).await {
            Ok(profile) => Ok(profile.subscribed),
            Err(PortError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

//=========================================================================================
// Book loading
//=========================================================================================

/// Loads the book from a directory of `.md`/`.txt` files, one chapter per file,
/// ordered by file name. A leading `# Title` line becomes the chapter title.
pub fn load_book(dir: &Path) -> std::io::Result<Vec<Chapter>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("md") | Some("txt")
                )
        })
        .collect();
    paths.sort();

    let mut chapters = Vec::with_capacity(paths.len());
    for path in paths {
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable chapter");
                continue;
            }
        };
        let number = chapters.len() as u32 + 1;
        let fallback = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Chapter")
            .to_string();
        chapters.push(parse_chapter(number, &text, fallback));
    }
    Ok(chapters)
}

fn parse_chapter(number: u32, text: &str, fallback_title: String) -> Chapter {
    let trimmed = text.trim_start();
    match trimmed.split_once('\n') {
        Some((first, rest)) if first.starts_with('#') => Chapter {
            number,
            title: first.trim_start_matches('#').trim().to_string(),
            body: rest.trim().to_string(),
        },
        None if trimmed.starts_with('#') => Chapter {
            number,
            title: trimmed.trim_start_matches('#').trim().to_string(),
            body: String::new(),
        },
        _ => Chapter {
            number,
            title: fallback_title,
            body: text.trim().to_string(),
        },
    }
}
