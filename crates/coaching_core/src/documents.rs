//! crates/coaching_core/src/documents.rs
//!
//! Client for the user's source documents. Uploads are validated before any
//! storage call, and the in-memory list only changes after storage confirms.

use std::sync::{Arc, RwLock};

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Document, DocumentKind, NewDocument};
use crate::ports::{DocumentStorage, PortError};

/// Largest accepted upload: 10 MiB.
pub const MAX_DOCUMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Why an upload never reached storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
    #[error("Invalid file type: {mime_type}. Only PDF, TXT and DOCX files are accepted")]
    InvalidType { mime_type: String },
    #[error("File too large: {size_bytes} bytes (max 10 MB)")]
    TooLarge { size_bytes: u64 },
    #[error("File is empty")]
    Empty,
}

impl UploadRejection {
    /// Stable machine-readable code for the UI.
    pub fn code(&self) -> &'static str {
        match self {
            UploadRejection::InvalidType { .. } => "invalid-type",
            UploadRejection::TooLarge { .. } => "too-large",
            UploadRejection::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DocumentError {
    #[error(transparent)]
    Rejected(#[from] UploadRejection),
    #[error("Document storage failed: {0}")]
    Remote(#[from] PortError),
}

/// A file as received from the browser.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

/// Checks type and size. Browsers that send no useful MIME type fall back to
/// the file extension.
pub fn validate_upload(
    name: &str,
    mime_type: &str,
    size_bytes: u64,
) -> Result<DocumentKind, UploadRejection> {
    let generic = mime_type.trim().is_empty()
        || mime_type.eq_ignore_ascii_case("application/octet-stream");
    let kind = if generic {
        DocumentKind::from_file_name(name)
    } else {
        DocumentKind::from_mime(mime_type)
    };
    let kind = kind.ok_or_else(|| UploadRejection::InvalidType {
        mime_type: if generic {
            name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("unknown").to_string()
        } else {
            mime_type.to_string()
        },
    })?;

    if size_bytes > MAX_DOCUMENT_BYTES {
        return Err(UploadRejection::TooLarge { size_bytes });
    }
    if size_bytes == 0 {
        return Err(UploadRejection::Empty);
    }
    Ok(kind)
}

/// The documents of one user, mirrored in memory for the upload view.
pub struct DocumentLibrary {
    storage: Arc<dyn DocumentStorage>,
    user_id: Uuid,
    documents: RwLock<Vec<Document>>,
}

impl DocumentLibrary {
    pub fn new(storage: Arc<dyn DocumentStorage>, user_id: Uuid) -> Self {
        Self {
            storage,
            user_id,
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of the in-memory list.
    pub fn documents(&self) -> Vec<Document> {
        self.documents.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replaces the in-memory list with the server's.
    pub async fn list(&self) -> Result<Vec<Document>, DocumentError> {
        let docs = self.storage.list_documents(self.user_id).await?;
        *self.documents.write().unwrap_or_else(|e| e.into_inner()) = docs.clone();
        Ok(docs)
    }

    pub async fn upload(&self, file: UploadFile) -> Result<Document, DocumentError> {
        let kind = validate_upload(&file.name, &file.mime_type, file.content.len() as u64)?;

        let stored = self
            .storage
            .put_document(
                self.user_id,
                &NewDocument {
                    name: file.name,
                    kind,
                    content: file.content,
                },
            )
            .await?;

        info!(user_id = %self.user_id, document_id = %stored.id, name = %stored.name, "Document uploaded");
        self.documents
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(0, stored.clone());
        Ok(stored)
    }

    /// Deletes a document. An id that is already gone counts as deleted.
    pub async fn delete(&self, document_id: Uuid) -> Result<(), DocumentError> {
        match self.storage.delete_document(self.user_id, document_id).await {
            Ok(()) => {}
            Err(PortError::NotFound(_)) => {
                warn!(%document_id, "Document already deleted");
            }
            Err(e) => return Err(e.into()),
        }
        self.documents
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|d| d.id != document_id);
        Ok(())
    }
}
