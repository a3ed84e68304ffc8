//! services/api/src/adapters/storage.rs
//!
//! Implements the `DocumentStorage` port: file bytes live in an object storage
//! bucket reached over HTTP, their metadata in the `documents` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coaching_core::domain::{Document, DocumentKind, NewDocument};
use coaching_core::ports::{DocumentStorage, PortError, PortResult};
use reqwest::{header, Client, StatusCode};
use sqlx::{FromRow, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ObjectStorageAdapter {
    http: Client,
    base_url: String,
    bucket: String,
    service_key: Option<String>,
    pool: PgPool,
}

impl ObjectStorageAdapter {
    pub fn new(
        http: Client,
        base_url: String,
        bucket: String,
        service_key: Option<String>,
        pool: PgPool,
    ) -> Self {
        Self {
            http,
            base_url,
            bucket,
            service_key,
            pool,
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/object/{}/{}", self.base_url, self.bucket, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.service_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn remove_object(&self, path: &str) -> PortResult<()> {
        let response = self
            .authorized(self.http.delete(self.object_url(path)))
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        // An object that is already gone counts as removed.
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(PortError::Unexpected(format!(
                "Storage delete returned {}",
                response.status()
            )))
        }
    }
}

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    mime_type: String,
    size_bytes: i64,
    uploaded_at: DateTime<Utc>,
}
impl DocumentRecord {
    fn to_domain(self) -> PortResult<Document> {
        let kind = DocumentKind::from_mime(&self.mime_type).ok_or_else(|| {
            PortError::Unexpected(format!(
                "Document {} has unsupported type '{}'",
                self.id, self.mime_type
            ))
        })?;
        Ok(Document {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            size_bytes: self.size_bytes.max(0) as u64,
            kind,
            uploaded_at: self.uploaded_at,
        })
    }
}

/// Keeps the object key free of path separators and spaces.
fn object_path(user_id: Uuid, document_id: Uuid, name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}/{}-{}", user_id, document_id, safe)
}

#[async_trait]
impl DocumentStorage for ObjectStorageAdapter {
    async fn put_document(&self, user_id: Uuid, document: &NewDocument) -> PortResult<Document> {
        let id = Uuid::new_v4();
        let path = object_path(user_id, id, &document.name);

        let response = self
            .authorized(self.http.post(self.object_url(&path)))
            .header(header::CONTENT_TYPE, document.kind.mime_type())
            .body(document.content.clone())
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "Storage upload returned {}",
                response.status()
            )));
        }

        let inserted = sqlx::query_as::<_, DocumentRecord>(
            "INSERT INTO documents (id, user_id, name, mime_type, size_bytes, storage_path) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, user_id, name, mime_type, size_bytes, uploaded_at",
        )
        .bind(id)
        .bind(user_id)
        .bind(&document.name)
        .bind(document.kind.mime_type())
        .bind(document.content.len() as i64)
        .bind(&path)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(record) => {
                info!(%user_id, document_id = %id, bytes = document.content.len(), "Document stored");
                record.to_domain()
            }
            Err(e) => {
                if let Err(cleanup) = self.remove_object(&path).await {
                    warn!(%path, error = %cleanup, "Orphaned object left in storage");
                }
                Err(PortError::Unexpected(e.to_string()))
            }
        }
    }

    async fn list_documents(&self, user_id: Uuid) -> PortResult<Vec<Document>> {
        let records = sqlx::query_as::<_, DocumentRecord>(
            "SELECT id, user_id, name, mime_type, size_bytes, uploaded_at FROM documents \
             WHERE user_id = $1 ORDER BY uploaded_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        records.into_iter().map(DocumentRecord::to_domain).collect()
    }

    async fn delete_document(&self, user_id: Uuid, document_id: Uuid) -> PortResult<()> {
        let path: Option<(String,)> =
            sqlx::query_as("SELECT storage_path FROM documents WHERE id = $1 AND user_id = $2")
                .bind(document_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let (path,) = path.ok_or_else(|| PortError::NotFound(format!("Document {}", document_id)))?;

        self.remove_object(&path).await?;

        sqlx::query("DELETE FROM documents WHERE id = $1 AND user_id = $2")
            .bind(document_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        info!(%user_id, %document_id, "Document deleted");
        Ok(())
    }

    async fn read_document(&self, user_id: Uuid, document_id: Uuid) -> PortResult<Vec<u8>> {
        let path: Option<(String,)> =
            sqlx::query_as("SELECT storage_path FROM documents WHERE id = $1 AND user_id = $2")
                .bind(document_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let (path,) = path.ok_or_else(|| PortError::NotFound(format!("Document {}", document_id)))?;

        let response = self
            .authorized(self.http.get(self.object_url(&path)))
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        match response.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(PortError::NotFound(format!("Object for document {}", document_id)))
            }
            s => return Err(PortError::Unexpected(format!("Storage download returned {}", s))),
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_is_scoped_and_sanitized() {
        let user = Uuid::nil();
        let doc = Uuid::nil();
        let path = object_path(user, doc, "Q3 deck/final.pdf");
        assert!(path.starts_with(&format!("{}/{}-", user, doc)));
        assert!(path.ends_with("Q3_deck_final.pdf"));
    }
}
