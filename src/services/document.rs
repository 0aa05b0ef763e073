use bytes::Bytes;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use std::path::Path;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{format_timestamp, Document};
use crate::storage::StorageProvider;

/// Document store: owner-scoped metadata plus the backing bytes
pub struct DocumentService;

impl DocumentService {
    /// Store an uploaded temp file and record its metadata
    pub async fn upload_document(
        db: &Database,
        storage: &dyn StorageProvider,
        owner_id: &str,
        original_name: &str,
        content_type: Option<String>,
        temp_path: &Path,
    ) -> Result<Document> {
        let original_name = original_name.trim();
        if original_name.is_empty() {
            return Err(AppError::BadRequest("No file name provided".to_string()));
        }

        let size = tokio::fs::metadata(temp_path).await?.len() as i64;
        let mime_type = content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| {
                mime_guess::from_path(original_name)
                    .first_or_octet_stream()
                    .to_string()
            });

        let id = Uuid::new_v4().to_string();
        let stored_filename = Self::stored_filename(original_name);
        storage.put_file(&stored_filename, temp_path).await?;

        let now = format_timestamp(Utc::now());
        let result = sqlx::query(
            r#"
            INSERT INTO documents (id, owner_id, stored_filename, original_name, mime_type, size, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(owner_id)
        .bind(&stored_filename)
        .bind(original_name)
        .bind(&mime_type)
        .bind(size)
        .bind(&now)
        .execute(db.pool())
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = storage.delete(&stored_filename).await {
                tracing::error!("Failed to remove orphaned upload {}: {}", stored_filename, cleanup);
            }
            return Err(e.into());
        }

        tracing::info!(owner_id, document_id = %id, size, "Document uploaded");
        Self::get_document(db, &id).await
    }

    /// Unique on-disk name; keeps the extension for easier inspection
    fn stored_filename(original_name: &str) -> String {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        format!(
            "{}-{}{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            ext
        )
    }

    /// List an owner's documents, newest first
    pub async fn list_documents(db: &Database, owner_id: &str) -> Result<Vec<Document>> {
        let documents = sqlx::query_as(
            "SELECT * FROM documents WHERE owner_id = ? ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(db.pool())
        .await?;
        Ok(documents)
    }

    /// Get a document by ID regardless of owner
    pub async fn get_document(db: &Database, id: &str) -> Result<Document> {
        sqlx::query_as("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Document not found".to_string()))
    }

    /// Get a document only if it belongs to `owner_id`
    pub async fn get_owned_document(db: &Database, owner_id: &str, id: &str) -> Result<Document> {
        sqlx::query_as("SELECT * FROM documents WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Document not found".to_string()))
    }

    /// Documents among `ids` owned by `owner_id`; unknown or foreign ids are skipped
    pub async fn find_owned_documents(
        db: &Database,
        owner_id: &str,
        ids: &[String],
    ) -> Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM documents WHERE owner_id = ");
        query.push_bind(owner_id.to_string());
        query.push(" AND id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");

        let documents = query
            .build_query_as::<Document>()
            .fetch_all(db.pool())
            .await?;
        Ok(documents)
    }

    /// Read a document's bytes
    pub async fn read_content(storage: &dyn StorageProvider, document: &Document) -> Result<Bytes> {
        storage.get(&document.stored_filename).await
    }

    /// Delete metadata and backing bytes. Shares referencing the document
    /// are left alone.
    pub async fn delete_document(
        db: &Database,
        storage: &dyn StorageProvider,
        owner_id: &str,
        id: &str,
    ) -> Result<()> {
        let document = Self::get_owned_document(db, owner_id, id).await?;

        if let Err(e) = storage.delete(&document.stored_filename).await {
            tracing::error!("Failed to delete file {}: {}", document.stored_filename, e);
        }

        sqlx::query("DELETE FROM documents WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(db.pool())
            .await?;

        tracing::info!(owner_id, document_id = id, "Document deleted");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::storage::LocalStorage;

    /// Upload `content` as `name` through the regular upload path
    pub async fn seed_document(
        db: &Database,
        storage: &LocalStorage,
        owner_id: &str,
        name: &str,
        content: &[u8],
    ) -> Document {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), content).unwrap();
        DocumentService::upload_document(db, storage, owner_id, name, None, temp.path())
            .await
            .unwrap()
    }
}
