use serde::Serialize;
use sqlx::FromRow;

/// Uploaded document metadata
#[derive(Debug, Clone, FromRow)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    /// Generated name of the backing file inside the upload directory
    pub stored_filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub created_at: String,
}

/// Document as returned to clients; the storage name stays private
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: String,
    pub original_name: String,
    pub mimetype: String,
    pub size: i64,
    pub uploaded_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            original_name: doc.original_name,
            mimetype: doc.mime_type,
            size: doc.size,
            uploaded_at: doc.created_at,
        }
    }
}
