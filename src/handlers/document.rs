use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{AppError, MessageBody, Result};
use crate::models::{CurrentUser, DocumentResponse};
use crate::services::DocumentService;
use crate::AppState;

use super::attachment_response;

/// Upload a document
/// POST /api/documents/upload (multipart field `document`)
pub async fn upload_document(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentResponse>)> {
    let mut temp_file_path: Option<PathBuf> = None;

    let result = match receive_document(&mut multipart, &mut temp_file_path).await {
        Ok((file_name, content_type, temp_path)) => {
            DocumentService::upload_document(
                &state.db,
                state.storage.as_ref(),
                &current_user.id,
                &file_name,
                content_type,
                &temp_path,
            )
            .await
        }
        Err(e) => Err(e),
    };

    // Cleanup temp file
    if let Some(temp_path) = &temp_file_path {
        if let Err(e) = tokio::fs::remove_file(temp_path).await {
            tracing::error!("Failed to remove temp file {:?}: {}", temp_path, e);
        }
    }

    let document = result?;
    Ok((StatusCode::CREATED, Json(DocumentResponse::from(document))))
}

/// Stream the `document` part to a temp file. `temp_file_path` is set as
/// soon as the file exists so the caller can clean up on any outcome.
async fn receive_document(
    multipart: &mut Multipart,
    temp_file_path: &mut Option<PathBuf>,
) -> Result<(String, Option<String>, PathBuf)> {
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Failed to process multipart", e))?
    {
        if field.name() != Some("document") || temp_file_path.is_some() {
            continue;
        }

        file_name = field.file_name().map(|s| s.to_string());
        content_type = field.content_type().map(|s| s.to_string());

        let temp_path = std::env::temp_dir().join(format!("docshare_upload_{}", Uuid::new_v4()));
        let mut file = tokio::fs::File::create(&temp_path).await.map_err(|e| {
            AppError::Internal(format!("Failed to create temp file: {}", e))
        })?;
        *temp_file_path = Some(temp_path);

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error("Failed to read file chunk", e))?
        {
            file.write_all(&chunk).await.map_err(|e| {
                AppError::Internal(format!("Failed to write to temp file: {}", e))
            })?;
        }

        file.flush().await.map_err(|e| {
            AppError::Internal(format!("Failed to flush temp file: {}", e))
        })?;
    }

    let temp_path = temp_file_path
        .clone()
        .ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;
    let file_name =
        file_name.ok_or_else(|| AppError::BadRequest("No file name provided".to_string()))?;

    Ok((file_name, content_type, temp_path))
}

/// Keeps the size-limit rejection as 413; anything else is a malformed upload
fn multipart_error(context: &str, e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!("{}: {}", context, e.body_text()))
    } else {
        AppError::BadRequest(format!("{}: {}", context, e.body_text()))
    }
}

/// List the caller's documents
/// GET /api/documents
pub async fn list_documents(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Vec<DocumentResponse>>> {
    let documents = DocumentService::list_documents(&state.db, &current_user.id).await?;
    Ok(Json(documents.into_iter().map(DocumentResponse::from).collect()))
}

/// Delete a document and its stored bytes
/// DELETE /api/documents/:id
pub async fn delete_document(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<MessageBody>> {
    DocumentService::delete_document(&state.db, state.storage.as_ref(), &current_user.id, &id)
        .await?;
    Ok(Json(MessageBody::new("Document deleted successfully")))
}

/// Owner download
/// GET /api/documents/download/:id
pub async fn download_document(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Response> {
    let document = DocumentService::get_owned_document(&state.db, &current_user.id, &id).await?;
    let data = DocumentService::read_content(state.storage.as_ref(), &document).await?;
    attachment_response(&document, data)
}
