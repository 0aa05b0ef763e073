pub mod document;
pub mod share;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;

use crate::error::{AppError, Result};
use crate::models::Document;

/// Binary response that makes the browser save `data` under the document's
/// original name
pub(crate) fn attachment_response(document: &Document, data: Bytes) -> Result<Response> {
    let fallback_name = document.original_name.replace(['"', '\\', '\r', '\n'], "_");
    let encoded_name = urlencoding::encode(&document.original_name);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, document.mime_type.as_str())
        .header(header::CONTENT_LENGTH, data.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"; filename*=UTF-8''{}",
                fallback_name, encoded_name
            ),
        )
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}
