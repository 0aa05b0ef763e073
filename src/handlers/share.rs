use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::WithRejection;

use crate::error::{AppError, ErrorBody, MessageBody, Result};
use crate::models::{AccessOutcome, AccessShareRequest, CreateShareRequest, CurrentUser, ShareCreated, ShareListItem};
use crate::services::ShareService;
use crate::AppState;

use super::attachment_response;

/// Create a new share
/// POST /api/shares
pub async fn create_share(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    WithRejection(Json(req), _): WithRejection<Json<CreateShareRequest>, AppError>,
) -> Result<(StatusCode, Json<ShareCreated>)> {
    let created = ShareService::create_share(
        &state.db,
        &state.config.share,
        &state.hasher,
        &current_user.id,
        req,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List the caller's shares
/// GET /api/shares
pub async fn list_shares(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Vec<ShareListItem>>> {
    let shares = ShareService::list_shares(&state.db, &state.config.share, &current_user.id).await?;
    Ok(Json(shares))
}

/// Delete a share
/// DELETE /api/shares/:share_id
pub async fn delete_share(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(share_id): Path<String>,
) -> Result<Json<MessageBody>> {
    ShareService::delete_share(&state.db, &current_user.id, &share_id).await?;
    Ok(Json(MessageBody::new("Share deleted successfully")))
}

/// Access a share, optionally with its password
/// POST /api/shares/access/:share_id
pub async fn access_share(
    State(state): State<AppState>,
    Path(share_id): Path<String>,
    body: std::result::Result<Json<AccessShareRequest>, JsonRejection>,
) -> Result<Response> {
    // A bare POST without a JSON body is an attempt without a password
    let req = match body {
        Ok(Json(req)) => req,
        Err(JsonRejection::MissingJsonContentType(_)) => AccessShareRequest::default(),
        Err(rejection) => return Err(rejection.into()),
    };
    let outcome = ShareService::access_share(&state.db, &state.hasher, &share_id, req.password).await?;

    let response = match outcome {
        AccessOutcome::Granted(granted) => Json(granted).into_response(),
        AccessOutcome::PasswordRequired => {
            (StatusCode::UNAUTHORIZED, Json(ErrorBody::password_required())).into_response()
        }
    };
    Ok(response)
}

/// Download one document of a share
/// GET /api/shares/download/:share_id/:document_id
pub async fn download_shared_document(
    State(state): State<AppState>,
    Path((share_id, document_id)): Path<(String, String)>,
) -> Result<Response> {
    let (document, data) =
        ShareService::download_document(&state.db, state.storage.as_ref(), &share_id, &document_id)
            .await?;
    attachment_response(&document, data)
}
