//! Multipart upload handlers.

use axum::{extract::State, Json};
use std::sync::Arc;

use super::AppState;
use crate::web::dto::{
    CreateUploadResponse, MessageResponse, NormalizedParams, ObjectWrittenResponse, PartUpload,
    UploadPartResponse,
};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

/// POST /api/multipart/create - Start a multipart upload.
pub async fn create_upload(
    AuthUser(principal): AuthUser,
    State(state): State<Arc<AppState>>,
    NormalizedParams(params): NormalizedParams,
) -> Result<Json<CreateUploadResponse>, ApiError> {
    let key = params.key()?;
    let session = state
        .coordinator
        .create(key, params.content_type.as_deref())
        .await?;

    tracing::debug!(subject = %principal.subject, key = %key, "Create multipart upload");
    Ok(Json(session.into()))
}

/// PUT|POST /api/multipart/upload-part - Store one part.
///
/// The body is the raw part; `key`, `sessionId` and `partNumber` come from
/// the query string or the `X-Upload-*` headers.
pub async fn upload_part(
    AuthUser(_principal): AuthUser,
    State(state): State<Arc<AppState>>,
    PartUpload { params, data }: PartUpload,
) -> Result<Json<UploadPartResponse>, ApiError> {
    let part = state
        .coordinator
        .upload_part(params.session_id()?, params.key()?, params.part_number()?, data)
        .await?;

    Ok(Json(part.into()))
}

/// POST /api/multipart/complete - Assemble the uploaded parts.
pub async fn complete_upload(
    AuthUser(_principal): AuthUser,
    State(state): State<Arc<AppState>>,
    NormalizedParams(params): NormalizedParams,
) -> Result<Json<ObjectWrittenResponse>, ApiError> {
    let info = state
        .coordinator
        .complete(params.session_id()?, params.key()?, params.parts()?)
        .await?;

    Ok(Json(info.into()))
}

/// DELETE /api/multipart/abort - Discard a multipart upload.
pub async fn abort_upload(
    AuthUser(_principal): AuthUser,
    State(state): State<Arc<AppState>>,
    NormalizedParams(params): NormalizedParams,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .coordinator
        .abort(params.session_id()?, params.key()?)
        .await?;

    Ok(Json(MessageResponse::new("Multipart upload aborted")))
}
