//! Object handlers.

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::AppState;
use crate::storage::ObjectInfo;
use crate::web::dto::{
    ListObjectsQuery, MessageResponse, ObjectListResponse, ObjectWrittenResponse, RenameRequest,
    ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

/// Generate a safe Content-Disposition header value for file downloads.
///
/// The function:
/// - Removes control characters (including CR, LF which could cause header injection)
/// - Escapes double quotes and backslashes
/// - Uses RFC 5987 filename* parameter for proper Unicode support
fn content_disposition_header(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();

    if filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\') {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let encoded = urlencoding::encode(filename);
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    )
}

/// Last segment of a key, used as the download file name.
fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// IMF-fixdate, the HTTP date form (RFC 9110).
fn http_date(time: &DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Stored content type, else a guess from the key.
fn content_type_for(info: &ObjectInfo) -> String {
    info.content_type.clone().unwrap_or_else(|| {
        mime_guess::from_path(&info.key)
            .first_or_octet_stream()
            .to_string()
    })
}

fn object_response(info: &ObjectInfo, body: Body) -> Result<Response, ApiError> {
    Response::builder()
        .header(header::CONTENT_TYPE, content_type_for(info))
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(file_name(&info.key)),
        )
        .header(header::CONTENT_LENGTH, info.size)
        .header(header::ETAG, format!("\"{}\"", info.checksum))
        .header(header::LAST_MODIFIED, http_date(&info.last_modified))
        .body(body)
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })
}

/// GET /api/objects - List objects, optionally under `prefix`.
pub async fn list_objects(
    AuthUser(_principal): AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListObjectsQuery>,
) -> Result<Json<ObjectListResponse>, ApiError> {
    let objects = state.objects.list(query.prefix.as_deref()).await?;
    Ok(Json(ObjectListResponse {
        success: true,
        objects,
    }))
}

/// GET /api/objects/*key - Download an object.
pub async fn download_object(
    AuthUser(_principal): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let (info, data) = state.objects.download(&key).await?;
    object_response(&info, Body::from(data))
}

/// HEAD /api/objects/*key - Object headers without the body.
pub async fn head_object(
    AuthUser(_principal): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let info = state.objects.head(&key).await?;
    object_response(&info, Body::empty())
}

/// PUT /api/objects/*key - Upload an object in one request.
pub async fn put_object(
    AuthUser(_principal): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ObjectWrittenResponse>, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|ct| *ct != "application/octet-stream");

    let info = state.objects.put(&key, body, content_type).await?;
    Ok(Json(info.into()))
}

/// DELETE /api/objects/*key - Delete an object.
pub async fn delete_object(
    AuthUser(_principal): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.objects.delete(&key).await?;
    Ok(Json(MessageResponse::new("Object deleted")))
}

/// POST /api/objects/rename - Move an object to a new key.
pub async fn rename_object(
    AuthUser(_principal): AuthUser,
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<RenameRequest>,
) -> Result<Json<ObjectWrittenResponse>, ApiError> {
    let info = state
        .objects
        .rename(&req.from, &req.to, req.overwrite)
        .await?;
    Ok(Json(info.into()))
}
