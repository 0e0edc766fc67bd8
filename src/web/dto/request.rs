//! Request DTOs for Web API.
//!
//! Multipart actions accept their parameters from the query string and
//! from the body (JSON or form) or, for upload-part, from headers. All
//! sources are merged into one [`MultipartParams`]; a parameter given
//! twice with different values is rejected.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Query, Request},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode, Uri},
    Form,
};
use serde::Deserialize;
use validator::Validate;

use crate::storage::UploadedPart;
use crate::web::error::ApiError;

/// Header carrying the object key on upload-part requests.
pub const UPLOAD_KEY_HEADER: &str = "x-upload-key";

/// Header carrying the session id on upload-part requests.
pub const UPLOAD_SESSION_HEADER: &str = "x-upload-session-id";

/// Parameters of a multipart action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartParams {
    /// Destination object key.
    pub key: Option<String>,
    /// Session id (`uploadId` is accepted as an alias).
    #[serde(alias = "uploadId")]
    pub session_id: Option<String>,
    /// Raw part number, validated by the coordinator.
    pub part_number: Option<String>,
    /// Content type for create.
    pub content_type: Option<String>,
    /// Ordered part list for complete.
    pub parts: Option<Vec<UploadedPart>>,
}

fn merge_field<T: PartialEq>(
    name: &str,
    a: Option<T>,
    b: Option<T>,
) -> Result<Option<T>, ApiError> {
    match (a, b) {
        (Some(a), Some(b)) if a != b => Err(ApiError::bad_request(format!(
            "conflicting values for '{}'",
            name
        ))),
        (Some(a), _) => Ok(Some(a)),
        (None, b) => Ok(b),
    }
}

fn missing(name: &str) -> ApiError {
    ApiError::bad_request(format!("missing required parameter '{}'", name))
}

impl MultipartParams {
    /// Merge two parameter sources.
    pub fn merge(self, other: MultipartParams) -> Result<Self, ApiError> {
        Ok(Self {
            key: merge_field("key", self.key, other.key)?,
            session_id: merge_field("sessionId", self.session_id, other.session_id)?,
            part_number: merge_field("partNumber", self.part_number, other.part_number)?,
            content_type: merge_field("contentType", self.content_type, other.content_type)?,
            parts: merge_field("parts", self.parts, other.parts)?,
        })
    }

    /// Parameters from a URI query string.
    pub fn from_uri(uri: &Uri) -> Result<Self, ApiError> {
        if uri.query().map_or(true, str::is_empty) {
            return Ok(Self::default());
        }
        Query::<Self>::try_from_uri(uri)
            .map(|Query(params)| params)
            .map_err(|e| ApiError::bad_request(format!("Invalid query string: {}", e)))
    }

    /// Parameters from the upload headers. Header values are percent-decoded.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let header = |name: &str| -> Result<Option<String>, ApiError> {
            let Some(value) = headers.get(name) else {
                return Ok(None);
            };
            let value = value
                .to_str()
                .map_err(|_| ApiError::bad_request(format!("Invalid header '{}'", name)))?;
            urlencoding::decode(value)
                .map(|v| Some(v.into_owned()))
                .map_err(|_| ApiError::bad_request(format!("Invalid header '{}'", name)))
        };

        Ok(Self {
            key: header(UPLOAD_KEY_HEADER)?,
            session_id: header(UPLOAD_SESSION_HEADER)?,
            ..Self::default()
        })
    }

    /// The object key, or 400.
    pub fn key(&self) -> Result<&str, ApiError> {
        self.key.as_deref().ok_or_else(|| missing("key"))
    }

    /// The session id, or 400.
    pub fn session_id(&self) -> Result<&str, ApiError> {
        self.session_id.as_deref().ok_or_else(|| missing("sessionId"))
    }

    /// The raw part number, or 400.
    pub fn part_number(&self) -> Result<&str, ApiError> {
        self.part_number.as_deref().ok_or_else(|| missing("partNumber"))
    }

    /// The part list, or 400.
    pub fn parts(&self) -> Result<&[UploadedPart], ApiError> {
        self.parts.as_deref().ok_or_else(|| missing("parts"))
    }
}

/// Query plus JSON or form body, merged.
#[derive(Debug)]
pub struct NormalizedParams(pub MultipartParams);

#[async_trait]
impl<S> FromRequest<S> for NormalizedParams
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let query = MultipartParams::from_uri(req.uri())?;

        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        let body = if is_form {
            let Form(params) = Form::<MultipartParams>::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(format!("Invalid form body: {}", e)))?;
            params
        } else {
            let bytes = Bytes::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(format!("Invalid body: {}", e)))?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                MultipartParams::default()
            } else {
                serde_json::from_slice(&bytes)
                    .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e)))?
            }
        };

        Ok(NormalizedParams(query.merge(body)?))
    }
}

/// Upload-part request: parameters from query and headers, raw body.
#[derive(Debug)]
pub struct PartUpload {
    /// Merged parameters.
    pub params: MultipartParams,
    /// Part bytes.
    pub data: Bytes,
}

#[async_trait]
impl<S> FromRequest<S> for PartUpload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let params = MultipartParams::from_uri(req.uri())?
            .merge(MultipartParams::from_headers(req.headers())?)?;

        let data = Bytes::from_request(req, state).await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ApiError::payload_too_large(e.body_text())
            } else {
                ApiError::bad_request(format!("Invalid body: {}", e))
            }
        })?;

        Ok(PartUpload { params, data })
    }
}

/// Object listing query.
#[derive(Debug, Default, Deserialize)]
pub struct ListObjectsQuery {
    /// Key prefix filter.
    pub prefix: Option<String>,
}

/// Rename request.
#[derive(Debug, Deserialize, Validate)]
pub struct RenameRequest {
    /// Current key.
    #[validate(length(min = 1, max = 1024, message = "Source key must be 1-1024 characters"))]
    pub from: String,
    /// New key.
    #[validate(length(min = 1, max = 1024, message = "Destination key must be 1-1024 characters"))]
    pub to: String,
    /// Replace an existing destination.
    #[serde(default)]
    pub overwrite: bool,
}
