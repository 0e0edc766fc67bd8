//! Response DTOs for Web API.

use serde::Serialize;

use crate::bucket::UploadSession;
use crate::storage::{ObjectInfo, UploadedPart};

/// Multipart session created.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadResponse {
    /// Always `true`.
    pub success: bool,
    /// Destination key.
    pub key: String,
    /// Session id for the following calls.
    pub session_id: String,
}

impl From<UploadSession> for CreateUploadResponse {
    fn from(session: UploadSession) -> Self {
        Self {
            success: true,
            key: session.key,
            session_id: session.session_id,
        }
    }
}

/// Part stored.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPartResponse {
    /// Always `true`.
    pub success: bool,
    /// Stored part number.
    pub part_number: u32,
    /// Checksum to send back at completion.
    pub checksum: String,
}

impl From<UploadedPart> for UploadPartResponse {
    fn from(part: UploadedPart) -> Self {
        Self {
            success: true,
            part_number: part.part_number,
            checksum: part.checksum,
        }
    }
}

/// Object written (multipart completion, single-shot put, rename).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectWrittenResponse {
    /// Always `true`.
    pub success: bool,
    /// Object key.
    pub key: String,
    /// Object checksum.
    pub checksum: String,
    /// Object size in bytes.
    pub size: u64,
}

impl From<ObjectInfo> for ObjectWrittenResponse {
    fn from(info: ObjectInfo) -> Self {
        Self {
            success: true,
            key: info.key,
            checksum: info.checksum,
            size: info.size,
        }
    }
}

/// Plain acknowledgement.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Always `true`.
    pub success: bool,
    /// Human-readable message.
    pub message: String,
}

impl MessageResponse {
    /// Create a successful message response.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Object listing.
#[derive(Debug, Serialize)]
pub struct ObjectListResponse {
    /// Always `true`.
    pub success: bool,
    /// Objects sorted by key.
    pub objects: Vec<ObjectInfo>,
}

/// Session status.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// Whether the request carried a valid session.
    pub authenticated: bool,
    /// Session subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}
