//! Transport seam between the uploader and the server.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::UploadedPart;

/// Failure of a single request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// The request never got a response.
    #[error("network error: {0}")]
    Network(String),

    /// The request took longer than the per-request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The response could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Shorthand for a status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// HTTP status code, when there was one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether another attempt may succeed.
    ///
    /// 408, 429, any 5xx, network errors and timeouts are transient. Every
    /// other 4xx is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                matches!(*status, 408 | 429) || (500..600).contains(status)
            }
            Self::Network(_) | Self::Timeout(_) => true,
            Self::InvalidResponse(_) => false,
        }
    }
}

/// A finished object as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedObject {
    /// Object key.
    pub key: String,
    /// Object checksum.
    pub checksum: String,
    /// Object size in bytes.
    pub size: u64,
}

/// Requests the uploader needs from a server.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Start a multipart session, returning its id.
    async fn create(&self, key: &str, content_type: Option<&str>) -> Result<String, TransportError>;

    /// Send one part.
    async fn upload_part(
        &self,
        key: &str,
        session_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<UploadedPart, TransportError>;

    /// Finish a session with the ordered part list.
    async fn complete(
        &self,
        key: &str,
        session_id: &str,
        parts: &[UploadedPart],
    ) -> Result<UploadedObject, TransportError>;

    /// Abandon a session.
    async fn abort(&self, key: &str, session_id: &str) -> Result<(), TransportError>;

    /// Upload a whole object in one request.
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<UploadedObject, TransportError>;
}
