//! Bucket operations for filedrop.
//!
//! This module sits between the web handlers and an [`ObjectStore`]:
//! - [`MultipartCoordinator`]: the create / upload-part / complete / abort
//!   protocol for chunked uploads
//! - [`ObjectService`]: list, download, single-shot put, delete and rename
//!
//! Both take an optional store. When no backend is configured every call
//! fails with [`BucketError::NotConfigured`].

mod coordinator;
pub mod key;
mod service;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::storage::{ObjectStore, StorageError};

pub use coordinator::{parse_part_number, MultipartCoordinator};
pub use key::{validate_key, MAX_KEY_LENGTH};
pub use service::ObjectService;

/// Errors raised by bucket operations.
#[derive(Error, Debug)]
pub enum BucketError {
    /// No storage backend is configured.
    #[error("storage backend not configured")]
    NotConfigured,

    /// Request parameters were rejected before reaching the backend.
    #[error("{0}")]
    InvalidInput(String),

    /// The operation would overwrite an existing object.
    #[error("{0}")]
    Conflict(String),

    /// Payload exceeds the configured limit.
    #[error("payload too large: {size} bytes (limit {limit} bytes)")]
    TooLarge {
        /// Size of the rejected payload.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Error from the storage backend.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type alias for bucket operations.
pub type BucketResult<T> = std::result::Result<T, BucketError>;

/// A multipart session as handed back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Destination object key.
    pub key: String,
    /// Backend-issued session id.
    pub session_id: String,
    /// Content type fixed at creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Shared handle to an optional store.
pub(crate) type SharedStore = Option<Arc<dyn ObjectStore>>;

fn require_store(store: &SharedStore) -> BucketResult<&dyn ObjectStore> {
    store.as_deref().ok_or(BucketError::NotConfigured)
}

/// Require a non-empty parameter, trimming surrounding whitespace.
fn require_param<'a>(name: &str, value: &'a str) -> BucketResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BucketError::InvalidInput(format!(
            "missing required parameter '{}'",
            name
        )));
    }
    Ok(value)
}
