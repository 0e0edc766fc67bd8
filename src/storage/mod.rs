//! Object storage for filedrop.
//!
//! This module provides the bucket backends behind the web API:
//! - Plain object operations (put, get, head, delete, list)
//! - Native multipart uploads (create, upload part, complete, abort)
//! - An in-memory store and a sharded filesystem store
//!
//! A multipart session lives only inside the store. Once completed or
//! aborted its id is forgotten and every further call fails with
//! [`StorageError::NoSuchUpload`].

mod filesystem;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use filesystem::FileSystemStore;
pub use memory::MemoryStore;

/// Smallest size of a non-final multipart part (5 MiB).
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Highest part number a session accepts.
pub const MAX_PARTS: u32 = 10_000;

/// Length of the hex checksum kept per part/object.
const CHECKSUM_LEN: usize = 32;

/// Errors raised by object stores.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The multipart session does not exist or already finished.
    #[error("multipart upload not found: {0}")]
    NoSuchUpload(String),

    /// A listed part was never stored or its checksum does not match.
    #[error("invalid part {part_number}: {reason}")]
    InvalidPart {
        /// Offending part number.
        part_number: u32,
        /// What was wrong with it.
        reason: String,
    },

    /// Part list is empty, has gaps, duplicates or is out of order.
    #[error("invalid part order: {0}")]
    InvalidPartOrder(String),

    /// A non-final part is smaller than the store's minimum.
    #[error("part {part_number} is too small ({size} bytes, minimum {min} bytes)")]
    EntityTooSmall {
        /// Offending part number.
        part_number: u32,
        /// Stored size of the part.
        size: u64,
        /// Minimum size for non-final parts.
        min: u64,
    },

    /// Argument rejected by the store.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error from the underlying medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt metadata on disk.
    #[error("corrupt metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Result type alias for store operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Metadata supplied when an object or session is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    /// MIME type recorded with the object.
    pub content_type: Option<String>,
}

impl ObjectMeta {
    /// Metadata with a content type.
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
        }
    }
}

/// Description of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Opaque checksum (etag) of the content.
    pub checksum: String,
    /// MIME type, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Time the object was written.
    pub last_modified: DateTime<Utc>,
}

/// A part confirmed by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPart {
    /// 1-based part number.
    pub part_number: u32,
    /// Checksum returned for the part, required verbatim at completion.
    pub checksum: String,
}

impl UploadedPart {
    /// Create a part entry.
    pub fn new(part_number: u32, checksum: impl Into<String>) -> Self {
        Self {
            part_number,
            checksum: checksum.into(),
        }
    }
}

/// A part as the store recorded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredPart {
    pub checksum: String,
    pub size: u64,
}

/// Key-value object store with native multipart uploads.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write a whole object in one request, replacing any previous value.
    async fn put(&self, key: &str, data: Bytes, meta: ObjectMeta) -> StorageResult<ObjectInfo>;

    /// Read an object.
    async fn get(&self, key: &str) -> StorageResult<(ObjectInfo, Bytes)>;

    /// Read an object's metadata.
    async fn head(&self, key: &str) -> StorageResult<Option<ObjectInfo>>;

    /// Delete an object. Returns `false` if it did not exist.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// List objects, optionally restricted to a key prefix, sorted by key.
    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<ObjectInfo>>;

    /// Start a multipart session and return its id.
    async fn create_multipart_upload(&self, key: &str, meta: ObjectMeta) -> StorageResult<String>;

    /// Store one part of a session. Re-uploading a part number replaces it.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<UploadedPart>;

    /// Assemble the listed parts into the object and end the session.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> StorageResult<ObjectInfo>;

    /// Drop a session and its stored parts.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()>;
}

/// Checksum of a single blob.
pub(crate) fn checksum(data: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(data));
    digest[..CHECKSUM_LEN].to_string()
}

/// Checksum of a multipart object: hash of the part checksums plus part count.
pub(crate) fn multipart_checksum(parts: &[UploadedPart]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.checksum.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-{}", &digest[..CHECKSUM_LEN], parts.len())
}

/// Check a completion request against the parts a session holds.
///
/// Part numbers must be exactly `1..=n` in order, every checksum must match
/// the stored one, and every part but the last must be at least
/// `min_part_size` bytes. Returns the total object size.
pub(crate) fn validate_completion(
    requested: &[UploadedPart],
    stored: &BTreeMap<u32, StoredPart>,
    min_part_size: u64,
) -> StorageResult<u64> {
    if requested.is_empty() {
        return Err(StorageError::InvalidPartOrder(
            "at least one part is required".to_string(),
        ));
    }

    let mut total = 0u64;
    let last_index = requested.len() - 1;

    for (index, part) in requested.iter().enumerate() {
        let expected = index as u32 + 1;
        if part.part_number != expected {
            return Err(StorageError::InvalidPartOrder(format!(
                "expected part {} at position {}, got part {}",
                expected, expected, part.part_number
            )));
        }

        let stored_part = stored
            .get(&part.part_number)
            .ok_or_else(|| StorageError::InvalidPart {
                part_number: part.part_number,
                reason: "part was not uploaded".to_string(),
            })?;

        if stored_part.checksum != part.checksum {
            return Err(StorageError::InvalidPart {
                part_number: part.part_number,
                reason: "checksum does not match".to_string(),
            });
        }

        if index < last_index && stored_part.size < min_part_size {
            return Err(StorageError::EntityTooSmall {
                part_number: part.part_number,
                size: stored_part.size,
                min: min_part_size,
            });
        }

        total += stored_part.size;
    }

    Ok(total)
}

/// Whether `key` falls under `prefix`.
pub(crate) fn matches_prefix(key: &str, prefix: Option<&str>) -> bool {
    prefix.map_or(true, |p| key.starts_with(p))
}
