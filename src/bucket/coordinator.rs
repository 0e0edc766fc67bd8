//! Multipart session coordinator.

use std::sync::Arc;

use bytes::Bytes;

use super::{
    require_param, require_store, validate_key, BucketError, BucketResult, SharedStore,
    UploadSession,
};
use crate::storage::{ObjectInfo, ObjectMeta, ObjectStore, UploadedPart, MAX_PARTS};

/// Parse a part number as sent by the client.
///
/// Only plain integers in `1..=MAX_PARTS` are accepted.
pub fn parse_part_number(raw: &str) -> BucketResult<u32> {
    let raw = require_param("partNumber", raw)?;
    match raw.parse::<u32>() {
        Ok(n) if (1..=MAX_PARTS).contains(&n) => Ok(n),
        _ => Err(BucketError::InvalidInput(format!(
            "invalid partNumber '{}': expected an integer between 1 and {}",
            raw, MAX_PARTS
        ))),
    }
}

/// Drives the three-phase multipart protocol against the store.
///
/// The coordinator keeps no session state of its own; the store is the
/// only source of truth for which sessions exist.
#[derive(Clone)]
pub struct MultipartCoordinator {
    store: SharedStore,
}

impl MultipartCoordinator {
    /// Create a coordinator over an optional store.
    pub fn new(store: Option<Arc<dyn ObjectStore>>) -> Self {
        Self { store }
    }

    /// Whether a backend is configured.
    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    /// Start a new multipart session for `key`.
    pub async fn create(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> BucketResult<UploadSession> {
        let store = require_store(&self.store)?;
        validate_key(key)?;

        let content_type = content_type
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .map(str::to_string);
        let meta = ObjectMeta {
            content_type: content_type.clone(),
        };

        let session_id = store.create_multipart_upload(key, meta).await?;
        tracing::info!(key = %key, session_id = %session_id, "Multipart upload created");

        Ok(UploadSession {
            key: key.to_string(),
            session_id,
            content_type,
        })
    }

    /// Store one part. `part_number` is the raw client value.
    pub async fn upload_part(
        &self,
        session_id: &str,
        key: &str,
        part_number: &str,
        data: Bytes,
    ) -> BucketResult<UploadedPart> {
        let store = require_store(&self.store)?;
        let session_id = require_param("sessionId", session_id)?;
        validate_key(key)?;
        let part_number = parse_part_number(part_number)?;

        let size = data.len();
        let part = store.upload_part(key, session_id, part_number, data).await?;
        tracing::debug!(
            key = %key,
            session_id = %session_id,
            part_number,
            size,
            "Part stored"
        );

        Ok(part)
    }

    /// Finish a session with the full ordered part list.
    pub async fn complete(
        &self,
        session_id: &str,
        key: &str,
        parts: &[UploadedPart],
    ) -> BucketResult<ObjectInfo> {
        let store = require_store(&self.store)?;
        let session_id = require_param("sessionId", session_id)?;
        validate_key(key)?;
        if parts.is_empty() {
            return Err(BucketError::InvalidInput(
                "parts must list at least one part".to_string(),
            ));
        }

        match store.complete_multipart_upload(key, session_id, parts).await {
            Ok(info) => {
                tracing::info!(
                    key = %key,
                    session_id = %session_id,
                    parts = parts.len(),
                    size = info.size,
                    "Multipart upload completed"
                );
                Ok(info)
            }
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    session_id = %session_id,
                    error = %e,
                    "Multipart completion failed"
                );
                Err(e.into())
            }
        }
    }

    /// Abort a session, discarding its parts.
    pub async fn abort(&self, session_id: &str, key: &str) -> BucketResult<()> {
        let store = require_store(&self.store)?;
        let session_id = require_param("sessionId", session_id)?;
        validate_key(key)?;

        store.abort_multipart_upload(key, session_id).await?;
        tracing::info!(key = %key, session_id = %session_id, "Multipart upload aborted");
        Ok(())
    }
}
