//! Plain object operations around the multipart core.

use std::sync::Arc;

use bytes::Bytes;

use super::{require_store, validate_key, BucketError, BucketResult, SharedStore};
use crate::storage::{ObjectInfo, ObjectMeta, ObjectStore, StorageError};

/// List, download, put, delete and rename objects.
#[derive(Clone)]
pub struct ObjectService {
    store: SharedStore,
    max_upload_size: u64,
}

impl ObjectService {
    /// Create a service. `max_upload_size` bounds single-shot puts.
    pub fn new(store: Option<Arc<dyn ObjectStore>>, max_upload_size: u64) -> Self {
        Self {
            store,
            max_upload_size,
        }
    }

    /// Largest body accepted by [`ObjectService::put`].
    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    /// List objects under an optional prefix, sorted by key.
    pub async fn list(&self, prefix: Option<&str>) -> BucketResult<Vec<ObjectInfo>> {
        let store = require_store(&self.store)?;
        let prefix = prefix.filter(|p| !p.is_empty());
        Ok(store.list(prefix).await?)
    }

    /// Metadata of an object.
    pub async fn head(&self, key: &str) -> BucketResult<ObjectInfo> {
        let store = require_store(&self.store)?;
        validate_key(key)?;
        store
            .head(key)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.to_string()).into())
    }

    /// Object metadata and content.
    pub async fn download(&self, key: &str) -> BucketResult<(ObjectInfo, Bytes)> {
        let store = require_store(&self.store)?;
        validate_key(key)?;
        Ok(store.get(key).await?)
    }

    /// Write an object in one request.
    pub async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> BucketResult<ObjectInfo> {
        let store = require_store(&self.store)?;
        validate_key(key)?;

        let size = data.len() as u64;
        if size > self.max_upload_size {
            return Err(BucketError::TooLarge {
                size,
                limit: self.max_upload_size,
            });
        }

        let meta = ObjectMeta {
            content_type: content_type
                .map(str::trim)
                .filter(|ct| !ct.is_empty())
                .map(str::to_string),
        };
        let info = store.put(key, data, meta).await?;
        tracing::info!(key = %key, size, "Object stored");
        Ok(info)
    }

    /// Delete an object. Missing keys are an error.
    pub async fn delete(&self, key: &str) -> BucketResult<()> {
        let store = require_store(&self.store)?;
        validate_key(key)?;

        if !store.delete(key).await? {
            return Err(StorageError::NotFound(key.to_string()).into());
        }
        tracing::info!(key = %key, "Object deleted");
        Ok(())
    }

    /// Move an object to a new key by copying it and deleting the source.
    pub async fn rename(&self, from: &str, to: &str, overwrite: bool) -> BucketResult<ObjectInfo> {
        let store = require_store(&self.store)?;
        validate_key(from)?;
        validate_key(to)?;
        if from == to {
            return Err(BucketError::InvalidInput(
                "source and destination are the same".to_string(),
            ));
        }

        let (source, data) = store.get(from).await?;
        if !overwrite && store.head(to).await?.is_some() {
            return Err(BucketError::Conflict(format!("object already exists: {}", to)));
        }

        let meta = ObjectMeta {
            content_type: source.content_type,
        };
        let info = store.put(to, data, meta).await?;
        store.delete(from).await?;

        tracing::info!(from = %from, to = %to, "Object renamed");
        Ok(info)
    }
}
