//! In-memory object store.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use uuid::Uuid;

use super::{
    checksum, matches_prefix, multipart_checksum, validate_completion, ObjectInfo, ObjectMeta,
    ObjectStore, StorageError, StorageResult, StoredPart, UploadedPart, MIN_PART_SIZE,
};

#[derive(Debug, Clone)]
struct StoredObject {
    info: ObjectInfo,
    data: Bytes,
}

#[derive(Debug)]
struct Session {
    key: String,
    meta: ObjectMeta,
    parts: BTreeMap<u32, (StoredPart, Bytes)>,
}

/// Object store held in process memory.
///
/// Objects live in a `BTreeMap` so listing is ordered by key. No lock is
/// held across an `.await`.
#[derive(Debug)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    sessions: RwLock<HashMap<String, Session>>,
    min_part_size: u64,
}

impl MemoryStore {
    /// Create an empty store with the default 5 MiB part floor.
    pub fn new() -> Self {
        Self::with_min_part_size(MIN_PART_SIZE)
    }

    /// Create an empty store with a custom part floor.
    pub fn with_min_part_size(min_part_size: u64) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            sessions: RwLock::new(HashMap::new()),
            min_part_size,
        }
    }

    /// Number of sessions that are still open.
    pub fn open_sessions(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    fn poisoned() -> StorageError {
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "memory store lock poisoned",
        ))
    }

    fn insert_object(&self, info: ObjectInfo, data: Bytes) -> StorageResult<()> {
        let mut objects = self.objects.write().map_err(|_| Self::poisoned())?;
        objects.insert(info.key.clone(), StoredObject { info, data });
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, data: Bytes, meta: ObjectMeta) -> StorageResult<ObjectInfo> {
        let info = ObjectInfo {
            key: key.to_string(),
            size: data.len() as u64,
            checksum: checksum(&data),
            content_type: meta.content_type,
            last_modified: Utc::now(),
        };
        self.insert_object(info.clone(), data)?;
        Ok(info)
    }

    async fn get(&self, key: &str) -> StorageResult<(ObjectInfo, Bytes)> {
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;
        objects
            .get(key)
            .map(|o| (o.info.clone(), o.data.clone()))
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn head(&self, key: &str) -> StorageResult<Option<ObjectInfo>> {
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;
        Ok(objects.get(key).map(|o| o.info.clone()))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut objects = self.objects.write().map_err(|_| Self::poisoned())?;
        Ok(objects.remove(key).is_some())
    }

    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<ObjectInfo>> {
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;
        Ok(objects
            .values()
            .filter(|o| matches_prefix(&o.info.key, prefix))
            .map(|o| o.info.clone())
            .collect())
    }

    async fn create_multipart_upload(&self, key: &str, meta: ObjectMeta) -> StorageResult<String> {
        let upload_id = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().map_err(|_| Self::poisoned())?;
        sessions.insert(
            upload_id.clone(),
            Session {
                key: key.to_string(),
                meta,
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<UploadedPart> {
        let mut sessions = self.sessions.write().map_err(|_| Self::poisoned())?;
        let session = sessions
            .get_mut(upload_id)
            .filter(|s| s.key == key)
            .ok_or_else(|| StorageError::NoSuchUpload(upload_id.to_string()))?;

        let part = StoredPart {
            checksum: checksum(&data),
            size: data.len() as u64,
        };
        let uploaded = UploadedPart::new(part_number, part.checksum.clone());
        session.parts.insert(part_number, (part, data));
        Ok(uploaded)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> StorageResult<ObjectInfo> {
        let (meta, data, size) = {
            let mut sessions = self.sessions.write().map_err(|_| Self::poisoned())?;
            let session = sessions
                .get(upload_id)
                .filter(|s| s.key == key)
                .ok_or_else(|| StorageError::NoSuchUpload(upload_id.to_string()))?;

            let stored: BTreeMap<u32, StoredPart> = session
                .parts
                .iter()
                .map(|(n, (p, _))| (*n, p.clone()))
                .collect();
            let size = validate_completion(parts, &stored, self.min_part_size)?;

            let mut data = BytesMut::with_capacity(size as usize);
            for part in parts {
                if let Some((_, bytes)) = session.parts.get(&part.part_number) {
                    data.extend_from_slice(bytes);
                }
            }

            // Validated; the session ends here.
            let session = sessions
                .remove(upload_id)
                .ok_or_else(|| StorageError::NoSuchUpload(upload_id.to_string()))?;
            (session.meta, data.freeze(), size)
        };

        let info = ObjectInfo {
            key: key.to_string(),
            size,
            checksum: multipart_checksum(parts),
            content_type: meta.content_type,
            last_modified: Utc::now(),
        };
        self.insert_object(info.clone(), data)?;
        Ok(info)
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        let mut sessions = self.sessions.write().map_err(|_| Self::poisoned())?;
        match sessions.get(upload_id) {
            Some(session) if session.key == key => {
                sessions.remove(upload_id);
                Ok(())
            }
            _ => Err(StorageError::NoSuchUpload(upload_id.to_string())),
        }
    }
}
