//! Filesystem object store.
//!
//! Objects are stored in a sharded directory structure keyed by the
//! SHA-256 of the object key. Each object has a JSON sidecar holding its
//! metadata and the name of the data file currently backing it:
//! ```text
//! {root}/
//! ├── objects/
//! │   └── ab/
//! │       ├── ab12...ef.{version}.data
//! │       └── ab12...ef.json
//! ├── uploads/
//! │   └── {session id}/
//! │       ├── session.json
//! │       ├── part-00001.data
//! │       └── part-00001.sum
//! └── tmp/
//! ```
//! Every write lands in a fresh versioned data file and becomes visible
//! only when the sidecar is renamed over the old one. A failed write
//! leaves the previous object untouched.
//!
//! Writers to one shard are serialized, as are calls on one session.
//! Completion takes the session lock before the object lock.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    checksum, matches_prefix, multipart_checksum, validate_completion, ObjectInfo, ObjectMeta,
    ObjectStore, StorageError, StorageResult, StoredPart, UploadedPart, MIN_PART_SIZE,
};

const OBJECTS_DIR: &str = "objects";
const UPLOADS_DIR: &str = "uploads";
const TMP_DIR: &str = "tmp";
const SESSION_FILE: &str = "session.json";

/// One lock per two-character shard.
const OBJECT_LOCKS: usize = 256;
const SESSION_LOCKS: usize = 64;

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    key: String,
    content_type: Option<String>,
}

/// Sidecar contents: public metadata plus the data file it points at.
#[derive(Debug, Serialize, Deserialize)]
struct ObjectRecord {
    #[serde(flatten)]
    info: ObjectInfo,
    data_file: String,
}

/// Where an object lives: its shard directory and stored name.
struct ObjectLocation {
    dir: PathBuf,
    name: String,
}

impl ObjectLocation {
    fn sidecar(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.name))
    }

    /// A fresh data file name, never shared with an earlier version.
    fn new_data_file(&self) -> String {
        format!("{}.{}.data", self.name, Uuid::new_v4().simple())
    }
}

fn lock_table(size: usize) -> Arc<[Mutex<()>]> {
    (0..size).map(|_| Mutex::new(())).collect()
}

/// Remove a file, ignoring errors. Used on cleanup paths.
async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

/// Object store on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    root: PathBuf,
    min_part_size: u64,
    object_locks: Arc<[Mutex<()>]>,
    session_locks: Arc<[Mutex<()>]>,
}

impl FileSystemStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        Self::with_min_part_size(root, MIN_PART_SIZE)
    }

    /// Open a store with a custom part floor.
    pub fn with_min_part_size(
        root: impl Into<PathBuf>,
        min_part_size: u64,
    ) -> StorageResult<Self> {
        let root = root.into();
        for dir in [OBJECTS_DIR, UPLOADS_DIR, TMP_DIR] {
            std::fs::create_dir_all(root.join(dir))?;
        }
        Self::clear_tmp(&root.join(TMP_DIR));

        Ok(Self {
            root,
            min_part_size,
            object_locks: lock_table(OBJECT_LOCKS),
            session_locks: lock_table(SESSION_LOCKS),
        })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drop temp files left by an interrupted process.
    fn clear_tmp(tmp: &Path) {
        let Ok(entries) = std::fs::read_dir(tmp) else {
            return;
        };
        for entry in entries.flatten() {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                tracing::warn!(path = %entry.path().display(), error = %e, "Stale temp file kept");
            }
        }
    }

    /// Stored name for a key: hex SHA-256, so any key maps to a safe file name.
    fn stored_name(key: &str) -> String {
        format!("{:x}", Sha256::digest(key.as_bytes()))
    }

    /// Shard directory for a stored name (first 2 characters).
    fn shard(stored_name: &str) -> &str {
        if stored_name.len() >= 2 {
            &stored_name[..2]
        } else {
            stored_name
        }
    }

    fn object_location(&self, key: &str) -> ObjectLocation {
        let name = Self::stored_name(key);
        let dir = self.root.join(OBJECTS_DIR).join(Self::shard(&name));
        ObjectLocation { dir, name }
    }

    fn object_lock(&self, location: &ObjectLocation) -> &Mutex<()> {
        let shard = usize::from_str_radix(Self::shard(&location.name), 16).unwrap_or(0);
        &self.object_locks[shard % self.object_locks.len()]
    }

    fn parse_upload_id(upload_id: &str) -> StorageResult<Uuid> {
        Uuid::parse_str(upload_id).map_err(|_| StorageError::NoSuchUpload(upload_id.to_string()))
    }

    fn session_lock(&self, id: &Uuid) -> &Mutex<()> {
        &self.session_locks[id.as_bytes()[0] as usize % self.session_locks.len()]
    }

    fn session_dir(&self, id: &Uuid) -> PathBuf {
        self.root.join(UPLOADS_DIR).join(id.to_string())
    }

    fn part_paths(session_dir: &Path, part_number: u32) -> (PathBuf, PathBuf) {
        (
            session_dir.join(format!("part-{part_number:05}.data")),
            session_dir.join(format!("part-{part_number:05}.sum")),
        )
    }

    fn tmp_path(&self) -> PathBuf {
        self.root.join(TMP_DIR).join(Uuid::new_v4().to_string())
    }

    /// Load the session record, checking it belongs to `key`.
    ///
    /// Callers hold the session lock.
    async fn load_session(
        &self,
        key: &str,
        upload_id: &str,
        id: &Uuid,
    ) -> StorageResult<(PathBuf, SessionRecord)> {
        let dir = self.session_dir(id);
        let raw = match fs::read(dir.join(SESSION_FILE)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NoSuchUpload(upload_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let record: SessionRecord = serde_json::from_slice(&raw)?;
        if record.key != key {
            return Err(StorageError::NoSuchUpload(upload_id.to_string()));
        }
        Ok((dir, record))
    }

    /// Read the recorded parts of a session directory.
    async fn stored_parts(dir: &Path) -> StorageResult<BTreeMap<u32, StoredPart>> {
        let mut parts = BTreeMap::new();
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(number) = name
                .to_str()
                .and_then(|n| n.strip_prefix("part-"))
                .and_then(|n| n.strip_suffix(".sum"))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };

            let (data_path, sum_path) = Self::part_paths(dir, number);
            let size = match fs::metadata(&data_path).await {
                Ok(m) => m.len(),
                // Interrupted part write
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let checksum = fs::read_to_string(&sum_path).await?;
            parts.insert(
                number,
                StoredPart {
                    checksum: checksum.trim().to_string(),
                    size,
                },
            );
        }

        Ok(parts)
    }

    /// Write bytes to a temp file, then rename into place.
    ///
    /// The target directory must already exist.
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let tmp = self.tmp_path();
        let result = async {
            fs::write(&tmp, data).await?;
            fs::rename(&tmp, path).await
        }
        .await;

        if result.is_err() {
            remove_quietly(&tmp).await;
        }
        Ok(result?)
    }

    /// Concatenate session parts into a new file at `path`.
    async fn assemble(
        &self,
        session: &Path,
        parts: &[UploadedPart],
        path: &Path,
    ) -> StorageResult<()> {
        let tmp = self.tmp_path();
        let result = async {
            let mut out = fs::File::create(&tmp).await?;
            for part in parts {
                let (data_path, _) = Self::part_paths(session, part.part_number);
                let mut input = fs::File::open(&data_path).await?;
                tokio::io::copy(&mut input, &mut out).await?;
            }
            out.flush().await?;
            drop(out);
            fs::rename(&tmp, path).await
        }
        .await;

        if result.is_err() {
            remove_quietly(&tmp).await;
        }
        Ok(result?)
    }

    async fn read_record(path: &Path) -> StorageResult<Option<ObjectRecord>> {
        match fs::read(path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Point the sidecar at `data_file`, then drop the data it replaced.
    ///
    /// The sidecar rename is the commit. On any failure before it the new
    /// data file is removed and the previous object stays visible.
    /// Callers hold the object lock.
    async fn commit(
        &self,
        location: &ObjectLocation,
        info: ObjectInfo,
        data_file: String,
    ) -> StorageResult<ObjectInfo> {
        let sidecar = location.sidecar();
        let data_path = location.dir.join(&data_file);

        let result = async {
            let previous = Self::read_record(&sidecar).await?;
            let record = ObjectRecord { info, data_file };
            self.write_atomic(&sidecar, &serde_json::to_vec_pretty(&record)?).await?;
            Ok::<_, StorageError>((record, previous))
        }
        .await;

        let (record, previous) = match result {
            Ok(committed) => committed,
            Err(e) => {
                remove_quietly(&data_path).await;
                return Err(e);
            }
        };

        if let Some(previous) = previous {
            if previous.data_file != record.data_file {
                remove_quietly(&location.dir.join(&previous.data_file)).await;
            }
        }
        Ok(record.info)
    }
}

#[async_trait]
impl ObjectStore for FileSystemStore {
    async fn put(&self, key: &str, data: Bytes, meta: ObjectMeta) -> StorageResult<ObjectInfo> {
        let location = self.object_location(key);
        let info = ObjectInfo {
            key: key.to_string(),
            size: data.len() as u64,
            checksum: checksum(&data),
            content_type: meta.content_type,
            last_modified: Utc::now(),
        };

        let _guard = self.object_lock(&location).lock().await;
        fs::create_dir_all(&location.dir).await?;
        let data_file = location.new_data_file();
        self.write_atomic(&location.dir.join(&data_file), &data).await?;
        self.commit(&location, info, data_file).await
    }

    async fn get(&self, key: &str) -> StorageResult<(ObjectInfo, Bytes)> {
        let location = self.object_location(key);
        let sidecar = location.sidecar();

        // A concurrent replace may drop the data file between the two reads.
        // The retry sees the new sidecar.
        for _ in 0..2 {
            let record = Self::read_record(&sidecar)
                .await?
                .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

            match fs::read(location.dir.join(&record.data_file)).await {
                Ok(data) => return Ok((record.info, Bytes::from(data))),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::NotFound(key.to_string()))
    }

    async fn head(&self, key: &str) -> StorageResult<Option<ObjectInfo>> {
        let sidecar = self.object_location(key).sidecar();
        Ok(Self::read_record(&sidecar).await?.map(|r| r.info))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let location = self.object_location(key);
        let sidecar = location.sidecar();

        let _guard = self.object_lock(&location).lock().await;
        let Some(record) = Self::read_record(&sidecar).await? else {
            return Ok(false);
        };
        fs::remove_file(&sidecar).await?;
        remove_quietly(&location.dir.join(&record.data_file)).await;

        // Prune the shard if that was its last object
        let _ = fs::remove_dir(&location.dir).await;
        Ok(true)
    }

    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<ObjectInfo>> {
        let mut result = Vec::new();
        let mut shards = fs::read_dir(self.root.join(OBJECTS_DIR)).await?;

        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = match fs::read_dir(shard.path()).await {
                Ok(entries) => entries,
                // Pruned by a concurrent delete
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(record) = Self::read_record(&path).await? {
                    if matches_prefix(&record.info.key, prefix) {
                        result.push(record.info);
                    }
                }
            }
        }

        result.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(result)
    }

    async fn create_multipart_upload(&self, key: &str, meta: ObjectMeta) -> StorageResult<String> {
        let id = Uuid::new_v4();
        let dir = self.session_dir(&id);
        fs::create_dir_all(&dir).await?;

        let record = SessionRecord {
            key: key.to_string(),
            content_type: meta.content_type,
        };
        fs::write(dir.join(SESSION_FILE), serde_json::to_vec(&record)?).await?;

        Ok(id.to_string())
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<UploadedPart> {
        let id = Self::parse_upload_id(upload_id)?;
        let _session = self.session_lock(&id).lock().await;
        let (dir, _) = self.load_session(key, upload_id, &id).await?;
        let (data_path, sum_path) = Self::part_paths(&dir, part_number);
        let part_checksum = checksum(&data);

        self.write_atomic(&data_path, &data).await?;
        fs::write(&sum_path, part_checksum.as_bytes()).await?;

        Ok(UploadedPart::new(part_number, part_checksum))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> StorageResult<ObjectInfo> {
        let id = Self::parse_upload_id(upload_id)?;
        let _session = self.session_lock(&id).lock().await;
        let (dir, record) = self.load_session(key, upload_id, &id).await?;
        let stored = Self::stored_parts(&dir).await?;
        let size = validate_completion(parts, &stored, self.min_part_size)?;

        let location = self.object_location(key);
        let info = {
            let _object = self.object_lock(&location).lock().await;
            fs::create_dir_all(&location.dir).await?;
            let data_file = location.new_data_file();
            self.assemble(&dir, parts, &location.dir.join(&data_file)).await?;

            let info = ObjectInfo {
                key: key.to_string(),
                size,
                checksum: multipart_checksum(parts),
                content_type: record.content_type,
                last_modified: Utc::now(),
            };
            self.commit(&location, info, data_file).await?
        };

        if let Err(e) = fs::remove_dir_all(&dir).await {
            tracing::warn!(
                upload_id = %upload_id,
                error = %e,
                "Failed to remove completed session"
            );
        }

        Ok(info)
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        let id = Self::parse_upload_id(upload_id)?;
        let _session = self.session_lock(&id).lock().await;
        let (dir, _) = self.load_session(key, upload_id, &id).await?;
        fs::remove_dir_all(&dir).await?;
        Ok(())
    }
}
