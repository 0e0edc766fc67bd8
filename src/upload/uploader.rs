//! Upload drivers.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::{
    ChunkPlan, PartSource, RetryError, RetryPolicy, UploadError, UploadTransport, UploadedObject,
};
use crate::config::UploadConfig;
use crate::storage::{UploadedPart, MIN_PART_SIZE};

/// Default per-request timeout, kept under a 30 second proxy ceiling.
pub const DEFAULT_PART_TIMEOUT: Duration = Duration::from_secs(25);

/// Tuning for an upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Size of every part but the last.
    pub chunk_size: u64,
    /// Retry behaviour for each request.
    pub retry: RetryPolicy,
    /// Timeout for a single attempt.
    pub part_timeout: Duration,
    /// Abort the session when a part or the completion fails.
    pub abort_on_failure: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: MIN_PART_SIZE,
            retry: RetryPolicy::default(),
            part_timeout: DEFAULT_PART_TIMEOUT,
            abort_on_failure: false,
        }
    }
}

impl UploadOptions {
    /// Options from the `[upload]` config section.
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            chunk_size: config.chunk_size(),
            retry: RetryPolicy::new(config.max_attempts, config.backoff_base()),
            part_timeout: config.part_timeout(),
            abort_on_failure: config.abort_on_failure,
        }
    }
}

/// Progress notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    /// The upload started. `session_id` is `None` for single-request uploads.
    Started {
        /// Destination key.
        key: String,
        /// Multipart session id.
        session_id: Option<String>,
        /// Number of parts.
        total_parts: u32,
        /// Source size in bytes.
        size: u64,
    },
    /// A part was confirmed by the server.
    Progress {
        /// Confirmed part.
        part_number: u32,
        /// Parts confirmed so far.
        completed_parts: u32,
        /// Number of parts.
        total_parts: u32,
        /// `completed_parts * 100 / total_parts`.
        percent: u8,
    },
    /// The object is in place.
    Complete(UploadedObject),
}

/// Multipart upload driver.
///
/// Parts are sent one at a time in increasing part number.
pub struct ChunkedUploader {
    transport: Arc<dyn UploadTransport>,
    options: UploadOptions,
    progress: Option<UnboundedSender<UploadEvent>>,
    cancel: CancellationToken,
}

impl ChunkedUploader {
    /// Create an uploader over a transport.
    pub fn new(transport: Arc<dyn UploadTransport>, options: UploadOptions) -> Self {
        Self {
            transport,
            options,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Send progress events to `tx`.
    pub fn with_progress(mut self, tx: UnboundedSender<UploadEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Stop (and abort the session) when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Options in use.
    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(tx) = &self.progress {
            // Receiver may be gone; progress is best effort
            let _ = tx.send(event);
        }
    }

    /// Upload `source` to `key` through a multipart session.
    ///
    /// Fails with [`UploadError::NotApplicable`] when the source is smaller
    /// than one chunk.
    pub async fn upload(
        &self,
        source: &dyn PartSource,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<UploadedObject, UploadError> {
        let plan = ChunkPlan::new(source.size(), self.options.chunk_size)?;

        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled { session_id: None });
        }

        let session_id = self
            .transport
            .create(key, content_type)
            .await
            .map_err(UploadError::Create)?;

        tracing::info!(
            key = %key,
            session_id = %session_id,
            size = plan.size(),
            parts = plan.total_parts(),
            "Multipart upload started"
        );
        self.emit(UploadEvent::Started {
            key: key.to_string(),
            session_id: Some(session_id.clone()),
            total_parts: plan.total_parts(),
            size: plan.size(),
        });

        match self.run_session(source, key, &session_id, &plan).await {
            Ok(object) => {
                tracing::info!(key = %key, size = object.size, "Multipart upload finished");
                self.emit(UploadEvent::Complete(object.clone()));
                Ok(object)
            }
            Err(err) => {
                let cancelled = matches!(err, UploadError::Cancelled { .. });
                if cancelled || self.options.abort_on_failure {
                    self.abort_quietly(key, &session_id).await;
                } else {
                    tracing::warn!(
                        key = %key,
                        session_id = %session_id,
                        error = %err,
                        "Upload failed, session left open"
                    );
                }
                Err(err)
            }
        }
    }

    async fn run_session(
        &self,
        source: &dyn PartSource,
        key: &str,
        session_id: &str,
        plan: &ChunkPlan,
    ) -> Result<UploadedObject, UploadError> {
        let total = plan.total_parts();
        let mut parts: Vec<UploadedPart> = Vec::with_capacity(total as usize);

        for range in plan.parts() {
            if self.cancel.is_cancelled() {
                return Err(UploadError::Cancelled {
                    session_id: Some(session_id.to_string()),
                });
            }

            let data = source
                .read_range(range.offset, range.len)
                .await
                .map_err(|source| UploadError::Read {
                    session_id: Some(session_id.to_string()),
                    part_number: range.part_number,
                    source,
                })?;

            let part = self
                .send_part(key, session_id, range.part_number, data)
                .await?;
            parts.push(part);

            let completed = parts.len() as u32;
            self.emit(UploadEvent::Progress {
                part_number: range.part_number,
                completed_parts: completed,
                total_parts: total,
                percent: (u64::from(completed) * 100 / u64::from(total)) as u8,
            });
        }

        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled {
                session_id: Some(session_id.to_string()),
            });
        }

        self.transport
            .complete(key, session_id, &parts)
            .await
            .map_err(|source| UploadError::Complete {
                session_id: session_id.to_string(),
                source,
            })
    }

    async fn send_part(
        &self,
        key: &str,
        session_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<UploadedPart, UploadError> {
        let transport = &self.transport;
        let result = self
            .options
            .retry
            .run(self.options.part_timeout, &self.cancel, move |attempt| {
                tracing::debug!(key = %key, part_number, attempt, "Uploading part");
                transport.upload_part(key, session_id, part_number, data.clone())
            })
            .await;

        result.map_err(|err| match err {
            RetryError::Rejected { error, .. } => UploadError::PartRejected {
                session_id: session_id.to_string(),
                part_number,
                source: error,
            },
            RetryError::Exhausted { error, attempts } => UploadError::PartFailed {
                session_id: session_id.to_string(),
                part_number,
                attempts,
                source: error,
            },
            RetryError::Cancelled => UploadError::Cancelled {
                session_id: Some(session_id.to_string()),
            },
        })
    }

    async fn abort_quietly(&self, key: &str, session_id: &str) {
        match self.transport.abort(key, session_id).await {
            Ok(()) => {
                tracing::info!(key = %key, session_id = %session_id, "Upload session aborted")
            }
            Err(e) => {
                tracing::warn!(key = %key, session_id = %session_id, error = %e, "Abort failed")
            }
        }
    }
}

/// Routes a source to the single-request or the chunked path by size.
pub struct Uploader {
    chunked: ChunkedUploader,
}

impl Uploader {
    /// Create an uploader over a transport.
    pub fn new(transport: Arc<dyn UploadTransport>, options: UploadOptions) -> Self {
        Self {
            chunked: ChunkedUploader::new(transport, options),
        }
    }

    /// Options in effect.
    pub fn options(&self) -> &UploadOptions {
        self.chunked.options()
    }

    /// Send progress events to `tx`.
    pub fn with_progress(mut self, tx: UnboundedSender<UploadEvent>) -> Self {
        self.chunked = self.chunked.with_progress(tx);
        self
    }

    /// Stop when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.chunked = self.chunked.with_cancellation(token);
        self
    }

    /// Upload `source` to `key`.
    pub async fn upload(
        &self,
        source: &dyn PartSource,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<UploadedObject, UploadError> {
        let size = source.size();
        if size == 0 {
            return Err(UploadError::EmptySource);
        }
        if size >= self.chunked.options.chunk_size {
            return self.chunked.upload(source, key, content_type).await;
        }

        self.upload_single(source, key, content_type).await
    }

    async fn upload_single(
        &self,
        source: &dyn PartSource,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<UploadedObject, UploadError> {
        let chunked = &self.chunked;
        let size = source.size();
        let data = source.read_range(0, size).await.map_err(|source| UploadError::Read {
            session_id: None,
            part_number: 1,
            source,
        })?;

        tracing::info!(key = %key, size, "Single-request upload started");
        chunked.emit(UploadEvent::Started {
            key: key.to_string(),
            session_id: None,
            total_parts: 1,
            size,
        });

        let transport = &chunked.transport;
        let object = chunked
            .options
            .retry
            .run(chunked.options.part_timeout, &chunked.cancel, move |_| {
                transport.put_object(key, data.clone(), content_type)
            })
            .await
            .map_err(|err| match err {
                RetryError::Rejected { error, .. } | RetryError::Exhausted { error, .. } => {
                    UploadError::SingleShot(error)
                }
                RetryError::Cancelled => UploadError::Cancelled { session_id: None },
            })?;

        chunked.emit(UploadEvent::Progress {
            part_number: 1,
            completed_parts: 1,
            total_parts: 1,
            percent: 100,
        });
        chunked.emit(UploadEvent::Complete(object.clone()));
        Ok(object)
    }
}
