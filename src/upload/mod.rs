//! Chunked upload client.
//!
//! The [`ChunkedUploader`] splits a source into fixed-size parts and drives
//! the multipart protocol through an [`UploadTransport`]:
//!
//! 1. create a session
//! 2. upload every part in order, retrying transient failures
//! 3. complete the session with the ordered part list
//!
//! [`Uploader`] is the front door: it sends sources smaller than one chunk
//! as a single request and everything else through the chunked path.

mod http;
mod plan;
mod retry;
mod source;
mod transport;
mod uploader;

use thiserror::Error;

pub use http::HttpTransport;
pub use plan::{ChunkPlan, PartRange, PlanError};
pub use retry::{RetryError, RetryPolicy, DEFAULT_BACKOFF_BASE, DEFAULT_MAX_ATTEMPTS};
pub use source::{FileSource, PartSource};
pub use transport::{TransportError, UploadTransport, UploadedObject};
pub use uploader::{ChunkedUploader, UploadEvent, UploadOptions, Uploader};

/// Outcome of a failed upload.
///
/// Every variant raised after the session was created carries its id, so
/// the caller can abort or inspect a session left open.
#[derive(Error, Debug)]
pub enum UploadError {
    /// The source has no bytes.
    #[error("source is empty")]
    EmptySource,

    /// The source is smaller than one chunk; send it in a single request.
    #[error("source of {size} bytes is smaller than the chunk size {chunk_size}")]
    NotApplicable {
        /// Source size.
        size: u64,
        /// Configured chunk size.
        chunk_size: u64,
    },

    /// The chunk plan is invalid.
    #[error("invalid chunk plan: {0}")]
    Plan(PlanError),

    /// The session could not be created.
    #[error("failed to create upload session: {0}")]
    Create(TransportError),

    /// Reading a part from the source failed.
    #[error("failed to read part {part_number}: {source}")]
    Read {
        /// Session the part belongs to, if one was created.
        session_id: Option<String>,
        /// Part being read.
        part_number: u32,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The server rejected a part with a terminal error.
    #[error("part {part_number} rejected: {source}")]
    PartRejected {
        /// Session the part belongs to.
        session_id: String,
        /// Rejected part.
        part_number: u32,
        /// Server error.
        source: TransportError,
    },

    /// A part failed on every attempt.
    #[error("part {part_number} failed after {attempts} attempts: {source}")]
    PartFailed {
        /// Session the part belongs to.
        session_id: String,
        /// Failed part.
        part_number: u32,
        /// Attempts made.
        attempts: u32,
        /// Error of the last attempt.
        source: TransportError,
    },

    /// The session could not be completed.
    #[error("failed to complete upload: {source}")]
    Complete {
        /// Session being completed.
        session_id: String,
        /// Server error.
        source: TransportError,
    },

    /// A single-request upload failed.
    #[error("upload failed: {0}")]
    SingleShot(TransportError),

    /// The upload was cancelled.
    #[error("upload cancelled")]
    Cancelled {
        /// Session that was aborted, if one existed.
        session_id: Option<String>,
    },
}

impl UploadError {
    /// Id of the session this error left behind or aborted, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::PartRejected { session_id, .. }
            | Self::PartFailed { session_id, .. }
            | Self::Complete { session_id, .. } => Some(session_id),
            Self::Read { session_id, .. } | Self::Cancelled { session_id } => {
                session_id.as_deref()
            }
            _ => None,
        }
    }
}

impl From<PlanError> for UploadError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::EmptySource => Self::EmptySource,
            PlanError::SourceTooSmall { size, chunk_size } => {
                Self::NotApplicable { size, chunk_size }
            }
            other => Self::Plan(other),
        }
    }
}
