//! Error types for filedrop.

use thiserror::Error;

use crate::auth::AuthError;
use crate::bucket::BucketError;
use crate::storage::StorageError;
use crate::upload::UploadError;

/// Common error type for filedrop.
#[derive(Error, Debug)]
pub enum FiledropError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Token issuing or verification error.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Object storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Bucket operation error.
    #[error(transparent)]
    Bucket(#[from] BucketError),

    /// Chunked upload failure.
    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),
}

/// Result type alias for filedrop operations.
pub type Result<T> = std::result::Result<T, FiledropError>;
