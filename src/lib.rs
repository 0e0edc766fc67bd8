//! filedrop - chunked multipart uploads to object storage.
//!
//! The server side exposes an object API and a multipart session protocol
//! over HTTP. The client side splits large files into parts and drives the
//! protocol with retries and progress reporting.

pub mod auth;
pub mod bucket;
pub mod config;
pub mod error;
pub mod logging;
pub mod storage;
pub mod upload;
pub mod web;

pub use auth::{Authenticator, JwtAuthenticator, Principal};
pub use bucket::{MultipartCoordinator, ObjectService, UploadSession};
pub use config::Config;
pub use error::{FiledropError, Result};
pub use storage::{FileSystemStore, MemoryStore, ObjectInfo, ObjectStore, UploadedPart};
pub use upload::{
    ChunkPlan, ChunkedUploader, FileSource, HttpTransport, UploadError, UploadEvent,
    UploadOptions, Uploader,
};
pub use web::WebServer;
