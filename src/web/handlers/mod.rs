//! API handlers for the web API.

pub mod auth;
pub mod multipart;
pub mod objects;

use std::sync::Arc;

use crate::bucket::{MultipartCoordinator, ObjectService};
use crate::storage::ObjectStore;

pub use auth::*;
pub use multipart::*;
pub use objects::*;

/// Shared state of the API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Multipart protocol.
    pub coordinator: MultipartCoordinator,
    /// Plain object operations.
    pub objects: ObjectService,
}

impl AppState {
    /// Build the handler state over an optional store.
    pub fn new(store: Option<Arc<dyn ObjectStore>>, max_upload_size: u64) -> Self {
        Self {
            coordinator: MultipartCoordinator::new(store.clone()),
            objects: ObjectService::new(store, max_upload_size),
        }
    }
}
