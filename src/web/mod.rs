//! Web API module for filedrop.
//!
//! This module exposes the multipart upload protocol and the object
//! operations over HTTP, behind JWT session authentication.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::{create_health_router, create_router};
pub use server::{open_store, WebServer};
