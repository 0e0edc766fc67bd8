//! Middleware for Web API.

pub mod auth;
pub mod cors;
pub mod rate_limit;

pub use auth::{inject_authenticator, AuthUser, OptionalAuthUser, SharedAuthenticator};
pub use cors::create_cors_layer;
pub use rate_limit::{api_rate_limit, RateLimitState};
