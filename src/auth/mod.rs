//! Authentication for filedrop.
//!
//! The web layer only asks one question of a request: who sent it, if
//! anyone. [`Authenticator`] answers it; [`JwtAuthenticator`] is the
//! implementation backed by HS256 session tokens.

mod jwt;

use axum::http::request::Parts;
use thiserror::Error;

pub use jwt::{JwtAuthenticator, JwtClaims, SESSION_COOKIE};

/// Errors raised while issuing or verifying tokens.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Token could not be signed or decoded.
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// Subject is empty.
    #[error("token subject must not be empty")]
    EmptySubject,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Subject the session was issued to.
    pub subject: String,
}

/// Login collaborator consulted before any bucket access.
pub trait Authenticator: Send + Sync {
    /// Identify the caller of a request.
    fn authenticate(&self, parts: &Parts) -> Option<Principal>;

    /// Whether the request carries a valid session.
    fn is_authenticated(&self, parts: &Parts) -> bool {
        self.authenticate(parts).is_some()
    }
}
