//! Authentication middleware and extractors.

use axum::{
    async_trait,
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::auth::{Authenticator, Principal};
use crate::web::error::ApiError;

/// Authenticator shared through request extensions.
pub type SharedAuthenticator = Arc<dyn Authenticator>;

fn authenticator(parts: &Parts) -> Option<SharedAuthenticator> {
    parts.extensions.get::<SharedAuthenticator>().cloned()
}

/// Extractor for authenticated callers.
///
/// Handlers taking this extractor reject unauthenticated requests with
/// 401 before their body runs, so no bucket access happens.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let authenticator = authenticator(parts)
            .ok_or_else(|| ApiError::internal("Authenticator not configured"))?;

        authenticator
            .authenticate(parts)
            .map(AuthUser)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Optional authentication extractor.
///
/// Similar to AuthUser but doesn't fail if no valid session is present.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<Principal>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuthUser(
            authenticator(parts).and_then(|a| a.authenticate(parts)),
        ))
    }
}

/// Middleware function to inject the authenticator into request extensions.
pub async fn inject_authenticator(
    authenticator: SharedAuthenticator,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    request.extensions_mut().insert(authenticator);
    next.run(request).await
}
