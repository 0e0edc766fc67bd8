//! Session handler.

use axum::Json;

use crate::web::dto::SessionResponse;
use crate::web::middleware::OptionalAuthUser;

/// GET /api/auth/session - Report whether the caller is logged in.
pub async fn session(OptionalAuthUser(principal): OptionalAuthUser) -> Json<SessionResponse> {
    Json(SessionResponse {
        authenticated: principal.is_some(),
        subject: principal.map(|p| p.subject),
    })
}
