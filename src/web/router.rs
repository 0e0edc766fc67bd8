//! Router configuration for Web API.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::handlers::{
    abort_upload, complete_upload, create_upload, delete_object, download_object, head_object,
    list_objects, put_object, rename_object, session, upload_part, AppState,
};
use super::middleware::{
    api_rate_limit, create_cors_layer, inject_authenticator, RateLimitState, SharedAuthenticator,
};
use crate::config::{StorageConfig, WebConfig};

fn body_limit(bytes: u64) -> DefaultBodyLimit {
    DefaultBodyLimit::max(usize::try_from(bytes).unwrap_or(usize::MAX))
}

/// Create the main API router.
pub fn create_router(
    app_state: Arc<AppState>,
    authenticator: SharedAuthenticator,
    web_config: &WebConfig,
    storage_config: &StorageConfig,
) -> Router {
    let multipart_routes = Router::new()
        .route("/create", post(create_upload))
        .route(
            "/upload-part",
            put(upload_part)
                .post(upload_part)
                .layer(body_limit(storage_config.max_part_size())),
        )
        .route("/complete", post(complete_upload))
        .route("/abort", delete(abort_upload));

    let object_routes = Router::new()
        .route("/objects", get(list_objects))
        .route("/objects/rename", post(rename_object))
        .route(
            "/objects/*key",
            get(download_object)
                .head(head_object)
                .delete(delete_object)
                .merge(put(put_object).layer(body_limit(storage_config.max_upload_size()))),
        );

    let rate_limit_state = Arc::new(RateLimitState::new(web_config.api_rate_limit));
    rate_limit_state.clone().start_cleanup_task();

    // API routes
    let api_routes = Router::new()
        .nest("/multipart", multipart_routes)
        .merge(object_routes)
        .route("/auth/session", get(session))
        .layer(middleware::from_fn(move |req, next| {
            let state = rate_limit_state.clone();
            api_rate_limit(state, req, next)
        }));

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(&web_config.cors_origins))
                .layer(middleware::from_fn(move |req, next| {
                    let authenticator = authenticator.clone();
                    inject_authenticator(authenticator, req, next)
                })),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}

/// Create a router serving a browser UI from `static_path`.
///
/// Unknown paths fall back to `index.html`. Returns `None` when the
/// directory does not exist.
pub fn create_static_router(static_path: &str) -> Option<Router> {
    let dir = Path::new(static_path);
    if !dir.is_dir() {
        tracing::warn!("Static path {} does not exist, not serving UI", static_path);
        return None;
    }

    let serve = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));
    Some(Router::new().fallback_service(serve))
}
