//! Web server for filedrop.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

use crate::auth::JwtAuthenticator;
use crate::config::{Config, StorageBackend, StorageConfig, WebConfig};
use crate::storage::{FileSystemStore, MemoryStore, ObjectStore};
use crate::{FiledropError, Result};

use super::handlers::AppState;
use super::middleware::SharedAuthenticator;
use super::router::{create_health_router, create_router, create_static_router};

/// Open the store selected by the `[storage]` config section.
///
/// Returns `None` for the `none` backend.
pub fn open_store(config: &StorageConfig) -> Result<Option<Arc<dyn ObjectStore>>> {
    let min_part_size = config.min_part_size();
    let store: Option<Arc<dyn ObjectStore>> = match config.backend {
        StorageBackend::Filesystem => {
            let store = FileSystemStore::with_min_part_size(&config.path, min_part_size)?;
            tracing::info!("Object storage initialized at: {}", config.path);
            Some(Arc::new(store))
        }
        StorageBackend::Memory => {
            tracing::info!("Using in-memory object storage");
            Some(Arc::new(MemoryStore::with_min_part_size(min_part_size)))
        }
        StorageBackend::None => None,
    };
    Ok(store)
}

/// Web server for the API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// Login collaborator.
    authenticator: SharedAuthenticator,
    /// Web configuration.
    web_config: WebConfig,
    /// Storage configuration.
    storage_config: StorageConfig,
}

impl WebServer {
    /// Create a new web server, opening the configured store.
    pub fn new(config: &Config) -> Result<Self> {
        let store = open_store(&config.storage)?;
        Self::with_store(config, store)
    }

    /// Create a new web server over an existing store.
    pub fn with_store(config: &Config, store: Option<Arc<dyn ObjectStore>>) -> Result<Self> {
        let addr = format!("{}:{}", config.web.host, config.web.port)
            .parse()
            .map_err(|e| FiledropError::Config(format!("invalid web server address: {}", e)))?;

        let app_state = AppState::new(store, config.storage.max_upload_size());
        if !app_state.coordinator.is_configured() {
            tracing::warn!("No storage backend configured. Bucket API calls will fail.");
        }
        let authenticator: SharedAuthenticator =
            Arc::new(JwtAuthenticator::from_config(&config.web));

        Ok(Self {
            addr,
            app_state: Arc::new(app_state),
            authenticator,
            web_config: config.web.clone(),
            storage_config: config.storage.clone(),
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn build_router(self) -> Router {
        let mut router = create_router(
            self.app_state,
            self.authenticator,
            &self.web_config,
            &self.storage_config,
        )
        .merge(create_health_router());

        if self.web_config.serve_static {
            if let Some(static_router) = create_static_router(&self.web_config.static_path) {
                router = router.merge(static_router);
            }
        }

        router.layer(CompressionLayer::new())
    }

    /// Run the web server.
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.build_router();

        tracing::info!("Web server listening on http://{}", local_addr);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    }

    /// Run the server and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> std::result::Result<SocketAddr, std::io::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.build_router();

        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.web.host = "127.0.0.1".to_string();
        config.web.port = 0;
        config.web.jwt_secret = "test-secret-key".to_string();
        config.storage.backend = StorageBackend::Memory;
        config
    }

    #[test]
    fn test_open_store_backends() {
        let mut config = StorageConfig::default();

        config.backend = StorageBackend::Memory;
        assert!(open_store(&config).unwrap().is_some());

        config.backend = StorageBackend::None;
        assert!(open_store(&config).unwrap().is_none());

        let temp_dir = tempfile::TempDir::new().unwrap();
        config.backend = StorageBackend::Filesystem;
        config.path = temp_dir.path().join("bucket").to_string_lossy().to_string();
        assert!(open_store(&config).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_web_server_new() {
        let server = WebServer::new(&create_test_config()).unwrap();
        assert_eq!(server.addr().ip().to_string(), "127.0.0.1");
    }

    #[test]
    fn test_web_server_bad_address() {
        let mut config = create_test_config();
        config.web.host = "not an address".to_string();
        assert!(matches!(
            WebServer::new(&config),
            Err(FiledropError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_web_server_run() {
        let server = WebServer::new(&create_test_config()).unwrap();
        let addr = server.run_with_addr().await.unwrap();

        let client = reqwest::Client::new();
        let resp = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();

        assert!(resp.status().is_success());
        assert_eq!(resp.text().await.unwrap(), "OK");
    }
}
