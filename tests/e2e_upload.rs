//! End-to-end upload tests.
//!
//! Runs the real server on a loopback port and drives it through the
//! HTTP transport.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use filedrop::config::StorageBackend;
use filedrop::storage::{MemoryStore, ObjectStore};
use filedrop::upload::{
    HttpTransport, RetryPolicy, TransportError, UploadEvent, UploadOptions, UploadTransport,
    Uploader,
};
use filedrop::{Config, JwtAuthenticator, WebServer};
use tokio::sync::mpsc;

const SECRET: &str = "e2e-test-secret";
const MIB: usize = 1024 * 1024;

fn test_config() -> Config {
    let mut config = Config::default();
    config.web.host = "127.0.0.1".to_string();
    config.web.port = 0;
    config.web.jwt_secret = SECRET.to_string();
    config.web.api_rate_limit = 100_000;
    config.storage.backend = StorageBackend::Memory;
    config
}

fn test_options() -> UploadOptions {
    UploadOptions {
        chunk_size: (5 * MIB) as u64,
        retry: RetryPolicy::new(3, Duration::from_millis(10)),
        part_timeout: Duration::from_secs(10),
        abort_on_failure: false,
    }
}

/// Start a server over a fresh memory store.
async fn start_server() -> (HttpTransport, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let server = WebServer::with_store(&test_config(), Some(store.clone())).unwrap();
    let addr = server.run_with_addr().await.unwrap();

    let token = JwtAuthenticator::new(SECRET, 3600)
        .issue_token("e2e")
        .unwrap();
    let transport = HttpTransport::new(&format!("http://{}", addr), Some(token)).unwrap();
    (transport, store)
}

fn pattern(size: usize) -> Bytes {
    Bytes::from((0..size).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

#[tokio::test]
async fn test_e2e_multipart_upload() {
    let (transport, store) = start_server().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let uploader = Uploader::new(Arc::new(transport), test_options()).with_progress(tx);

    let data = pattern(12 * MIB);
    let object = uploader
        .upload(&data, "e2e/big file.bin", Some("application/x-test"))
        .await
        .unwrap();

    assert_eq!(object.key, "e2e/big file.bin");
    assert_eq!(object.size, (12 * MIB) as u64);

    let (info, stored) = store.get("e2e/big file.bin").await.unwrap();
    assert_eq!(stored, data);
    assert_eq!(info.content_type.as_deref(), Some("application/x-test"));
    assert_eq!(info.checksum, object.checksum);

    let mut last_percent = 0;
    while let Ok(event) = rx.try_recv() {
        if let UploadEvent::Progress { percent, .. } = event {
            last_percent = percent;
        }
    }
    assert_eq!(last_percent, 100);
}

#[tokio::test]
async fn test_e2e_single_shot_upload() {
    let (transport, store) = start_server().await;
    let uploader = Uploader::new(Arc::new(transport), test_options());

    let data = pattern(3 * MIB);
    let object = uploader
        .upload(&data, "e2e/small.bin", None)
        .await
        .unwrap();

    assert_eq!(object.size, (3 * MIB) as u64);
    let (_, stored) = store.get("e2e/small.bin").await.unwrap();
    assert_eq!(stored, data);
}

#[tokio::test]
async fn test_e2e_abort_then_upload_part() {
    let (transport, _store) = start_server().await;

    let session_id = transport.create("e2e/aborted.bin", None).await.unwrap();
    transport
        .upload_part("e2e/aborted.bin", &session_id, 1, pattern(5 * MIB))
        .await
        .unwrap();
    transport.abort("e2e/aborted.bin", &session_id).await.unwrap();

    let err = transport
        .upload_part("e2e/aborted.bin", &session_id, 2, pattern(1024))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(404));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_e2e_missing_token() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let server = WebServer::with_store(&test_config(), Some(store)).unwrap();
    let addr = server.run_with_addr().await.unwrap();

    let transport = HttpTransport::new(&format!("http://{}/", addr), None).unwrap();
    let err = transport.create("a.bin", None).await.unwrap_err();

    assert!(matches!(err, TransportError::Status { status: 401, .. }));
}
