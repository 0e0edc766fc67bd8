use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use filedrop::upload::{
    FileSource, HttpTransport, UploadError, UploadEvent, UploadOptions, UploadTransport, Uploader,
};
use filedrop::{Config, JwtAuthenticator, WebServer};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080/";

fn usage() {
    eprintln!("Usage:");
    eprintln!("  filedrop [config.toml]          run the web server");
    eprintln!("  filedrop token <subject>        print a session token");
    eprintln!("  filedrop upload <file> <key>    upload a file to FILEDROP_URL");
    eprintln!("  filedrop abort <key> <session>  abort an unfinished upload session");
}

fn load_config(path: &str) -> Config {
    match Config::load_with_env(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    }
}

fn init_logging(config: &Config) {
    if let Err(e) = filedrop::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        filedrop::logging::init_console_only(&config.logging.level);
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let code = match args.first().map(String::as_str) {
        Some("token") => match args.get(1) {
            Some(subject) => print_token(subject),
            None => {
                usage();
                2
            }
        },
        Some("upload") => match (args.get(1), args.get(2)) {
            (Some(file), Some(key)) => upload(file, key).await,
            _ => {
                usage();
                2
            }
        },
        Some("abort") => match (args.get(1), args.get(2)) {
            (Some(key), Some(session_id)) => abort(key, session_id).await,
            _ => {
                usage();
                2
            }
        },
        Some("-h") | Some("--help") => {
            usage();
            0
        }
        path => serve(path.unwrap_or(DEFAULT_CONFIG_PATH)).await,
    };

    std::process::exit(code);
}

async fn serve(config_path: &str) -> i32 {
    let config = load_config(config_path);
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        return 1;
    }

    init_logging(&config);

    info!("filedrop - chunked multipart uploads");
    info!(
        "Server configured on {}:{}",
        config.web.host, config.web.port
    );

    let server = match WebServer::new(&config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start web server: {e}");
            return 1;
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Web server error: {e}");
                return 1;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    0
}

fn print_token(subject: &str) -> i32 {
    let config = load_config(DEFAULT_CONFIG_PATH);
    if config.web.jwt_secret.is_empty() {
        eprintln!("jwt_secret is not set");
        return 1;
    }

    match JwtAuthenticator::from_config(&config.web).issue_token(subject) {
        Ok(token) => {
            println!("{token}");
            0
        }
        Err(e) => {
            eprintln!("Failed to issue token: {e}");
            1
        }
    }
}

/// Transport for `FILEDROP_URL`, authenticated with `FILEDROP_TOKEN`.
fn client_transport() -> Option<HttpTransport> {
    let base_url = std::env::var("FILEDROP_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.into());
    let token = std::env::var("FILEDROP_TOKEN")
        .ok()
        .filter(|t| !t.is_empty());
    if token.is_none() {
        warn!("FILEDROP_TOKEN is not set, the server will likely reject the request");
    }

    match HttpTransport::new(&base_url, token) {
        Ok(transport) => Some(transport),
        Err(e) => {
            error!("Invalid server URL {base_url}: {e}");
            None
        }
    }
}

async fn upload(file: &str, key: &str) -> i32 {
    let config = load_config(DEFAULT_CONFIG_PATH);
    filedrop::logging::init_console_only(&config.logging.level);

    let Some(transport) = client_transport() else {
        return 1;
    };
    let server = transport.base_url().to_string();

    let source = match FileSource::open(file).await {
        Ok(source) => source,
        Err(e) => {
            error!("Cannot read {file}: {e}");
            return 1;
        }
    };

    let content_type = mime_guess::from_path(Path::new(file))
        .first()
        .map(|m| m.essence_str().to_string());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let uploader = Uploader::new(Arc::new(transport), UploadOptions::from_config(&config.upload))
        .with_progress(tx)
        .with_cancellation(cancel.clone());
    let options = uploader.options().clone();
    info!(
        server = %server,
        chunk_size = options.chunk_size,
        "Uploading {file} as {key}"
    );

    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                UploadEvent::Started {
                    key, total_parts, size, ..
                } => info!(key = %key, total_parts, size, "Upload started"),
                UploadEvent::Progress {
                    part_number,
                    percent,
                    ..
                } => info!(part_number, "Uploaded {}%", percent),
                UploadEvent::Complete(object) => {
                    info!(key = %object.key, size = object.size, "Upload complete")
                }
            }
        }
    });

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling upload");
            interrupt.cancel();
        }
    });

    let result = uploader
        .upload(&source, key, content_type.as_deref())
        .await;
    drop(uploader);
    let _ = progress.await;

    match result {
        Ok(object) => {
            println!("{} {} {}", object.key, object.size, object.checksum);
            0
        }
        Err(e) => {
            error!("Upload failed: {e}");
            if let Some(session_id) = e.session_id() {
                let aborted =
                    matches!(e, UploadError::Cancelled { .. }) || options.abort_on_failure;
                if aborted {
                    eprintln!("session {session_id} aborted");
                } else {
                    eprintln!("session {session_id} left open on {server}");
                    eprintln!("run `filedrop abort {key} {session_id}` to discard it");
                }
            }
            1
        }
    }
}

async fn abort(key: &str, session_id: &str) -> i32 {
    let config = load_config(DEFAULT_CONFIG_PATH);
    filedrop::logging::init_console_only(&config.logging.level);

    let Some(transport) = client_transport() else {
        return 1;
    };

    match transport.abort(key, session_id).await {
        Ok(()) => {
            info!(key = %key, session_id = %session_id, "Upload session aborted");
            0
        }
        Err(e) => {
            error!("Abort failed: {e}");
            1
        }
    }
}
