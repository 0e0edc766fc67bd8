//! HTTP transport speaking the filedrop multipart API.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{TransportError, UploadTransport, UploadedObject};
use crate::storage::UploadedPart;
use crate::web::dto::{UPLOAD_KEY_HEADER, UPLOAD_SESSION_HEADER};
use crate::{FiledropError, Result};

const CREATE_ROUTE: &str = "api/multipart/create";
const UPLOAD_PART_ROUTE: &str = "api/multipart/upload-part";
const COMPLETE_ROUTE: &str = "api/multipart/complete";
const ABORT_ROUTE: &str = "api/multipart/abort";
const OBJECTS_ROUTE: &str = "api/objects/";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody<'a> {
    key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateReply {
    session_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteBody<'a> {
    key: &'a str,
    session_id: &'a str,
    parts: &'a [UploadedPart],
}

#[derive(Deserialize)]
struct ErrorReply {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// [`UploadTransport`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpTransport {
    /// Create a transport for the server at `base_url`.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("filedrop/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FiledropError::Config(format!("failed to build HTTP client: {}", e)))?;
        Self::with_client(client, base_url, token)
    }

    /// Create a transport with a preconfigured client.
    pub fn with_client(client: Client, base_url: &str, token: Option<String>) -> Result<Self> {
        let mut base_url = Url::parse(base_url).map_err(|e| {
            FiledropError::Config(format!("invalid server URL '{}': {}", base_url, e))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Server base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, route: &str) -> std::result::Result<Url, TransportError> {
        self.base_url
            .join(route)
            .map_err(|e| TransportError::InvalidResponse(format!("bad URL for {}: {}", route, e)))
    }

    /// URL of an object, with every key segment percent-encoded.
    fn object_url(&self, key: &str) -> std::result::Result<Url, TransportError> {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        self.url(&format!("{}{}", OBJECTS_ROUTE, encoded.join("/")))
    }

    /// Part upload request. Key and session travel in headers so long keys
    /// stay out of the URL.
    fn part_request(
        &self,
        key: &str,
        session_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> std::result::Result<RequestBuilder, TransportError> {
        Ok(self
            .client
            .put(self.url(UPLOAD_PART_ROUTE)?)
            .query(&[("partNumber", part_number)])
            .header(UPLOAD_KEY_HEADER, urlencoding::encode(key).as_ref())
            .header(UPLOAD_SESSION_HEADER, urlencoding::encode(session_id).as_ref())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, TransportError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorReply>(&body)
            .map(|reply| reply.error.message)
            .unwrap_or_else(|_| {
                if body.is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    body
                }
            });

        Err(TransportError::status(status.as_u16(), message))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, TransportError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn create(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> std::result::Result<String, TransportError> {
        let request = self
            .client
            .post(self.url(CREATE_ROUTE)?)
            .json(&CreateBody { key, content_type });

        let reply: CreateReply = self.send_json(request).await?;
        Ok(reply.session_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        session_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> std::result::Result<UploadedPart, TransportError> {
        let request = self.part_request(key, session_id, part_number, data)?;
        self.send_json(request).await
    }

    async fn complete(
        &self,
        key: &str,
        session_id: &str,
        parts: &[UploadedPart],
    ) -> std::result::Result<UploadedObject, TransportError> {
        let request = self.client.post(self.url(COMPLETE_ROUTE)?).json(&CompleteBody {
            key,
            session_id,
            parts,
        });

        self.send_json(request).await
    }

    async fn abort(&self, key: &str, session_id: &str) -> std::result::Result<(), TransportError> {
        let request = self
            .client
            .delete(self.url(ABORT_ROUTE)?)
            .query(&[("key", key), ("sessionId", session_id)]);

        self.send(request).await?;
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> std::result::Result<UploadedObject, TransportError> {
        let request = self
            .client
            .put(self.object_url(key)?)
            .header(
                CONTENT_TYPE,
                content_type.unwrap_or("application/octet-stream"),
            )
            .body(data);

        self.send_json(request).await
    }
}
