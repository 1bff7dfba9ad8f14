//! HTTP transport seam.
//!
//! [`ApiClient`](crate::ApiClient) talks to the network only through the
//! [`Transport`] trait, so the retry, breaker and cache logic can be driven by
//! a scripted transport in tests. [`HttpTransport`] is the `reqwest`
//! implementation used in production.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::version;
use crate::{HuginnError, Result};

/// Raw outcome of one HTTP exchange that produced a response.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A 200 response carrying `body` serialized as JSON.
    pub fn json(body: &Value) -> Self {
        Self::new(200, body.to_string())
    }
}

/// Failure to obtain any response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),
}

impl From<TransportError> for HuginnError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => HuginnError::Timeout,
            TransportError::Network(msg) => HuginnError::Network(msg),
        }
    }
}

/// One HTTP exchange with the remote API.
///
/// Implementations must not retry; the caller owns the retry policy.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` as JSON to `url`.
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> std::result::Result<TransportResponse, TransportError>;

    /// GET `url` (used by health checks).
    async fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport with bearer-token authentication.
#[derive(Clone)]
pub struct HttpTransport {
    api_key: Option<String>,
    http: Client,
}

impl HttpTransport {
    /// Create a transport. `api_key` is sent as `Authorization: Bearer <key>`.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(version::user_agent())
            .build()
            .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { api_key, http })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let response = request.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;
        Ok(TransportResponse { status, body })
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let request = self.authorize(self.http.post(url).json(body).timeout(timeout));
        Self::send(request).await
    }

    async fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let request = self.authorize(self.http.get(url).timeout(timeout));
        Self::send(request).await
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}
