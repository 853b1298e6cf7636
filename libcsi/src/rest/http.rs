//! The HTTP seam under [`Connection`](super::Connection).
//!
//! [`HttpSend`] performs exactly one request and hands back the raw status
//! and body; status interpretation, authentication and retry all happen in
//! the connection. [`ReqwestSender`] is the production implementation.

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use tracing::warn;

use super::RestError;
use crate::config::TransportConfig;

/// A single outgoing request.
#[derive(Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub bearer_token: Option<String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method, url: String) -> Self {
        Self {
            method,
            url,
            bearer_token: None,
            body: None,
        }
    }

    pub fn with_bearer(mut self, token: String) -> Self {
        self.bearer_token = Some(token);
        self
    }

    pub fn with_json(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status and body of a response, whatever the status.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one HTTP request.
#[async_trait]
pub trait HttpSend: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, RestError>;
}

/// [`HttpSend`] over a `reqwest` client.
///
/// Redirects are never followed, so a `3xx` reaches the connection as the
/// final response. Idle connections are not pooled, so nothing outlives the
/// request that opened it.
pub struct ReqwestSender {
    client: reqwest::Client,
}

impl ReqwestSender {
    pub fn new(config: &TransportConfig) -> Result<Self, RestError> {
        if !config.verify_tls {
            warn!("appliance TLS certificates are not verified");
        }
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(0);
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl HttpSend for ReqwestSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, RestError> {
        let mut builder = self.client.request(request.method, &request.url);
        if let Some(token) = request.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body {
            builder = builder.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}
