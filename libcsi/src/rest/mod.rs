//! REST transport for the appliance management API.
//!
//! [`Connection`] issues one authenticated call at a time against a single
//! appliance. A call that comes back `401 Unauthorized` is retried exactly
//! once after logging in again; every other non-2xx response is returned as
//! an [`ApplianceError`] without retry.
//!
//! The compound provisioning operations built on top of [`Connection`] live
//! in the submodules, one per area of the REST surface.

mod export;
mod files;
pub mod http;
mod quota;
mod version;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument};

pub use export::Export;
pub use files::{FileAttributes, FileType, join_path};
pub use http::{HttpRequest, HttpResponse, HttpSend, ReqwestSender};
pub use reqwest::Method;
pub use version::VersionInfo;

/// URI of the session login endpoint.
pub const LOGIN_URI: &str = "/v1/session/login";

/// An error reported by the appliance in a non-2xx response.
#[derive(Debug, Error, Clone, Default, PartialEq, Eq, Deserialize)]
#[error("{status_code} {description} {module} {error_class} {stack:?}")]
pub struct ApplianceError {
    /// HTTP status code of the response.
    #[serde(skip)]
    pub status_code: u16,
    /// Human readable description.
    #[serde(default, deserialize_with = "lenient")]
    pub description: String,
    /// Appliance module that raised the error.
    #[serde(default, deserialize_with = "lenient")]
    pub module: String,
    /// Machine readable classification, e.g. `fs_entry_exists_error`.
    #[serde(default, deserialize_with = "lenient")]
    pub error_class: String,
    /// Appliance-side stack trace.
    #[serde(default, deserialize_with = "lenient")]
    pub stack: Vec<String>,
    /// Whether the appliance considers the description fit for end users.
    #[serde(default, deserialize_with = "lenient")]
    pub user_visible: bool,
}

/// A field of the wrong type, or `null`, reads as its default instead of
/// discarding the rest of the error body.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

impl ApplianceError {
    /// Build an error from a failed response. Bodies that are not the
    /// appliance's JSON error document leave the descriptive fields empty.
    pub fn from_response(status_code: u16, body: &[u8]) -> Self {
        let mut err: Self = serde_json::from_slice(body).unwrap_or_default();
        err.status_code = status_code;
        err
    }

    /// Whether this error has the given status code and error class.
    pub fn is(&self, status_code: u16, error_class: &str) -> bool {
        self.status_code == status_code && self.error_class == error_class
    }
}

/// Failure of a REST call.
#[derive(Debug, Error)]
pub enum RestError {
    /// The appliance answered with a non-2xx status.
    #[error(transparent)]
    Appliance(#[from] ApplianceError),

    /// Logging in to the appliance failed.
    #[error("Login failed: {0}")]
    Auth(String),

    /// The request never produced a response.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The appliance reported a version string that cannot be interpreted.
    #[error("could not decode version: {0}")]
    Version(String),
}

impl RestError {
    /// Status code of the appliance response, if this is an appliance error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Appliance(e) => Some(e.status_code),
            _ => None,
        }
    }

    /// Whether this is an appliance error with the given status code.
    pub fn is_status(&self, status_code: u16) -> bool {
        self.status() == Some(status_code)
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    bearer_token: String,
}

/// Decode a JSON response body.
pub(crate) fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, RestError> {
    serde_json::from_slice(body).map_err(|e| RestError::Decode(e.to_string()))
}

/// Encode a JSON request body.
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, RestError> {
    serde_json::to_vec(value).map_err(|e| RestError::Decode(e.to_string()))
}

/// Query-escape a path or ID for use as a single URI segment.
pub(crate) fn escape(reference: &str) -> String {
    url::form_urlencoded::byte_serialize(reference.as_bytes()).collect()
}

/// A session with one appliance.
///
/// The bearer token lives only as long as the connection; nothing is shared
/// between connections.
pub struct Connection {
    host: String,
    port: u16,
    username: String,
    password: String,
    token: Option<String>,
    sender: Arc<dyn HttpSend>,
}

impl Connection {
    /// Create a connection. No request is made until the first call.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        sender: Arc<dyn HttpSend>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            token: None,
            sender,
        }
    }

    /// Appliance address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Appliance management port.
    pub fn port(&self) -> u16 {
        self.port
    }

    fn url(&self, uri: &str) -> String {
        format!("https://{}:{}{}", self.host, self.port, uri)
    }

    /// Log in and keep the returned bearer token for subsequent calls.
    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    pub async fn login(&mut self) -> Result<(), RestError> {
        let body = encode(&LoginRequest {
            username: &self.username,
            password: &self.password,
        })?;
        let request = HttpRequest::new(Method::POST, self.url(LOGIN_URI)).with_json(body);
        let response = self.sender.send(request).await?;
        if !response.is_success() {
            return Err(RestError::Auth(response.status.to_string()));
        }

        let login: LoginResponse = serde_json::from_slice(&response.body)
            .map_err(|e| RestError::Auth(format!("unreadable login response: {e}")))?;
        self.token = Some(login.bearer_token);
        info!("appliance session established");
        Ok(())
    }

    async fn call_once(
        &self,
        method: &Method,
        uri: &str,
        body: Option<&[u8]>,
    ) -> Result<Vec<u8>, RestError> {
        let mut request = HttpRequest::new(method.clone(), self.url(uri));
        if let Some(token) = &self.token {
            request = request.with_bearer(token.clone());
        }
        if let Some(body) = body {
            request = request.with_json(body.to_vec());
        }

        let response = self.sender.send(request).await?;
        if response.is_success() {
            Ok(response.body)
        } else {
            Err(ApplianceError::from_response(response.status, &response.body).into())
        }
    }

    /// Issue one call, logging in again and retrying once if the session
    /// has expired. A second `401` is returned to the caller.
    pub async fn call(
        &mut self,
        method: Method,
        uri: &str,
        body: Option<&[u8]>,
    ) -> Result<Vec<u8>, RestError> {
        debug!(host = %self.host, verb = %method, uri, "appliance request");
        match self.call_once(&method, uri, body).await {
            Err(RestError::Appliance(e)) if e.status_code == 401 => {
                info!(host = %self.host, "appliance session expired, logging in again");
                self.login().await?;
                self.call_once(&method, uri, body).await
            }
            other => other,
        }
    }

    /// `GET` a URI.
    pub async fn get(&mut self, uri: &str) -> Result<Vec<u8>, RestError> {
        self.call(Method::GET, uri, None).await
    }

    /// `POST` a JSON body to a URI.
    pub async fn post(&mut self, uri: &str, body: &[u8]) -> Result<Vec<u8>, RestError> {
        self.call(Method::POST, uri, Some(body)).await
    }

    /// `PUT` a JSON body to a URI.
    pub async fn put(&mut self, uri: &str, body: &[u8]) -> Result<Vec<u8>, RestError> {
        self.call(Method::PUT, uri, Some(body)).await
    }

    /// `PATCH` a JSON body to a URI.
    pub async fn patch(&mut self, uri: &str, body: &[u8]) -> Result<Vec<u8>, RestError> {
        self.call(Method::PATCH, uri, Some(body)).await
    }

    /// `DELETE` a URI.
    pub async fn delete(&mut self, uri: &str) -> Result<Vec<u8>, RestError> {
        self.call(Method::DELETE, uri, None).await
    }
}
