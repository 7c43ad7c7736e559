//! SafawiNet HTTP client

pub mod audit;
pub mod auth;
pub mod dashboard;
pub mod error;
pub mod notifications;
pub mod profile;
mod refresh;
pub mod typed;

use crate::config::DEFAULT_USER_AGENT;
use crate::session::SessionStore;
use error::ClientError;
use reqwest::{Client, Method, RequestBuilder, Response, header};
use safawinet_core::types::ApiResponse;
use safawinet_core::ValidationErrors;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub use typed::{PublicClient, SafawiClient};

/// Connection shared by the public and session-backed clients
#[derive(Clone)]
pub(crate) struct HttpCore {
    client: Client,
    base_url: String,
}

impl HttpCore {
    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a request builder, with a bearer token when one is given
    pub(crate) fn request(&self, spec: &RequestSpec, token: Option<&str>) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, spec.path);
        let mut request = self.client.request(spec.method.clone(), url);
        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        request
    }

    /// Send a request and unwrap the response envelope
    pub(crate) async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<ApiResponse<T>, ClientError> {
        let response = request.send().await?;
        decode_envelope(response).await
    }
}

/// Everything needed to (re)build one API call. Kept separately from the
/// reqwest builder so a rejected call can be replayed with a new token.
#[derive(Debug, Clone)]
pub(crate) struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn query<K: Into<String>, V: Into<String>>(
        mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn json<B: serde::Serialize>(mut self, body: &B) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Credential exchanges are never refreshed and replayed
    pub fn allows_refresh(&self) -> bool {
        !self.path.starts_with("/api/auth/login")
            && !self.path.starts_with("/api/auth/verify-2fa")
            && !self.path.starts_with("/api/auth/refresh")
    }
}

/// Decode `{ success, message?, data? }`, mapping failures to [`ClientError`]
pub(crate) async fn decode_envelope<T: DeserializeOwned>(
    response: Response,
) -> Result<ApiResponse<T>, ClientError> {
    let status = response.status();
    let retry_after_header = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await?;

    if status.is_success() {
        if body.trim().is_empty() {
            return Ok(ApiResponse::empty());
        }
        let envelope: ApiResponse<T> = serde_json::from_str(&body)?;
        if envelope.success {
            return Ok(envelope);
        }
        return Err(rejection(envelope.message, envelope.errors));
    }

    let envelope = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body).ok();
    let (message, errors, retry_after_body) = match envelope {
        Some(envelope) => (envelope.message, envelope.errors, envelope.retry_after),
        None => (None, Vec::new(), None),
    };
    if status == reqwest::StatusCode::BAD_REQUEST && !errors.is_empty() {
        return Err(rejection(message, errors));
    }
    let message = message
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| status.to_string());
    let retry_after = retry_after_header
        .or(retry_after_body)
        .map(Duration::from_secs);
    Err(ClientError::from_status(status, message, retry_after))
}

fn rejection(
    message: Option<String>,
    errors: Vec<safawinet_core::types::FieldError>,
) -> ClientError {
    if errors.is_empty() {
        return ClientError::Rejected(message.unwrap_or_else(|| "Request failed".to_string()));
    }
    let mut validation = ValidationErrors::default();
    for error in errors {
        validation.push(error.field.as_deref().unwrap_or("form"), error.message);
    }
    ClientError::Validation(validation)
}

/// Builder for the SafawiNet clients
#[derive(Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    fn build_core(self) -> Result<HttpCore, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;
        url::Url::parse(&base_url)
            .map_err(|e| ClientError::Configuration(format!("invalid base_url: {e}")))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut builder = Client::builder()
            .user_agent(self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT));
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(HttpCore {
            client: builder.build()?,
            base_url,
        })
    }

    /// Build a client for unauthenticated endpoints
    pub fn build_public(self) -> Result<PublicClient, ClientError> {
        Ok(PublicClient::from_core(self.build_core()?))
    }

    /// Build a client bound to `session`
    pub fn build(self, session: SessionStore) -> Result<SafawiClient, ClientError> {
        Ok(SafawiClient::from_core(self.build_core()?, session))
    }
}
