//! HTTP transport for the refresh endpoint.
//!
//! The manager only ever issues a GET with headers and reads back the status,
//! the response headers and the raw body. [`HttpTransport`] captures exactly
//! that, and [`ReqwestTransport`] is the production implementation.

use crate::error::{TokenError, TokenResult};
use crate::headers::Headers;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Response of a refresh call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// Raw response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a response with a JSON body.
    #[must_use]
    pub fn json_body(status: u16, body: &Value) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.to_string().into_bytes(),
        }
    }

    /// Add a response header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::MalformedResponse`] if the body is not JSON.
    pub fn json(&self) -> TokenResult<Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Issues GET requests to the refresh endpoint.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a GET to `url` with `headers`.
    async fn get(&self, url: &str, headers: &Headers) -> TokenResult<HttpResponse>;
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout (default: none, a refresh may take as long as it takes)
    pub timeout: Option<Duration>,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Duration,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("auth-oidc-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    /// Set a request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// [`HttpTransport`] backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Transport`] if the client cannot be built.
    pub fn new(config: &HttpConfig) -> TokenResult<Self> {
        let mut builder = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .use_rustls_tls();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Wrap an existing client.
    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &Headers) -> TokenResult<HttpResponse> {
        let response = self
            .client
            .get(url)
            .headers(to_header_map(headers)?)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = from_header_map(response.headers());
        let body = response.bytes().await?.to_vec();

        debug!(url, status, body_len = body.len(), "Refresh endpoint responded");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn to_header_map(headers: &Headers) -> TokenResult<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TokenError::transport(format!("Invalid header name `{name}`: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TokenError::transport(format!("Invalid value for `{name}`: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn from_header_map(map: &HeaderMap) -> Headers {
    map.iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
