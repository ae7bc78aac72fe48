//! HTTP source for sealed out-of-band requests.

use async_trait::async_trait;
use connect_protocol::ConnectionRequest;
use reqwest::{
    Client,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde::{Deserialize, Serialize};

use crate::{AgentError, EncryptionKey, RequestSource, open_request};

/// Configuration for [`HttpRequestSource`]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSourceConfig {
    /// Optional timeout for requests in seconds (default: 30)
    pub timeout_seconds: Option<u64>,

    /// Custom headers sent with each request
    pub headers: Vec<(String, String)>,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: Some(30),
            headers: Vec::new(),
        }
    }
}

impl HttpSourceConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Fetches sealed requests with a plain GET of the request URI and opens
/// them with the key carried next to it.
#[derive(Clone)]
pub struct HttpRequestSource {
    client: Client,
}

impl HttpRequestSource {
    /// Create a source with the given configuration.
    ///
    /// Fails when a custom header is malformed or the HTTP client cannot
    /// be built.
    pub fn new(config: HttpSourceConfig) -> Result<Self, AgentError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| AgentError::Configuration(format!("header '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AgentError::Configuration(format!("header '{}': {}", key, e)))?;
            headers.append(name, value);
        }

        let mut client_builder = Client::builder().default_headers(headers);

        if let Some(timeout) = config.timeout_seconds {
            client_builder = client_builder.timeout(std::time::Duration::from_secs(timeout));
        }

        let client = client_builder
            .build()
            .map_err(|e| AgentError::Configuration(e.to_string()))?;

        Ok(Self { client })
    }

    async fn fetch(&self, request_uri: &str) -> Result<String, AgentError> {
        let unreachable = |reason: String| AgentError::Unreachable {
            location: request_uri.to_string(),
            reason,
        };

        let response = self
            .client
            .get(request_uri)
            .send()
            .await
            .map_err(|e| unreachable(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unreachable(format!(
                "HTTP {} - {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .text()
            .await
            .map_err(|e| unreachable(format!("Failed to read body: {}", e)))
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl RequestSource for HttpRequestSource {
    async fn decrypt_request(
        &self,
        request_uri: &str,
        encryption_key: &str,
    ) -> Result<ConnectionRequest, AgentError> {
        let key: EncryptionKey = encryption_key.parse()?;
        let sealed = self.fetch(request_uri).await?;
        tracing::debug!(request_uri, "Fetched sealed connection request");
        open_request(&sealed, &key)
    }
}
