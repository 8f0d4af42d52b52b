//! [`reqwest`]-backed [`HttpClient`].

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Version};

use crate::error::{Error, Result};

use super::{HttpClient, HttpMethod, HttpRequest, HttpResponse};

// ============================================================================
// Constants
// ============================================================================

/// Default whole-request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// ReqwestHttpClient
// ============================================================================

/// HTTP/1.1 client over a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    inner: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Creates a client with [`DEFAULT_HTTP_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// See [`ReqwestHttpClient::with_timeout`].
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// [`Error::Http`] if the TLS backend or resolver cannot be initialized.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { inner })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Post => Method::POST,
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .inner
            .request(to_reqwest_method(request.method), &request.url)
            .version(Version::HTTP_11);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| Error::http(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::http(e.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            body,
            headers,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
