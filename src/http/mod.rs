//! Plain request/response HTTP shim.
//!
//! Negotiation and the event-stream send path issue ordinary HTTP requests
//! through an [`HttpClient`]. Clients are composed as decorators:
//!
//! ```text
//! LoggingHttpClient ─► AccessTokenHttpClient ─► ReqwestHttpClient
//!   (trace/warn)         (Bearer + headers)       (wire)
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `handlers` | Access-token and logging decorators |
//! | `reqwest_client` | [`ReqwestHttpClient`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// Request decorators.
pub mod handlers;

/// reqwest-backed client.
pub mod reqwest_client;

// ============================================================================
// Re-exports
// ============================================================================

pub use handlers::{AccessTokenHttpClient, AccessTokenProvider, AccessTokenSource, LoggingHttpClient};
pub use reqwest_client::{DEFAULT_HTTP_TIMEOUT, ReqwestHttpClient};

// ============================================================================
// HttpMethod
// ============================================================================

/// Methods the shim issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `POST`.
    Post,
}

impl HttpMethod {
    /// Upper-case method name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// HttpRequest
// ============================================================================

/// An outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: HttpMethod,
    /// Absolute target URL.
    pub url: String,
    /// Header pairs, in insertion order.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a request with no headers and an empty body.
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Creates a `POST` request.
    #[inline]
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a header, replacing any existing value (case-insensitive name).
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Sets a header in place, replacing any existing value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    /// Looks up a header (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// ============================================================================
// HttpResponse
// ============================================================================

/// A fully buffered response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
    /// Response headers (lower-case names).
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    /// Creates a response with the given status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: Vec::new(),
        }
    }

    /// Returns `true` for a 2xx status.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ============================================================================
// HttpClient
// ============================================================================

/// Minimal async HTTP client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends `request` and buffers the full response.
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

// ============================================================================
// Tests
// ============================================================================
