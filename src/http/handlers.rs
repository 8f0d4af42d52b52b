//! Request decorators.
//!
//! | Decorator | Adds |
//! |-----------|------|
//! | [`AccessTokenHttpClient`] | Configured headers, `X-Requested-With`, `Authorization: Bearer` |
//! | [`LoggingHttpClient`] | Trace per request, warning on non-2xx |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::error::Result;

use super::{HttpClient, HttpRequest, HttpResponse};

// ============================================================================
// Types
// ============================================================================

/// Async access-token supplier, invoked on every use.
pub type AccessTokenProvider =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Option<String>>> + Send + Sync>;

/// Header every shim request carries.
const REQUESTED_WITH: (&str, &str) = ("X-Requested-With", "XMLHttpRequest");

// ============================================================================
// AccessTokenSource
// ============================================================================

/// Resolves the current access token for one connection.
///
/// A token handed out by negotiation overrides the configured provider
/// until the next start attempt clears it.
#[derive(Default)]
pub struct AccessTokenSource {
    provider: Option<AccessTokenProvider>,
    override_token: Mutex<Option<String>>,
}

impl AccessTokenSource {
    /// Creates a source around an optional provider.
    #[must_use]
    pub fn new(provider: Option<AccessTokenProvider>) -> Self {
        Self {
            provider,
            override_token: Mutex::new(None),
        }
    }

    /// Replaces the provider's answer with `token` from now on.
    pub fn set_override(&self, token: impl Into<String>) {
        *self.override_token.lock() = Some(token.into());
    }

    /// Drops the negotiation override; the provider answers again.
    pub fn clear_override(&self) {
        *self.override_token.lock() = None;
    }

    /// Returns `true` if a negotiation override is active.
    #[inline]
    #[must_use]
    pub fn has_override(&self) -> bool {
        self.override_token.lock().is_some()
    }

    /// Current token; empty tokens count as none.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error.
    pub async fn token(&self) -> Result<Option<String>> {
        let overridden = self.override_token.lock().clone();

        let token = match (overridden, &self.provider) {
            (Some(token), _) => Some(token),
            (None, Some(provider)) => provider().await?,
            (None, None) => None,
        };

        Ok(token.filter(|t| !t.is_empty()))
    }
}

impl fmt::Debug for AccessTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenSource")
            .field("has_provider", &self.provider.is_some())
            .field("has_override", &self.has_override())
            .finish()
    }
}

// ============================================================================
// AccessTokenHttpClient
// ============================================================================

/// Attaches headers and a fresh bearer token to every request.
pub struct AccessTokenHttpClient {
    inner: Arc<dyn HttpClient>,
    tokens: Arc<AccessTokenSource>,
    headers: Vec<(String, String)>,
}

impl AccessTokenHttpClient {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(
        inner: Arc<dyn HttpClient>,
        tokens: Arc<AccessTokenSource>,
        headers: Vec<(String, String)>,
    ) -> Self {
        Self {
            inner,
            tokens,
            headers,
        }
    }
}

#[async_trait]
impl HttpClient for AccessTokenHttpClient {
    async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        for (name, value) in &self.headers {
            request.set_header(name.as_str(), value.as_str());
        }
        request.set_header(REQUESTED_WITH.0, REQUESTED_WITH.1);

        if let Some(token) = self.tokens.token().await? {
            request.set_header("Authorization", format!("Bearer {token}"));
        }

        self.inner.send(request).await
    }
}

impl fmt::Debug for AccessTokenHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenHttpClient")
            .field("tokens", &self.tokens)
            .field("headers", &self.headers.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// LoggingHttpClient
// ============================================================================

/// Traces requests and warns on unsuccessful responses.
pub struct LoggingHttpClient {
    inner: Arc<dyn HttpClient>,
}

impl LoggingHttpClient {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn HttpClient>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl HttpClient for LoggingHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = request.method;
        let url = request.url.clone();

        trace!(%method, url = %url, "Sending HTTP request");
        let response = self.inner.send(request).await?;

        if !response.is_success() {
            warn!(status = response.status, %method, url = %url, "Unsuccessful HTTP response");
        }

        Ok(response)
    }
}

impl fmt::Debug for LoggingHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingHttpClient").finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::FutureExt;

    use crate::error::Error;
    use crate::testing::FakeHttpClient;

    fn counting_provider(calls: Arc<AtomicUsize>) -> AccessTokenProvider {
        Arc::new(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok::<_, Error>(Some(format!("token-{n}"))) }.boxed()
        })
    }

    #[tokio::test]
    async fn test_token_refetched_per_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tokens = Arc::new(AccessTokenSource::new(Some(counting_provider(calls.clone()))));
        let fake = FakeHttpClient::new();
        let client = AccessTokenHttpClient::new(fake.clone(), tokens, Vec::new());

        client.send(HttpRequest::post("http://h/a")).await.unwrap();
        client.send(HttpRequest::post("http://h/b")).await.unwrap();

        let requests = fake.requests();
        assert_eq!(requests[0].header("Authorization"), Some("Bearer token-1"));
        assert_eq!(requests[1].header("Authorization"), Some("Bearer token-2"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_override_wins_over_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tokens = Arc::new(AccessTokenSource::new(Some(counting_provider(calls.clone()))));
        tokens.set_override("redirected");

        assert_eq!(tokens.token().await.unwrap().as_deref(), Some("redirected"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cleared_override_falls_back_to_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tokens = AccessTokenSource::new(Some(counting_provider(calls.clone())));
        tokens.set_override("redirected");
        tokens.clear_override();

        assert!(!tokens.has_override());
        assert_eq!(tokens.token().await.unwrap().as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn test_headers_and_requested_with() {
        let fake = FakeHttpClient::new();
        let client = AccessTokenHttpClient::new(
            fake.clone(),
            Arc::new(AccessTokenSource::default()),
            vec![("X-Tenant".into(), "blue".into())],
        );

        client.send(HttpRequest::post("http://h/")).await.unwrap();

        let request = &fake.requests()[0];
        assert_eq!(request.header("x-tenant"), Some("blue"));
        assert_eq!(request.header("X-Requested-With"), Some("XMLHttpRequest"));
        assert_eq!(request.header("Authorization"), None);
    }

    #[tokio::test]
    async fn test_empty_token_is_omitted() {
        let provider: AccessTokenProvider = Arc::new(|| async { Ok::<_, Error>(Some(String::new())) }.boxed());
        let tokens = AccessTokenSource::new(Some(provider));
        assert_eq!(tokens.token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let provider: AccessTokenProvider =
            Arc::new(|| async { Err::<Option<String>, _>(Error::config("no credentials")) }.boxed());
        let fake = FakeHttpClient::new();
        let client = AccessTokenHttpClient::new(
            fake.clone(),
            Arc::new(AccessTokenSource::new(Some(provider))),
            Vec::new(),
        );

        assert!(client.send(HttpRequest::post("http://h/")).await.is_err());
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn test_logging_passes_responses_through() {
        let fake = FakeHttpClient::new();
        fake.push_response(HttpResponse::new(503, "busy"));
        let client = LoggingHttpClient::new(fake.clone());

        let response = client.send(HttpRequest::post("http://h/")).await.unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(response.body, b"busy");
    }
}
