//! Connection configuration.
//!
//! # Example
//!
//! ```ignore
//! use signalr_transport_bridge::{ConnectionOptions, TransferFormat, TransportKind, TransportSet};
//!
//! let options = ConnectionOptions::new("/chathub")
//!     .with_base_url("https://app.example/".parse()?)
//!     .with_transports(TransportSet::all().without(TransportKind::LongPolling))
//!     .with_transfer_format(TransferFormat::Text)
//!     .with_header("X-Tenant", "blue");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use url::Url;

use crate::error::{Error, Result};
use crate::http::{AccessTokenProvider, DEFAULT_HTTP_TIMEOUT};
use crate::pipe::PipeOptions;
use crate::protocol::{TransferFormat, TransportKind, TransportSet};

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Everything a connection needs to know before it starts.
#[derive(Clone)]
pub struct ConnectionOptions {
    /// Hub URL, absolute or relative to `base_url`.
    pub url: String,

    /// Base for resolving a relative `url`.
    pub base_url: Option<Url>,

    /// Transports the client is willing to use.
    pub transports: TransportSet,

    /// Format used by `start` when none is given.
    pub transfer_format: TransferFormat,

    /// Supplier for the access token, re-invoked on every use.
    pub access_token_provider: Option<AccessTokenProvider>,

    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,

    /// Connect straight over WebSockets without negotiating.
    pub skip_negotiation: bool,

    /// Timeout for each request/response exchange.
    pub http_timeout: Duration,

    /// Buffer thresholds for both pipe directions.
    pub pipe_options: PipeOptions,
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionOptions {
    /// Creates options for `url` with every transport enabled.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            base_url: None,
            transports: TransportSet::all(),
            transfer_format: TransferFormat::Text,
            access_token_provider: None,
            headers: Vec::new(),
            skip_negotiation: false,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            pipe_options: PipeOptions::default(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Sets the base URL for relative resolution.
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    /// Restricts the transports the client will try.
    #[inline]
    #[must_use]
    pub fn with_transports(mut self, transports: TransportSet) -> Self {
        self.transports = transports;
        self
    }

    /// Sets the default transfer format.
    #[inline]
    #[must_use]
    pub fn with_transfer_format(mut self, format: TransferFormat) -> Self {
        self.transfer_format = format;
        self
    }

    /// Sets the access-token supplier.
    #[must_use]
    pub fn with_access_token_provider<F, Fut>(mut self, provider: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<String>>> + Send + 'static,
    {
        let provider: AccessTokenProvider = Arc::new(move || provider().boxed());
        self.access_token_provider = Some(provider);
        self
    }

    /// Uses a fixed access token.
    #[must_use]
    pub fn with_access_token(self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.with_access_token_provider(move || {
            let token = token.clone();
            async move { Ok(Some(token)) }
        })
    }

    /// Adds a header to every request.
    #[inline]
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Skips negotiation; requires WebSockets to be the only transport.
    #[inline]
    #[must_use]
    pub fn with_skip_negotiation(mut self, skip: bool) -> Self {
        self.skip_negotiation = skip;
        self
    }

    /// Sets the request timeout.
    #[inline]
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Sets the pipe buffer thresholds.
    #[inline]
    #[must_use]
    pub fn with_pipe_options(mut self, options: PipeOptions) -> Self {
        self.pipe_options = options;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionOptions {
    /// Checks everything that can be checked before any I/O.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is blank, no transport is
    /// enabled, or the HTTP timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::config("A connection URL is required"));
        }

        if self.transports.is_empty() {
            return Err(Error::config("At least one transport must be enabled"));
        }

        if self.http_timeout.is_zero() {
            return Err(Error::config("HTTP timeout must be greater than zero"));
        }

        Ok(())
    }

    /// Checks that skipping negotiation is allowed for the enabled set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if negotiation is skipped and the enabled
    /// set is anything but exactly WebSockets.
    pub fn validate_skip_negotiation(&self) -> Result<()> {
        if self.skip_negotiation && self.transports.single() != Some(TransportKind::WebSockets) {
            return Err(Error::config(
                "Negotiation can only be skipped when using the WebSocket transport directly.",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("url", &self.url)
            .field("base_url", &self.base_url)
            .field("transports", &self.transports)
            .field("transfer_format", &self.transfer_format)
            .field("has_access_token_provider", &self.access_token_provider.is_some())
            .field("headers", &self.headers.len())
            .field("skip_negotiation", &self.skip_negotiation)
            .field("http_timeout", &self.http_timeout)
            .field("pipe_options", &self.pipe_options)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectionOptions::new("http://h/hub");
        assert_eq!(options.transports, TransportSet::all());
        assert_eq!(options.transfer_format, TransferFormat::Text);
        assert_eq!(options.http_timeout, DEFAULT_HTTP_TIMEOUT);
        assert!(!options.skip_negotiation);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_blank_url_rejected() {
        let result = ConnectionOptions::new("  ").validate();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_empty_transport_set_rejected() {
        let result = ConnectionOptions::new("http://h/hub")
            .with_transports(TransportSet::none())
            .validate();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_skip_negotiation_requires_websockets_only() {
        let ws_only = ConnectionOptions::new("http://h/hub")
            .with_transports(TransportSet::only(TransportKind::WebSockets))
            .with_skip_negotiation(true);
        assert!(ws_only.validate_skip_negotiation().is_ok());

        let all = ConnectionOptions::new("http://h/hub").with_skip_negotiation(true);
        assert!(matches!(
            all.validate_skip_negotiation(),
            Err(Error::Config { .. })
        ));

        let sse_only = ConnectionOptions::new("http://h/hub")
            .with_transports(TransportSet::only(TransportKind::ServerSentEvents))
            .with_skip_negotiation(true);
        assert!(sse_only.validate_skip_negotiation().is_err());
    }

    #[tokio::test]
    async fn test_fixed_access_token() {
        let options = ConnectionOptions::new("http://h/hub").with_access_token("secret");
        let provider = options.access_token_provider.unwrap();
        assert_eq!(provider().await.unwrap(), Some("secret".to_string()));
    }

    #[test]
    fn test_debug_hides_provider() {
        let options = ConnectionOptions::new("http://h/hub").with_access_token("secret");
        let debug = format!("{options:?}");
        assert!(debug.contains("has_access_token_provider: true"));
        assert!(!debug.contains("secret"));
    }
}
