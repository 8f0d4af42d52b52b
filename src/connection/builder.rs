//! Builder pattern for connection configuration.
//!
//! Wires the request pipeline, host runtime and transport factory around
//! a [`ConnectionOptions`].
//!
//! # Example
//!
//! ```no_run
//! use signalr_transport_bridge::{HttpConnection, TransportKind, TransportSet};
//!
//! # async fn example() -> signalr_transport_bridge::Result<()> {
//! let connection = HttpConnection::builder("https://app.example/chathub")
//!     .transports(TransportSet::all().without(TransportKind::LongPolling))
//!     .access_token("token")
//!     .build()?;
//!
//! connection.start().await?;
//! let pipe = connection.pipe()?;
//! # let _ = pipe;
//! connection.dispose().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::error::{Error, Result};
use crate::host::{CallbackRouter, HostRuntime, NativeHost};
use crate::http::{
    AccessTokenHttpClient, AccessTokenSource, HttpClient, LoggingHttpClient, ReqwestHttpClient,
};
use crate::protocol::endpoint;
use crate::protocol::{TransferFormat, TransportSet};
use crate::transport::{HostTransportFactory, TransportFactory};

use super::core::HttpConnection;
use super::options::ConnectionOptions;

// ============================================================================
// HttpConnectionBuilder
// ============================================================================

/// Builder for configuring an [`HttpConnection`].
///
/// Unset collaborators fall back to a [`NativeHost`] and a
/// [`ReqwestHttpClient`].
#[derive(Clone)]
pub struct HttpConnectionBuilder {
    options: ConnectionOptions,
    host: Option<(Arc<dyn HostRuntime>, Arc<CallbackRouter>)>,
    http_client: Option<Arc<dyn HttpClient>>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
    long_polling: Option<Arc<dyn TransportFactory>>,
}

// ============================================================================
// Constructors
// ============================================================================

impl HttpConnectionBuilder {
    /// Creates a builder for `url` with default options.
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_options(ConnectionOptions::new(url))
    }

    /// Creates a builder around complete options.
    #[must_use]
    pub fn from_options(options: ConnectionOptions) -> Self {
        Self {
            options,
            host: None,
            http_client: None,
            transport_factory: None,
            long_polling: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl HttpConnectionBuilder {
    /// Replaces the options wholesale.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the base URL for a relative connection URL.
    #[inline]
    #[must_use]
    pub fn base_url(mut self, base: Url) -> Self {
        self.options = self.options.with_base_url(base);
        self
    }

    /// Restricts the transports the client will try.
    #[inline]
    #[must_use]
    pub fn transports(mut self, transports: TransportSet) -> Self {
        self.options = self.options.with_transports(transports);
        self
    }

    /// Sets the default transfer format.
    #[inline]
    #[must_use]
    pub fn transfer_format(mut self, format: TransferFormat) -> Self {
        self.options = self.options.with_transfer_format(format);
        self
    }

    /// Uses a fixed access token.
    #[inline]
    #[must_use]
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.options = self.options.with_access_token(token);
        self
    }

    /// Adds a header to every request.
    #[inline]
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options = self.options.with_header(name, value);
        self
    }

    /// Connects over WebSockets without negotiating.
    #[inline]
    #[must_use]
    pub fn skip_negotiation(mut self, skip: bool) -> Self {
        self.options = self.options.with_skip_negotiation(skip);
        self
    }

    /// Uses `host` for socket and event-stream I/O.
    ///
    /// `router` must be the router `host` reports its callbacks to.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: Arc<dyn HostRuntime>, router: Arc<CallbackRouter>) -> Self {
        self.host = Some((host, router));
        self
    }

    /// Uses `client` for negotiation and request-based sends.
    ///
    /// Headers and access tokens are still added on top.
    #[inline]
    #[must_use]
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Creates adapters with `factory` instead of the host-backed one.
    #[inline]
    #[must_use]
    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    /// Provides long polling through an external factory.
    #[inline]
    #[must_use]
    pub fn long_polling(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.long_polling = Some(factory);
        self
    }

    /// Builds the connection with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are invalid
    /// - [`Error::Config`] if the URL cannot be resolved
    /// - [`Error::Http`] if the default HTTP client cannot be built
    pub fn build(self) -> Result<HttpConnection> {
        self.options.validate()?;
        self.validate_url()?;

        let tokens = Arc::new(AccessTokenSource::new(
            self.options.access_token_provider.clone(),
        ));

        let base: Arc<dyn HttpClient> = match self.http_client {
            Some(client) => client,
            None => Arc::new(ReqwestHttpClient::with_timeout(self.options.http_timeout)?),
        };
        let authorized = Arc::new(AccessTokenHttpClient::new(
            base,
            Arc::clone(&tokens),
            self.options.headers.clone(),
        ));
        let http: Arc<dyn HttpClient> = Arc::new(LoggingHttpClient::new(authorized));

        let factory = match self.transport_factory {
            Some(factory) => factory,
            None => {
                let (host, router) = self.host.unwrap_or_else(|| {
                    let router = CallbackRouter::new();
                    let host: Arc<dyn HostRuntime> = Arc::new(NativeHost::new(Arc::clone(&router)));
                    (host, router)
                });

                let mut factory =
                    HostTransportFactory::new(host, router, Arc::clone(&http), Arc::clone(&tokens))
                        .with_pipe_options(self.options.pipe_options);
                if let Some(long_polling) = self.long_polling {
                    factory = factory.with_long_polling(long_polling);
                }
                Arc::new(factory)
            }
        };

        Ok(HttpConnection::from_parts(self.options, http, tokens, factory))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl HttpConnectionBuilder {
    /// Validates that the URL resolves to an absolute URL.
    fn validate_url(&self) -> Result<Url> {
        endpoint::resolve_url(&self.options.url, self.options.base_url.as_ref()).map_err(|e| {
            Error::config(format!(
                "{e}\n\
                 Use an absolute URL or set a base URL with .base_url()."
            ))
        })
    }
}

impl fmt::Debug for HttpConnectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnectionBuilder")
            .field("options", &self.options)
            .field("has_host", &self.host.is_some())
            .field("has_http_client", &self.http_client.is_some())
            .field("has_transport_factory", &self.transport_factory.is_some())
            .field("has_long_polling", &self.long_polling.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
