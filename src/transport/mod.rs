//! Transport adapters.
//!
//! Every adapter turns one wire mechanism into a [`DuplexPipe`] the
//! connection consumer reads and writes without knowing which transport
//! won negotiation.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐  start/stop  ┌──────────────────┐  host calls  ┌─────────────┐
//! │ HttpConnection │─────────────►│ dyn Transport    │─────────────►│ HostRuntime │
//! │                │◄─────────────│  (WS / SSE / LP) │◄─────────────│             │
//! └────────────────┘  DuplexPipe  └──────────────────┘  callbacks   └─────────────┘
//! ```
//!
//! # Adapter Lifecycle
//!
//! | State | Entered when |
//! |-------|--------------|
//! | `Created` | Adapter constructed and registered with the router |
//! | `Connecting` | `start` issued the host open call |
//! | `Open` | Host reported the connection open; I/O loops running |
//! | `Closing` | `stop` requested |
//! | `Closed` | I/O loops finished |
//! | `Errored` | Start failed or the host reported an error |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `send` | POST-based send loop |
//! | `sse` | [`ServerSentEventsTransport`] |
//! | `websocket` | [`WebSocketTransport`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::host::{CallbackRouter, HostRuntime};
use crate::http::{AccessTokenSource, HttpClient};
use crate::pipe::{DuplexPipe, PipeOptions};
use crate::protocol::{TransferFormat, TransportKind};

// ============================================================================
// Submodules
// ============================================================================

/// POST-based send loop.
pub mod send;

/// Server-sent events adapter.
pub mod sse;

/// WebSocket adapter.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use send::send_messages;
pub use sse::ServerSentEventsTransport;
pub use websocket::{SEND_GRACE_PERIOD, WebSocketTransport};

// ============================================================================
// TransportState
// ============================================================================

/// Adapter lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    /// Constructed, not started.
    Created,
    /// Waiting for the host to open the connection.
    Connecting,
    /// Connection open; I/O loops running.
    Open,
    /// Stop requested.
    Closing,
    /// Fully stopped.
    Closed,
    /// Start failed or the host reported an error.
    Errored,
}

impl TransportState {
    /// Returns `true` for `Closed` and `Errored`.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::Connecting => "Connecting",
            Self::Open => "Open",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
            Self::Errored => "Errored",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Contract every transport adapter implements.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which transport this adapter drives.
    fn kind(&self) -> TransportKind;

    /// Connects to `url` using `format`.
    ///
    /// On success the consumer end is available from [`Transport::pipe`].
    async fn start(&self, url: &Url, format: TransferFormat) -> Result<()>;

    /// Stops the adapter and completes both pipe directions.
    ///
    /// A never-started adapter stops as a no-op.
    async fn stop(&self) -> Result<()>;

    /// Consumer end of the duplex stream, once started.
    fn pipe(&self) -> Option<DuplexPipe>;
}

// ============================================================================
// TransportFactory
// ============================================================================

/// Creates a fresh adapter for one start attempt.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Creates an adapter for `kind`.
    ///
    /// # Errors
    ///
    /// [`Error::TransportUnsupported`] if this factory or its host cannot
    /// provide `kind`.
    async fn create(&self, kind: TransportKind) -> Result<Box<dyn Transport>>;
}

// ============================================================================
// HostTransportFactory
// ============================================================================

/// Builds host-backed adapters.
///
/// Long polling has no host-callback adapter; it is delegated to an
/// optional external factory.
pub struct HostTransportFactory {
    host: Arc<dyn HostRuntime>,
    router: Arc<CallbackRouter>,
    http: Arc<dyn HttpClient>,
    tokens: Arc<AccessTokenSource>,
    pipe_options: PipeOptions,
    long_polling: Option<Arc<dyn TransportFactory>>,
}

impl HostTransportFactory {
    /// Creates a factory over the given collaborators.
    #[must_use]
    pub fn new(
        host: Arc<dyn HostRuntime>,
        router: Arc<CallbackRouter>,
        http: Arc<dyn HttpClient>,
        tokens: Arc<AccessTokenSource>,
    ) -> Self {
        Self {
            host,
            router,
            http,
            tokens,
            pipe_options: PipeOptions::default(),
            long_polling: None,
        }
    }

    /// Sets the pipe thresholds for created adapters.
    #[must_use]
    pub fn with_pipe_options(mut self, options: PipeOptions) -> Self {
        self.pipe_options = options;
        self
    }

    /// Delegates long polling to `factory`.
    #[must_use]
    pub fn with_long_polling(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.long_polling = Some(factory);
        self
    }
}

#[async_trait]
impl TransportFactory for HostTransportFactory {
    async fn create(&self, kind: TransportKind) -> Result<Box<dyn Transport>> {
        match kind {
            TransportKind::WebSockets => {
                if !self.host.is_socket_supported().await? {
                    debug!(transport = %kind, "Host has no socket support");
                    return Err(Error::transport_unsupported(kind));
                }

                Ok(Box::new(WebSocketTransport::new(
                    Arc::clone(&self.host),
                    &self.router,
                    Arc::clone(&self.tokens),
                    self.pipe_options,
                )))
            }

            TransportKind::ServerSentEvents => {
                if !self.host.is_event_stream_supported().await? {
                    debug!(transport = %kind, "Host has no event stream support");
                    return Err(Error::transport_unsupported(kind));
                }

                Ok(Box::new(ServerSentEventsTransport::new(
                    Arc::clone(&self.host),
                    &self.router,
                    Arc::clone(&self.http),
                    Arc::clone(&self.tokens),
                    self.pipe_options,
                )))
            }

            TransportKind::LongPolling => match &self.long_polling {
                Some(factory) => factory.create(kind).await,
                None => Err(Error::transport_unsupported(kind)),
            },
        }
    }
}

impl fmt::Debug for HostTransportFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostTransportFactory")
            .field("pipe_options", &self.pipe_options)
            .field("long_polling", &self.long_polling.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::{FakeHost, FakeHttpClient, FakeTransportFactory};

    fn factory(host: &Arc<FakeHost>) -> HostTransportFactory {
        HostTransportFactory::new(
            host.clone(),
            host.router(),
            FakeHttpClient::new(),
            Arc::new(AccessTokenSource::default()),
        )
    }

    #[tokio::test]
    async fn test_creates_host_adapters() {
        let host = FakeHost::new();
        let factory = factory(&host);

        let ws = factory.create(TransportKind::WebSockets).await.unwrap();
        let sse = factory.create(TransportKind::ServerSentEvents).await.unwrap();

        assert_eq!(ws.kind(), TransportKind::WebSockets);
        assert_eq!(sse.kind(), TransportKind::ServerSentEvents);
        assert_eq!(host.router().len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_host_capability() {
        let host = FakeHost::new();
        host.set_socket_supported(false);

        let err = factory(&host)
            .create(TransportKind::WebSockets)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::TransportUnsupported { .. }));
        assert!(host.router().is_empty());

        host.set_event_stream_supported(false);
        let err = factory(&host)
            .create(TransportKind::ServerSentEvents)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::TransportUnsupported { .. }));
    }

    #[tokio::test]
    async fn test_long_polling_requires_delegate() {
        let host = FakeHost::new();

        let err = factory(&host)
            .create(TransportKind::LongPolling)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::TransportUnsupported { .. }));

        let delegate = FakeTransportFactory::new();
        let factory = factory(&host).with_long_polling(delegate.clone());
        let lp = factory.create(TransportKind::LongPolling).await.unwrap();
        assert_eq!(lp.kind(), TransportKind::LongPolling);
        assert_eq!(delegate.created(), vec![TransportKind::LongPolling]);
    }

    #[test]
    fn test_terminal_states() {
        assert!(TransportState::Closed.is_terminal());
        assert!(TransportState::Errored.is_terminal());
        assert!(!TransportState::Open.is_terminal());
    }
}
