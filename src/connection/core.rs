//! Connection orchestrator.
//!
//! # Lifecycle
//!
//! | State | Entered when |
//! |-------|--------------|
//! | `Idle` | Built, or a start attempt failed |
//! | `Starting` | `start` is negotiating and selecting a transport |
//! | `Started` | A transport is running and its pipe is available |
//! | `Disposing` | `dispose` is stopping the transport |
//! | `Disposed` | Terminal; `start` and `pipe` fail with `UseAfterDispose` |
//!
//! Start and dispose run under one async gate, so at most one of them is
//! in flight at a time.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::http::{AccessTokenSource, HttpClient};
use crate::identifiers::ConnectionId;
use crate::pipe::DuplexPipe;
use crate::protocol::endpoint;
use crate::protocol::{TransferFormat, TransportKind};
use crate::transport::{Transport, TransportFactory};

use super::builder::HttpConnectionBuilder;
use super::negotiate::NegotiationClient;
use super::options::ConnectionOptions;
use super::selector::{Selection, TransportFailure, TransportSelector};

// ============================================================================
// ConnectionState
// ============================================================================

/// Orchestrator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not started.
    Idle,
    /// Start in progress.
    Starting,
    /// Transport running.
    Started,
    /// Dispose in progress.
    Disposing,
    /// Disposed for good.
    Disposed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Starting => "Starting",
            Self::Started => "Started",
            Self::Disposing => "Disposing",
            Self::Disposed => "Disposed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Synchronously readable view of the connection.
#[derive(Debug, Clone)]
struct Snapshot {
    state: ConnectionState,
    connection_id: Option<ConnectionId>,
    transport_kind: Option<TransportKind>,
    pipe: Option<DuplexPipe>,
    failures: Vec<TransportFailure>,
}

impl Snapshot {
    const fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            connection_id: None,
            transport_kind: None,
            pipe: None,
            failures: Vec::new(),
        }
    }
}

// ============================================================================
// HttpConnection
// ============================================================================

/// Negotiates, selects a transport and exposes it as a [`DuplexPipe`].
///
/// # Example
///
/// ```ignore
/// let connection = HttpConnection::builder("http://localhost:5000/chathub").build()?;
/// connection.start().await?;
///
/// let pipe = connection.pipe()?;
/// pipe.output.write(b"{\"protocol\":\"json\",\"version\":1}\x1e").await?;
///
/// connection.dispose().await;
/// ```
pub struct HttpConnection {
    options: ConnectionOptions,
    tokens: Arc<AccessTokenSource>,
    negotiation: NegotiationClient,
    factory: Arc<dyn TransportFactory>,
    active: AsyncMutex<Option<Box<dyn Transport>>>,
    snapshot: RwLock<Snapshot>,
}

// ============================================================================
// Constructors
// ============================================================================

impl HttpConnection {
    /// Creates a configuration builder for `url`.
    #[inline]
    #[must_use]
    pub fn builder(url: impl Into<String>) -> HttpConnectionBuilder {
        HttpConnectionBuilder::new(url)
    }

    /// Builds a connection from options with default collaborators.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the options are invalid.
    pub fn new(options: ConnectionOptions) -> Result<Self> {
        HttpConnectionBuilder::from_options(options).build()
    }

    pub(crate) fn from_parts(
        options: ConnectionOptions,
        http: Arc<dyn HttpClient>,
        tokens: Arc<AccessTokenSource>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let negotiation = NegotiationClient::new(http, Arc::clone(&tokens));
        Self {
            options,
            tokens,
            negotiation,
            factory,
            active: AsyncMutex::new(None),
            snapshot: RwLock::new(Snapshot::new()),
        }
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl HttpConnection {
    /// Configured connection URL, as given.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.options.url
    }

    /// Options this connection was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.snapshot.read().state
    }

    /// Connection id of the running transport; `None` if negotiation was
    /// skipped or the connection is not started.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.snapshot.read().connection_id.clone()
    }

    /// Kind of the running transport.
    #[inline]
    #[must_use]
    pub fn transport_kind(&self) -> Option<TransportKind> {
        self.snapshot.read().transport_kind
    }

    /// Returns `true` if the running transport keeps the connection alive
    /// on its own.
    #[inline]
    #[must_use]
    pub fn has_inherent_keep_alive(&self) -> bool {
        self.transport_kind() == Some(TransportKind::LongPolling)
    }

    /// Candidates that failed during the last successful start.
    #[must_use]
    pub fn transport_failures(&self) -> Vec<TransportFailure> {
        self.snapshot.read().failures.clone()
    }

    /// Consumer end of the running transport.
    ///
    /// # Errors
    ///
    /// - [`Error::UseAfterDispose`] once disposed
    /// - [`Error::NotStarted`] before a successful start
    pub fn pipe(&self) -> Result<DuplexPipe> {
        let snapshot = self.snapshot.read();
        if matches!(
            snapshot.state,
            ConnectionState::Disposing | ConnectionState::Disposed
        ) {
            return Err(Error::UseAfterDispose);
        }
        snapshot.pipe.clone().ok_or(Error::NotStarted)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

impl HttpConnection {
    /// Starts with the configured transfer format.
    ///
    /// # Errors
    ///
    /// See [`HttpConnection::start_with_format`].
    pub async fn start(&self) -> Result<()> {
        self.start_with_format(self.options.transfer_format).await
    }

    /// Negotiates and starts the first workable transport.
    ///
    /// A second call on a started connection is a no-op. A failed start
    /// leaves no transport behind and may be retried.
    ///
    /// # Errors
    ///
    /// - [`Error::UseAfterDispose`] if disposed
    /// - [`Error::Config`] for an invalid skip-negotiation setup
    /// - [`Error::Negotiation`], [`Error::RedirectLimitExceeded`],
    ///   [`Error::NoTransportAvailable`] or
    ///   [`Error::UnsupportedTransferFormat`] from negotiation and selection
    pub async fn start_with_format(&self, format: TransferFormat) -> Result<()> {
        let mut active = self.active.lock().await;

        match self.state() {
            ConnectionState::Started => {
                debug!("Connection already started");
                return Ok(());
            }
            ConnectionState::Disposing | ConnectionState::Disposed => {
                return Err(Error::UseAfterDispose);
            }
            ConnectionState::Idle | ConnectionState::Starting => {}
        }

        self.set_state(ConnectionState::Starting);
        info!(url = %self.options.url, format = %format, "Starting connection");

        // A token from an earlier attempt's redirect does not carry over.
        self.tokens.clear_override();

        let selection = match self.select(format).await {
            Ok(selection) => selection,
            Err(e) => {
                error!(url = %self.options.url, error = %e, "Failed to start connection");
                self.set_state(ConnectionState::Idle);
                return Err(e);
            }
        };

        let kind = selection.transport.kind();
        let Some(pipe) = selection.transport.pipe() else {
            if let Err(e) = selection.transport.stop().await {
                error!(transport = %kind, error = %e, "Error while stopping transport");
            }
            self.set_state(ConnectionState::Idle);
            return Err(Error::transport_start(kind, "transport started without a pipe"));
        };

        {
            let mut snapshot = self.snapshot.write();
            snapshot.state = ConnectionState::Started;
            snapshot.connection_id = selection.connection_id.clone();
            snapshot.transport_kind = Some(kind);
            snapshot.pipe = Some(pipe);
            snapshot.failures = selection.failures;
        }
        *active = Some(selection.transport);

        info!(transport = %kind, url = %selection.url, "Connection started");
        Ok(())
    }

    /// Stops the running transport and releases the connection.
    ///
    /// Stop errors are logged and swallowed. Disposing twice, or disposing
    /// a connection that never started, is a no-op beyond marking it
    /// disposed.
    pub async fn dispose(&self) {
        let mut active = self.active.lock().await;

        match self.state() {
            ConnectionState::Disposed => return,
            ConnectionState::Idle | ConnectionState::Starting => {
                self.set_state(ConnectionState::Disposed);
                debug!("Disposed connection that was never started");
                return;
            }
            ConnectionState::Started | ConnectionState::Disposing => {}
        }

        self.set_state(ConnectionState::Disposing);
        info!(url = %self.options.url, "Disposing connection");

        if let Some(transport) = active.take() {
            let kind = transport.kind();
            if let Err(e) = transport.stop().await {
                error!(transport = %kind, error = %e, "An error occurred while stopping the transport");
            }
        }

        {
            let mut snapshot = self.snapshot.write();
            snapshot.state = ConnectionState::Disposed;
            snapshot.pipe = None;
        }
        info!("Connection disposed");
    }

    async fn select(&self, format: TransferFormat) -> Result<Selection> {
        let url = endpoint::resolve_url(&self.options.url, self.options.base_url.as_ref())?;
        let selector = TransportSelector::new(&self.negotiation, self.factory.as_ref());

        if self.options.skip_negotiation {
            self.options.validate_skip_negotiation()?;
            return selector.start_direct(&url, format).await;
        }

        selector
            .select(&url, &self.options.transports, format)
            .await
    }

    fn set_state(&self, state: ConnectionState) {
        self.snapshot.write().state = state;
    }
}

impl fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot.read();
        f.debug_struct("HttpConnection")
            .field("url", &self.options.url)
            .field("state", &snapshot.state)
            .field("connection_id", &snapshot.connection_id)
            .field("transport_kind", &snapshot.transport_kind)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
