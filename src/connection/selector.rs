//! Transport candidate selection.
//!
//! Candidates are tried in the order the server advertised them:
//!
//! | Check | Outcome when it fails |
//! |-------|-----------------------|
//! | Name is a known transport | Skipped ([`SkipReason::UnknownTransport`]) |
//! | Enabled by the client | Skipped ([`SkipReason::DisabledByClient`]) |
//! | Advertises the requested format | Skipped ([`SkipReason::UnsupportedFormat`]) |
//! | Adapter starts | Failure recorded, next candidate tried after re-negotiating |
//! | Adapter accepts the format | Start fails with [`Error::UnsupportedTransferFormat`] |
//!
//! A negotiation response is single-use: once an attempt built on it has
//! failed, the next attempt negotiates again for a fresh connection id.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::endpoint;
use crate::protocol::{AvailableTransport, TransferFormat, TransportKind, TransportSet};
use crate::transport::{Transport, TransportFactory};

use super::negotiate::{Negotiated, NegotiationClient};

// ============================================================================
// Candidate Evaluation
// ============================================================================

/// Why an advertised transport was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The name is not a transport this client knows.
    UnknownTransport,
    /// The client did not enable it.
    DisabledByClient,
    /// The server does not offer the requested transfer format on it.
    UnsupportedFormat,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::UnknownTransport => "it is not supported by this client",
            Self::DisabledByClient => "it was disabled by the client",
            Self::UnsupportedFormat => "it does not support the requested transfer format",
        };
        f.write_str(text)
    }
}

/// Decision for one advertised transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCandidate {
    /// Attempt to start this transport.
    Attempt(TransportKind),
    /// Do not attempt it.
    Skip {
        /// Name as advertised.
        transport: String,
        /// Why it was skipped.
        reason: SkipReason,
    },
}

impl TransportCandidate {
    /// Classifies one advertised transport.
    #[must_use]
    pub fn evaluate(
        available: &AvailableTransport,
        enabled: &TransportSet,
        format: TransferFormat,
    ) -> Self {
        let skip = |reason| Self::Skip {
            transport: available.transport.clone(),
            reason,
        };

        match TransportKind::from_name(&available.transport) {
            None => skip(SkipReason::UnknownTransport),
            Some(kind) if !enabled.contains(kind) => skip(SkipReason::DisabledByClient),
            Some(_) if !available.supports(format) => skip(SkipReason::UnsupportedFormat),
            Some(kind) => Self::Attempt(kind),
        }
    }
}

// ============================================================================
// Selection Results
// ============================================================================

/// A candidate that failed to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    /// Transport that failed.
    pub transport: TransportKind,
    /// Rendered cause.
    pub message: String,
}

/// A started transport and how it was reached.
pub struct Selection {
    /// The running adapter.
    pub transport: Box<dyn Transport>,

    /// Connection id it was started with; `None` when negotiation was skipped.
    pub connection_id: Option<ConnectionId>,

    /// URL the adapter was started against.
    pub url: Url,

    /// Candidates that failed before this one started.
    pub failures: Vec<TransportFailure>,
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("transport", &self.transport.kind())
            .field("connection_id", &self.connection_id)
            .field("url", &self.url.as_str())
            .field("failures", &self.failures)
            .finish()
    }
}

// ============================================================================
// TransportSelector
// ============================================================================

/// Drives negotiation and ordered fallback over the advertised transports.
pub struct TransportSelector<'a> {
    negotiation: &'a NegotiationClient,
    factory: &'a dyn TransportFactory,
}

impl<'a> TransportSelector<'a> {
    /// Creates a selector over borrowed collaborators.
    #[must_use]
    pub fn new(negotiation: &'a NegotiationClient, factory: &'a dyn TransportFactory) -> Self {
        Self {
            negotiation,
            factory,
        }
    }

    /// Negotiates against `url` and starts the first workable transport.
    ///
    /// # Errors
    ///
    /// - [`Error::Negotiation`] or [`Error::RedirectLimitExceeded`] from the
    ///   first negotiation
    /// - [`Error::UnsupportedTransferFormat`] as soon as a started adapter
    ///   rejects the requested format
    /// - [`Error::NoTransportAvailable`] once every candidate was skipped or
    ///   failed
    pub async fn select(
        &self,
        url: &Url,
        enabled: &TransportSet,
        format: TransferFormat,
    ) -> Result<Selection> {
        let first = self.negotiation.negotiate_with_redirects(url).await?;
        let mut last_url = first.url.clone();
        let candidates = first.response.available_transports.clone();
        let mut current = Some(first);
        let mut failures = Vec::new();

        for available in &candidates {
            let kind = match TransportCandidate::evaluate(available, enabled, format) {
                TransportCandidate::Attempt(kind) => kind,
                TransportCandidate::Skip { transport, reason } => {
                    debug!(transport = %transport, reason = %reason, "Skipping transport");
                    continue;
                }
            };

            // A failed attempt consumed the previous response.
            let negotiated = match current.take() {
                Some(negotiated) => negotiated,
                None => match self.negotiation.negotiate_with_redirects(&last_url).await {
                    Ok(negotiated) => negotiated,
                    Err(e) => {
                        warn!(transport = %kind, error = %e, "Transport failed to start");
                        failures.push(TransportFailure {
                            transport: kind,
                            message: e.to_string(),
                        });
                        continue;
                    }
                },
            };
            last_url = negotiated.url.clone();

            match self.attempt(kind, &negotiated, format).await {
                Ok((transport, connection_id, connect_url)) => {
                    info!(transport = %kind, connection_id = %connection_id, "Transport started");
                    return Ok(Selection {
                        transport,
                        connection_id: Some(connection_id),
                        url: connect_url,
                        failures,
                    });
                }
                Err(e) if e.is_fatal_start_error() => {
                    warn!(transport = %kind, error = %e, "Transport rejected the start");
                    return Err(e);
                }
                Err(e) => {
                    warn!(transport = %kind, error = %e, "Transport failed to start");
                    failures.push(TransportFailure {
                        transport: kind,
                        message: e.to_string(),
                    });
                }
            }
        }

        let last_error = failures.last().map(|failure| failure.message.clone());
        Err(Error::no_transport_available(last_url.as_str(), last_error))
    }

    /// Starts WebSockets against `url` without negotiating.
    ///
    /// Any failure is returned as-is; there is no fallback.
    ///
    /// # Errors
    ///
    /// Whatever creating or starting the adapter returned.
    pub async fn start_direct(&self, url: &Url, format: TransferFormat) -> Result<Selection> {
        let kind = TransportKind::WebSockets;
        debug!(transport = %kind, url = %url, "Starting transport without negotiation");

        let transport = self.factory.create(kind).await?;
        transport.start(url, format).await?;

        info!(transport = %kind, "Transport started");
        Ok(Selection {
            transport,
            connection_id: None,
            url: url.clone(),
            failures: Vec::new(),
        })
    }

    async fn attempt(
        &self,
        kind: TransportKind,
        negotiated: &Negotiated,
        format: TransferFormat,
    ) -> Result<(Box<dyn Transport>, ConnectionId, Url)> {
        let connection_id = ConnectionId::new(negotiated.response.connection_id.as_str())?;
        let connect_url = endpoint::connect_url(&negotiated.url, connection_id.as_str())?;

        debug!(transport = %kind, url = %connect_url, "Starting transport");
        let transport = self.factory.create(kind).await?;
        transport.start(&connect_url, format).await?;

        Ok((transport, connection_id, connect_url))
    }
}

impl fmt::Debug for TransportSelector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSelector")
            .field("negotiation", self.negotiation)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
