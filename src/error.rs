//! Error types for the connection layer.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```no_run
//! use signalr_transport_bridge::{HttpConnection, Result};
//!
//! async fn example(connection: &HttpConnection) -> Result<()> {
//!     connection.start().await?;
//!     let pipe = connection.pipe()?;
//!     pipe.output.write(b"{\"protocol\":\"json\",\"version\":1}\x1e").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidUrl`] |
//! | Negotiation | [`Error::Negotiation`], [`Error::RedirectLimitExceeded`] |
//! | Transport selection | [`Error::TransportStart`], [`Error::TransportUnsupported`], [`Error::NoTransportAvailable`], [`Error::UnsupportedTransferFormat`] |
//! | Host bridge | [`Error::Host`], [`Error::HostCallback`] |
//! | Lifecycle | [`Error::Stop`], [`Error::NotStarted`], [`Error::UseAfterDispose`], [`Error::ConnectionClosed`] |
//! | External | [`Error::Http`], [`Error::Json`], [`Error::Base64`], [`Error::Url`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::protocol::{TransferFormat, TransportKind};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when connection options are invalid or incomplete.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// URL could not be parsed or resolved.
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    // ========================================================================
    // Negotiation Errors
    // ========================================================================
    /// Handshake request failed or returned an unusable body.
    ///
    /// Not retried.
    #[error("Negotiation with '{url}' failed: {message}")]
    Negotiation {
        /// URL the negotiate request was sent to.
        url: String,
        /// Inner cause.
        message: String,
    },

    /// The server kept redirecting past the redirect bound.
    #[error("Negotiate redirection limit of {limit} exceeded (last url: {url})")]
    RedirectLimitExceeded {
        /// Last URL that was negotiated against.
        url: String,
        /// The redirect bound.
        limit: usize,
    },

    // ========================================================================
    // Transport Selection Errors
    // ========================================================================
    /// A single transport candidate failed to start.
    ///
    /// Absorbed by the selector unless no negotiation is permitted.
    #[error("Transport '{transport}' failed to start: {message}")]
    TransportStart {
        /// Transport that failed.
        transport: TransportKind,
        /// Inner cause.
        message: String,
    },

    /// The host has no implementation for this transport.
    #[error("Transport '{transport}' is not supported by the host")]
    TransportUnsupported {
        /// Transport that is unavailable.
        transport: TransportKind,
    },

    /// Every candidate was skipped or failed.
    #[error(
        "Unable to connect to '{url}' with any of the available transports{}",
        last_error_suffix(.last_error)
    )]
    NoTransportAvailable {
        /// Last negotiated URL.
        url: String,
        /// Error from the last candidate that was attempted, if any.
        last_error: Option<String>,
    },

    /// The requested transfer format is not supported by the transport.
    #[error("The '{format}' transfer format is not supported by the '{transport}' transport")]
    UnsupportedTransferFormat {
        /// Transport that rejected the format.
        transport: TransportKind,
        /// Requested format.
        format: TransferFormat,
    },

    // ========================================================================
    // Host Bridge Errors
    // ========================================================================
    /// An outbound host call failed.
    #[error("Host call '{operation}' failed: {message}")]
    Host {
        /// Host operation name.
        operation: String,
        /// Failure description.
        message: String,
    },

    /// The host reported an error through the error callback.
    #[error("Host reported error: {message}")]
    HostCallback {
        /// Message carried by the callback.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Error raised while tearing a transport down.
    ///
    /// Logged and swallowed by dispose.
    #[error("Error while stopping transport: {message}")]
    Stop {
        /// Failure description.
        message: String,
    },

    /// Operation requires a started connection.
    #[error("Connection has not been started")]
    NotStarted,

    /// Operation attempted on a disposed connection.
    #[error("Connection has been disposed")]
    UseAfterDispose,

    /// Connection or pipe closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// HTTP request failed below the status-code level.
    #[error("HTTP error: {message}")]
    Http {
        /// Failure description.
        message: String,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 payload could not be decoded.
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

/// Formats the optional trailing cause of [`Error::NoTransportAvailable`].
fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|e| format!(" (last error: {e})"))
        .unwrap_or_default()
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid URL error.
    #[inline]
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a negotiation error.
    #[inline]
    pub fn negotiation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Negotiation {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a redirect limit error.
    #[inline]
    pub fn redirect_limit_exceeded(url: impl Into<String>, limit: usize) -> Self {
        Self::RedirectLimitExceeded {
            url: url.into(),
            limit,
        }
    }

    /// Creates a transport start failure.
    #[inline]
    pub fn transport_start(transport: TransportKind, message: impl Into<String>) -> Self {
        Self::TransportStart {
            transport,
            message: message.into(),
        }
    }

    /// Creates a transport unsupported error.
    #[inline]
    pub fn transport_unsupported(transport: TransportKind) -> Self {
        Self::TransportUnsupported { transport }
    }

    /// Creates a no transport available error.
    #[inline]
    pub fn no_transport_available(url: impl Into<String>, last_error: Option<String>) -> Self {
        Self::NoTransportAvailable {
            url: url.into(),
            last_error,
        }
    }

    /// Creates an unsupported transfer format error.
    #[inline]
    pub fn unsupported_transfer_format(transport: TransportKind, format: TransferFormat) -> Self {
        Self::UnsupportedTransferFormat { transport, format }
    }

    /// Creates a host call error.
    #[inline]
    pub fn host(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Host {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a host callback error.
    #[inline]
    pub fn host_callback(message: impl Into<String>) -> Self {
        Self::HostCallback {
            message: message.into(),
        }
    }

    /// Creates a stop error.
    #[inline]
    pub fn stop(message: impl Into<String>) -> Self {
        Self::Stop {
            message: message.into(),
        }
    }

    /// Creates an HTTP error.
    #[inline]
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error ends a start attempt outright.
    ///
    /// These are the kinds surfaced by `HttpConnection::start`.
    #[inline]
    #[must_use]
    pub fn is_fatal_start_error(&self) -> bool {
        matches!(
            self,
            Self::Negotiation { .. }
                | Self::RedirectLimitExceeded { .. }
                | Self::NoTransportAvailable { .. }
                | Self::UnsupportedTransferFormat { .. }
        )
    }

    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed
                | Self::HostCallback { .. }
                | Self::Host { .. }
                | Self::WebSocket(_)
                | Self::Http { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on the next candidate or attempt.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TransportStart { .. } | Self::TransportUnsupported { .. } | Self::Http { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::negotiation("http://host/hub/negotiate", "status 500");
        assert_eq!(
            err.to_string(),
            "Negotiation with 'http://host/hub/negotiate' failed: status 500"
        );
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing url");
        assert_eq!(err.to_string(), "Configuration error: missing url");
    }

    #[test]
    fn test_no_transport_available_display() {
        let bare = Error::no_transport_available("http://host/hub", None);
        assert_eq!(
            bare.to_string(),
            "Unable to connect to 'http://host/hub' with any of the available transports"
        );

        let with_cause = Error::no_transport_available("http://host/hub", Some("boom".into()));
        assert!(with_cause.to_string().ends_with("(last error: boom)"));
    }

    #[test]
    fn test_unsupported_transfer_format_display() {
        let err = Error::unsupported_transfer_format(
            TransportKind::ServerSentEvents,
            TransferFormat::Binary,
        );
        assert_eq!(
            err.to_string(),
            "The 'Binary' transfer format is not supported by the 'ServerSentEvents' transport"
        );
    }

    #[test]
    fn test_is_fatal_start_error() {
        assert!(Error::redirect_limit_exceeded("http://a", 100).is_fatal_start_error());
        assert!(Error::no_transport_available("http://a", None).is_fatal_start_error());
        assert!(
            !Error::transport_start(TransportKind::WebSockets, "x").is_fatal_start_error()
        );
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::host_callback("reset").is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::transport_unsupported(TransportKind::LongPolling).is_recoverable());
        assert!(!Error::UseAfterDispose.is_recoverable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_url_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = url_err.into();
        assert!(matches!(err, Error::Url(_)));
    }
}
