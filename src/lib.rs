//! SignalR-style client connection layer.
//!
//! Negotiates with a server, picks a working transport, and exposes it as
//! a uniform duplex byte stream no matter which transport won.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐  negotiate   ┌────────────┐
//! │ HttpConnection │─────────────►│ HttpClient │
//! │                │              └────────────┘
//! │                │  start/stop  ┌───────────────────┐  host calls  ┌─────────────┐
//! │                │─────────────►│ dyn Transport     │─────────────►│ HostRuntime │
//! │                │◄─────────────│  WebSockets / SSE │◄─────────────│             │
//! └────────────────┘  DuplexPipe  └───────────────────┘  callbacks   └─────────────┘
//! ```
//!
//! Key design principles:
//!
//! - Host I/O is callback-driven; adapters arm one [`PendingOperation`] per
//!   expected callback and bridge payloads into a [`DuplexPipe`]
//! - Callbacks are routed by identity token through a [`CallbackRouter`]
//!   owned by whoever registers the host surface
//! - Sends to the host are strictly serialized per adapter
//! - Candidate start failures fall back to the next advertised transport
//!
//! # Quick Start
//!
//! ```no_run
//! use signalr_transport_bridge::{HttpConnection, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let connection = HttpConnection::builder("http://localhost:5000/chathub").build()?;
//!     connection.start().await?;
//!
//!     let pipe = connection.pipe()?;
//!     pipe.output.write(b"{\"protocol\":\"json\",\"version\":1}\x1e").await?;
//!
//!     let result = pipe.input.read().await?;
//!     println!("received {} bytes", result.buffer.len());
//!     pipe.input.advance(result.buffer.len());
//!
//!     connection.dispose().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`connection`] | [`HttpConnection`], options, negotiation and transport selection |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`host`] | Host-callback surface and the native tokio host |
//! | [`http`] | Request/response shim and its decorators |
//! | [`identifiers`] | Identity tokens and connection ids |
//! | [`pipe`] | Bounded duplex byte pipes |
//! | [`protocol`] | Negotiation wire types and URL construction |
//! | [`transport`] | WebSocket and server-sent events adapters |

// ============================================================================
// Modules
// ============================================================================

/// Connection orchestration.
///
/// Use [`HttpConnection::builder()`] to create a configured connection.
pub mod connection;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Host runtime bridge.
pub mod host;

/// Request/response shim.
pub mod http;

/// Type-safe identifiers.
pub mod identifiers;

/// Duplex byte pipes with backpressure.
pub mod pipe;

/// Negotiation wire types.
pub mod protocol;

/// Transport adapters.
pub mod transport;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Connection types
pub use connection::{
    ConnectionOptions, ConnectionState, HttpConnection, HttpConnectionBuilder, NegotiationClient,
    TransportFailure,
};

// Error types
pub use error::{Error, Result};

// Host types
pub use host::{CallbackRouter, HostCallbacks, HostRuntime, NativeHost, PendingOperation};

// HTTP types
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};

// Identifier types
pub use identifiers::{ConnectionId, TransportId};

// Pipe types
pub use pipe::{DuplexPipe, PipeOptions, PipeReader, PipeWriter};

// Protocol types
pub use protocol::{NegotiationResponse, TransferFormat, TransportKind, TransportSet};

// Transport types
pub use transport::{
    HostTransportFactory, ServerSentEventsTransport, Transport, TransportFactory, TransportState,
    WebSocketTransport,
};
