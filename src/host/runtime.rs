//! Outbound host call surface.
//!
//! The host runtime owns the real socket and event-stream objects. Every
//! call names the adapter through its [`TransportId`]; the host answers
//! asynchronously through the [`CallbackRouter`](super::CallbackRouter).

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;
use crate::identifiers::TransportId;

// ============================================================================
// HostRuntime
// ============================================================================

/// Calls the adapters make into the host.
///
/// Payloads cross the boundary base64-encoded.
#[async_trait]
pub trait HostRuntime: Send + Sync {
    /// Opens a socket to `url`; the host later calls `on_opened` or `on_error`.
    async fn open_socket(&self, url: &str, binary: bool, id: &TransportId) -> Result<()>;

    /// Sends one frame on the socket identified by `id`.
    async fn send_socket_frame(&self, payload: &str, id: &TransportId) -> Result<()>;

    /// Closes the socket identified by `id`; unknown ids are ignored.
    async fn close_socket(&self, id: &TransportId) -> Result<()>;

    /// Returns `true` if the host can open sockets.
    async fn is_socket_supported(&self) -> Result<bool>;

    /// Opens a server-push event stream to `url`.
    async fn open_event_stream(&self, url: &str, id: &TransportId) -> Result<()>;

    /// Closes the event stream identified by `id`; unknown ids are ignored.
    async fn close_event_stream(&self, id: &TransportId) -> Result<()>;

    /// Returns `true` if the host can open event streams.
    async fn is_event_stream_supported(&self) -> Result<bool>;
}
