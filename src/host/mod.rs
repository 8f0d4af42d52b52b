//! Host-callback boundary.
//!
//! Transport adapters never own a socket or event stream directly. They
//! call into a [`HostRuntime`] and learn about progress through callbacks
//! routed by identity token.
//!
//! # Call Surface
//!
//! | Adapter → Host | Host → Adapter |
//! |----------------|----------------|
//! | `open_socket(url, binary, id)` | `on_opened(id)` |
//! | `send_socket_frame(b64, id)` | `on_message(id, b64)` |
//! | `close_socket(id)` | `on_error(id, message)` |
//! | `open_event_stream(url, id)` | `on_closed(id)` |
//! | `close_event_stream(id)` | |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event_stream` | Incremental `text/event-stream` parser |
//! | `native` | [`NativeHost`] over tokio-tungstenite and reqwest |
//! | `pending` | [`PendingOperation`] completion handles |
//! | `router` | [`CallbackRouter`] identity table and [`HostCallbacks`] |
//! | `runtime` | [`HostRuntime`] trait |

// ============================================================================
// Submodules
// ============================================================================

/// Event stream parsing.
pub mod event_stream;

/// Native host runtime.
pub mod native;

/// Completion handles.
pub mod pending;

/// Callback routing.
pub mod router;

/// Host call surface.
pub mod runtime;

// ============================================================================
// Re-exports
// ============================================================================

pub use event_stream::EventStreamParser;
pub use native::NativeHost;
pub use pending::{Outcome, PendingOperation, PendingReceiver};
pub use router::{CallbackRouter, HostCallbacks, Registration};
pub use runtime::HostRuntime;
