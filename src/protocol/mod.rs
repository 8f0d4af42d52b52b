//! Wire-level vocabulary shared by negotiation and transports.
//!
//! # Negotiation Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | `POST {url}/negotiate` | Client → Server | Empty handshake request |
//! | [`NegotiationResponse`] | Server → Client | Connection id, redirect, transports |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `endpoint` | Negotiate, connect and socket URL construction |
//! | `negotiate` | Negotiation response types |
//! | `transfer` | Transfer formats, transport kinds and sets |

// ============================================================================
// Submodules
// ============================================================================

/// Endpoint URL construction.
pub mod endpoint;

/// Negotiation response types.
pub mod negotiate;

/// Transfer formats and transport kinds.
pub mod transfer;

// ============================================================================
// Re-exports
// ============================================================================

pub use negotiate::{AvailableTransport, NegotiationResponse};
pub use transfer::{TransferFormat, TransportKind, TransportSet};
