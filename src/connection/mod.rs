//! Connection orchestration.
//!
//! # Start Sequence
//!
//! ```text
//! resolve URL ─► negotiate (follow redirects) ─► for each advertised transport:
//!                                                   skip unknown / disabled / wrong format
//!                                                   re-negotiate if the last attempt failed
//!                                                   create + start adapter
//!                                                ─► first success wins
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`HttpConnectionBuilder`] |
//! | `core` | [`HttpConnection`] lifecycle |
//! | `negotiate` | [`NegotiationClient`] and redirect handling |
//! | `options` | [`ConnectionOptions`] |
//! | `selector` | [`TransportSelector`] fallback policy |

// ============================================================================
// Submodules
// ============================================================================

/// Connection builder.
pub mod builder;

/// Connection orchestrator.
pub mod core;

/// Negotiation handshake.
pub mod negotiate;

/// Connection configuration.
pub mod options;

/// Transport candidate selection.
pub mod selector;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::HttpConnectionBuilder;
pub use self::core::{ConnectionState, HttpConnection};
pub use negotiate::{MAX_REDIRECTS, Negotiated, NegotiationClient};
pub use options::ConnectionOptions;
pub use selector::{
    Selection, SkipReason, TransportCandidate, TransportFailure, TransportSelector,
};
