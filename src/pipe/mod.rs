//! Duplex byte pipes.
//!
//! Every transport adapter exposes its connection as a [`DuplexPipe`]
//! regardless of how the underlying transport delivers bytes.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | Single-direction [`Pipe`] with backpressure and cancellation |
//! | `duplex` | [`DuplexPipe`] ends and [`DuplexPipePair`] |
//! | `options` | [`PipeOptions`] thresholds |

// ============================================================================
// Submodules
// ============================================================================

/// Single-direction pipe.
pub mod core;

/// Coupled pipe pairs.
pub mod duplex;

/// Buffer thresholds.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{FlushResult, Pipe, PipeReader, PipeWriter, ReadResult};
pub use duplex::{DuplexPipe, DuplexPipePair};
pub use options::PipeOptions;
