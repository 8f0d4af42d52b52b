//! Buffer thresholds for [`Pipe`](super::Pipe).

// ============================================================================
// Constants
// ============================================================================

/// Default buffered byte count at which writers suspend.
const DEFAULT_PAUSE_WRITER_THRESHOLD: usize = 64 * 1024;

/// Default buffered byte count at which suspended writers resume.
const DEFAULT_RESUME_WRITER_THRESHOLD: usize = 32 * 1024;

// ============================================================================
// PipeOptions
// ============================================================================

/// Backpressure thresholds of one pipe.
///
/// A writer that finds `pause_writer_threshold` bytes or more buffered
/// suspends until the reader has drained down to `resume_writer_threshold`.
/// A pause threshold of `0` disables backpressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeOptions {
    /// Buffered bytes at which writes suspend.
    pub pause_writer_threshold: usize,

    /// Buffered bytes at or below which suspended writes resume.
    pub resume_writer_threshold: usize,
}

impl PipeOptions {
    /// Creates options with explicit thresholds.
    ///
    /// The resume threshold is clamped to the pause threshold.
    #[inline]
    #[must_use]
    pub const fn new(pause_writer_threshold: usize, resume_writer_threshold: usize) -> Self {
        let resume = if resume_writer_threshold > pause_writer_threshold {
            pause_writer_threshold
        } else {
            resume_writer_threshold
        };
        Self {
            pause_writer_threshold,
            resume_writer_threshold: resume,
        }
    }

    /// Options with backpressure disabled.
    #[inline]
    #[must_use]
    pub const fn unbounded() -> Self {
        Self::new(0, 0)
    }

    /// Returns `true` if writes never suspend.
    #[inline]
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.pause_writer_threshold == 0
    }
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self::new(DEFAULT_PAUSE_WRITER_THRESHOLD, DEFAULT_RESUME_WRITER_THRESHOLD)
    }
}

// ============================================================================
// Tests
// ============================================================================
