//! Single-direction byte pipe with backpressure.
//!
//! A [`Pipe`] couples one [`PipeWriter`] to one [`PipeReader`] through a
//! shared buffer. Both handles are cheap clones of the same pipe so that a
//! second task can cancel a suspended read or flush; there is still only
//! one logical reader and one logical writer.
//!
//! # Semantics
//!
//! - [`PipeReader::read`] suspends while the buffer is empty and the writer
//!   is still open. It returns a snapshot of everything buffered; the caller
//!   consumes bytes with [`PipeReader::advance`].
//! - [`PipeWriter::write`] suspends while the buffer is at the pause
//!   threshold. A write that is canceled while suspended is discarded;
//!   bytes already buffered are never dropped.
//! - Completing the writer lets the reader drain what is buffered and then
//!   observe end-of-stream (or the completion error, once).

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use crate::error::{Error, Result};

use super::PipeOptions;

// ============================================================================
// Results
// ============================================================================

/// Outcome of [`PipeReader::read`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadResult {
    /// Bytes currently buffered (not yet consumed).
    pub buffer: Bytes,
    /// The read was ended by [`PipeReader::cancel_pending_read`].
    pub is_canceled: bool,
    /// The writer has completed; no bytes beyond `buffer` will arrive.
    pub is_completed: bool,
}

/// Outcome of [`PipeWriter::write`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushResult {
    /// The write was ended by [`PipeWriter::cancel_pending_flush`] and discarded.
    pub is_canceled: bool,
    /// The reader has completed; the write was discarded.
    pub is_completed: bool,
}

impl FlushResult {
    /// Returns `true` if the bytes were not accepted.
    #[inline]
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.is_canceled || self.is_completed
    }
}

// ============================================================================
// Shared State
// ============================================================================

#[derive(Default)]
struct PipeState {
    /// Front of the buffer, already handed to the reader.
    exposed: Bytes,
    /// Bytes written since the last read.
    pending: BytesMut,
    writer_completed: bool,
    writer_error: Option<Error>,
    reader_completed: bool,
    read_canceled: bool,
    flush_canceled: bool,
    writer_paused: bool,
}

impl PipeState {
    fn len(&self) -> usize {
        self.exposed.len() + self.pending.len()
    }

    fn is_empty(&self) -> bool {
        self.exposed.is_empty() && self.pending.is_empty()
    }

    /// Everything buffered, as one shared slice.
    ///
    /// Copies only when new bytes arrived behind unconsumed ones.
    fn snapshot(&mut self) -> Bytes {
        if !self.pending.is_empty() {
            let pending = self.pending.split().freeze();
            self.exposed = if self.exposed.is_empty() {
                pending
            } else {
                let mut merged = BytesMut::with_capacity(self.exposed.len() + pending.len());
                merged.extend_from_slice(&self.exposed);
                merged.extend_from_slice(&pending);
                merged.freeze()
            };
        }
        self.exposed.clone()
    }

    fn consume(&mut self, count: usize) {
        let from_exposed = count.min(self.exposed.len());
        self.exposed.advance(from_exposed);

        let from_pending = (count - from_exposed).min(self.pending.len());
        self.pending.advance(from_pending);
    }

    fn clear(&mut self) {
        self.exposed.clear();
        self.pending.clear();
    }
}

struct Shared {
    state: Mutex<PipeState>,
    readable: Notify,
    writable: Notify,
    options: PipeOptions,
}

impl Shared {
    /// Whether a write may append now, updating the pause latch.
    fn has_room(&self, state: &mut PipeState) -> bool {
        if self.options.is_unbounded() {
            return true;
        }

        let buffered = state.len();
        let room = if state.writer_paused {
            buffered <= self.options.resume_writer_threshold
        } else {
            buffered < self.options.pause_writer_threshold
        };

        state.writer_paused = !room;
        room
    }
}

// ============================================================================
// Pipe
// ============================================================================

/// A reader/writer pair over one buffer.
pub struct Pipe {
    /// Consuming end.
    pub reader: PipeReader,
    /// Producing end.
    pub writer: PipeWriter,
}

impl Pipe {
    /// Creates a pipe with the given thresholds.
    #[must_use]
    pub fn new(options: PipeOptions) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(PipeState::default()),
            readable: Notify::new(),
            writable: Notify::new(),
            options,
        });

        Self {
            reader: PipeReader {
                shared: Arc::clone(&shared),
            },
            writer: PipeWriter { shared },
        }
    }
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe")
            .field("buffered", &self.reader.buffered())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PipeReader
// ============================================================================

/// Consuming end of a [`Pipe`].
#[derive(Clone)]
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Waits for buffered bytes, writer completion, or cancellation.
    ///
    /// # Errors
    ///
    /// - The writer's completion error, once, after the buffer is drained
    /// - [`Error::ConnectionClosed`] if this reader was already completed
    pub async fn read(&self) -> Result<ReadResult> {
        loop {
            {
                let mut state = self.shared.state.lock();

                if state.reader_completed {
                    return Err(Error::ConnectionClosed);
                }

                if state.read_canceled {
                    state.read_canceled = false;
                    return Ok(ReadResult {
                        buffer: state.snapshot(),
                        is_canceled: true,
                        is_completed: false,
                    });
                }

                if !state.is_empty() || state.writer_completed {
                    if state.is_empty()
                        && let Some(error) = state.writer_error.take()
                    {
                        return Err(error);
                    }

                    return Ok(ReadResult {
                        buffer: state.snapshot(),
                        is_canceled: false,
                        is_completed: state.writer_completed,
                    });
                }
            }

            self.shared.readable.notified().await;
        }
    }

    /// Consumes `count` bytes from the front of the buffer.
    ///
    /// Wakes a writer suspended on backpressure.
    pub fn advance(&self, count: usize) {
        {
            let mut state = self.shared.state.lock();
            state.consume(count);
        }
        self.shared.writable.notify_one();
    }

    /// Ends the pending read (or the next one) with `is_canceled` set.
    pub fn cancel_pending_read(&self) {
        self.shared.state.lock().read_canceled = true;
        self.shared.readable.notify_one();
    }

    /// Marks the reader done; further writes are discarded.
    pub fn complete(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.reader_completed {
                return;
            }
            state.reader_completed = true;
            state.clear();
        }
        trace!("Pipe reader completed");
        self.shared.writable.notify_one();
    }

    /// Number of bytes buffered and not yet consumed.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.shared.state.lock().len()
    }

    /// Returns `true` once the writer has completed.
    #[inline]
    #[must_use]
    pub fn is_writer_completed(&self) -> bool {
        self.shared.state.lock().writer_completed
    }
}

impl fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeReader")
            .field("buffered", &self.buffered())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PipeWriter
// ============================================================================

/// Producing end of a [`Pipe`].
#[derive(Clone)]
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Appends `data`, suspending first while the buffer is at capacity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if this writer was already
    /// completed.
    pub async fn write(&self, data: &[u8]) -> Result<FlushResult> {
        loop {
            {
                let mut state = self.shared.state.lock();

                if state.writer_completed {
                    return Err(Error::ConnectionClosed);
                }

                if state.flush_canceled {
                    state.flush_canceled = false;
                    return Ok(FlushResult {
                        is_canceled: true,
                        is_completed: false,
                    });
                }

                if state.reader_completed {
                    return Ok(FlushResult {
                        is_canceled: false,
                        is_completed: true,
                    });
                }

                if self.shared.has_room(&mut state) {
                    state.pending.extend_from_slice(data);
                    drop(state);
                    self.shared.readable.notify_one();
                    return Ok(FlushResult::default());
                }
            }

            trace!("Pipe writer paused on backpressure");
            self.shared.writable.notified().await;
        }
    }

    /// Ends the pending write (or the next one) with `is_canceled` set.
    pub fn cancel_pending_flush(&self) {
        self.shared.state.lock().flush_canceled = true;
        self.shared.writable.notify_one();
    }

    /// Marks the writer done, optionally with a terminal error.
    ///
    /// The reader sees the buffered bytes first, then end-of-stream.
    /// Completing twice keeps the first outcome.
    pub fn complete(&self, error: Option<Error>) {
        {
            let mut state = self.shared.state.lock();
            if state.writer_completed {
                return;
            }
            state.writer_completed = true;
            state.writer_error = error;
        }
        trace!("Pipe writer completed");
        self.shared.readable.notify_one();
    }

    /// Returns `true` once the reader has completed.
    #[inline]
    #[must_use]
    pub fn is_reader_completed(&self) -> bool {
        self.shared.state.lock().reader_completed
    }
}

impl fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeWriter").finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::time::timeout;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_write_then_read() {
        let pipe = Pipe::new(PipeOptions::default());
        pipe.writer.write(b"hello").await.unwrap();

        let result = pipe.reader.read().await.unwrap();
        assert_eq!(&result.buffer[..], b"hello");
        assert!(!result.is_canceled);
        assert!(!result.is_completed);

        pipe.reader.advance(result.buffer.len());
        assert_eq!(pipe.reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_rereading_shares_the_buffer() {
        let pipe = Pipe::new(PipeOptions::default());
        pipe.writer.write(b"frame").await.unwrap();

        let first = pipe.reader.read().await.unwrap();
        let second = pipe.reader.read().await.unwrap();
        assert_eq!(first.buffer.as_ptr(), second.buffer.as_ptr());
    }

    #[tokio::test]
    async fn test_partial_advance_keeps_order_across_writes() {
        let pipe = Pipe::new(PipeOptions::default());
        pipe.writer.write(b"abc").await.unwrap();

        let read = pipe.reader.read().await.unwrap();
        assert_eq!(&read.buffer[..], b"abc");
        pipe.reader.advance(1);

        pipe.writer.write(b"de").await.unwrap();
        let read = pipe.reader.read().await.unwrap();
        assert_eq!(&read.buffer[..], b"bcde");

        pipe.reader.advance(4);
        assert_eq!(pipe.reader.buffered(), 0);
    }

    #[test]
    fn test_pending_read_is_woken_by_write() {
        let pipe = Pipe::new(PipeOptions::default());
        let mut read = tokio_test::task::spawn(pipe.reader.read());
        tokio_test::assert_pending!(read.poll());

        let mut write = tokio_test::task::spawn(pipe.writer.write(b"x"));
        tokio_test::assert_ready_ok!(write.poll());

        assert!(read.is_woken());
        let result = tokio_test::assert_ready_ok!(read.poll());
        assert_eq!(&result.buffer[..], b"x");
    }

    #[test]
    fn test_paused_writer_is_woken_by_advance() {
        let pipe = Pipe::new(PipeOptions::new(4, 0));
        let mut first = tokio_test::task::spawn(pipe.writer.write(b"1234"));
        tokio_test::assert_ready_ok!(first.poll());

        let mut second = tokio_test::task::spawn(pipe.writer.write(b"5"));
        tokio_test::assert_pending!(second.poll());

        pipe.reader.advance(4);
        assert!(second.is_woken());
        let flush = tokio_test::assert_ready_ok!(second.poll());
        assert!(!flush.is_rejected());
        assert_eq!(pipe.reader.buffered(), 1);
    }

    #[tokio::test]
    async fn test_read_suspends_until_write() {
        let pipe = Pipe::new(PipeOptions::default());
        assert!(timeout(SHORT, pipe.reader.read()).await.is_err());

        let writer = pipe.writer.clone();
        tokio::spawn(async move {
            writer.write(b"late").await.unwrap();
        });

        let result = pipe.reader.read().await.unwrap();
        assert_eq!(&result.buffer[..], b"late");
    }

    #[tokio::test]
    async fn test_completion_drains_then_ends() {
        let pipe = Pipe::new(PipeOptions::default());
        pipe.writer.write(b"tail").await.unwrap();
        pipe.writer.complete(None);

        let first = pipe.reader.read().await.unwrap();
        assert_eq!(&first.buffer[..], b"tail");
        assert!(first.is_completed);
        pipe.reader.advance(first.buffer.len());

        let second = pipe.reader.read().await.unwrap();
        assert!(second.buffer.is_empty());
        assert!(second.is_completed);
    }

    #[tokio::test]
    async fn test_completion_error_surfaces_after_drain() {
        let pipe = Pipe::new(PipeOptions::default());
        pipe.writer.write(b"x").await.unwrap();
        pipe.writer.complete(Some(Error::host_callback("reset")));

        let first = pipe.reader.read().await.unwrap();
        assert_eq!(&first.buffer[..], b"x");
        pipe.reader.advance(1);

        let err = pipe.reader.read().await.unwrap_err();
        assert!(matches!(err, Error::HostCallback { .. }));

        let after = pipe.reader.read().await.unwrap();
        assert!(after.is_completed);
    }

    #[tokio::test]
    async fn test_cancel_pending_read_unblocks_reader() {
        let pipe = Pipe::new(PipeOptions::default());
        let reader = pipe.reader.clone();
        let pending = tokio::spawn(async move { reader.read().await });

        tokio::task::yield_now().await;
        pipe.reader.cancel_pending_read();

        let result = pending.await.unwrap().unwrap();
        assert!(result.is_canceled);
        assert!(!result.is_completed);
    }

    #[tokio::test]
    async fn test_cancel_before_read_applies_to_next_read() {
        let pipe = Pipe::new(PipeOptions::default());
        pipe.writer.write(b"kept").await.unwrap();
        pipe.reader.cancel_pending_read();

        let canceled = pipe.reader.read().await.unwrap();
        assert!(canceled.is_canceled);

        let next = pipe.reader.read().await.unwrap();
        assert!(!next.is_canceled);
        assert_eq!(&next.buffer[..], b"kept");
    }

    #[tokio::test]
    async fn test_backpressure_suspends_writer_until_drained() {
        let pipe = Pipe::new(PipeOptions::new(4, 2));
        pipe.writer.write(b"abcd").await.unwrap();

        let writer = pipe.writer.clone();
        let blocked = tokio::spawn(async move { writer.write(b"ef").await });
        tokio::task::yield_now().await;
        assert!(!blocked.is_finished());

        // Draining to 3 bytes is still above the resume threshold.
        pipe.reader.advance(1);
        tokio::task::yield_now().await;
        assert!(!blocked.is_finished());

        pipe.reader.advance(1);
        let flush = blocked.await.unwrap().unwrap();
        assert!(!flush.is_rejected());

        let result = pipe.reader.read().await.unwrap();
        assert_eq!(&result.buffer[..], b"cdef");
    }

    #[tokio::test]
    async fn test_cancel_pending_flush_discards_only_the_suspended_write() {
        let pipe = Pipe::new(PipeOptions::new(2, 0));
        pipe.writer.write(b"ab").await.unwrap();

        let writer = pipe.writer.clone();
        let blocked = tokio::spawn(async move { writer.write(b"zz").await });
        tokio::task::yield_now().await;

        pipe.writer.cancel_pending_flush();
        let flush = blocked.await.unwrap().unwrap();
        assert!(flush.is_canceled);

        let result = pipe.reader.read().await.unwrap();
        assert_eq!(&result.buffer[..], b"ab");
    }

    #[tokio::test]
    async fn test_reader_complete_rejects_writes() {
        let pipe = Pipe::new(PipeOptions::new(1, 0));
        pipe.writer.write(b"a").await.unwrap();

        let writer = pipe.writer.clone();
        let blocked = tokio::spawn(async move { writer.write(b"b").await });
        tokio::task::yield_now().await;

        pipe.reader.complete();
        let flush = blocked.await.unwrap().unwrap();
        assert!(flush.is_completed);
        assert!(pipe.writer.is_reader_completed());
    }

    #[tokio::test]
    async fn test_write_after_complete_fails() {
        let pipe = Pipe::new(PipeOptions::default());
        pipe.writer.complete(None);
        assert!(matches!(
            pipe.writer.write(b"late").await,
            Err(Error::ConnectionClosed)
        ));
        assert!(pipe.reader.is_writer_completed());
    }
}
