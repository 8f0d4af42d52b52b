//! Coupled pipe pairs.
//!
//! ```text
//!   transport.output ──► [ pipe A ] ──► application.input
//!   transport.input  ◄── [ pipe B ] ◄── application.output
//! ```
//!
//! The transport end is driven by an adapter; the application end is
//! handed to the connection consumer.

// ============================================================================
// Imports
// ============================================================================

use super::{Pipe, PipeOptions, PipeReader, PipeWriter};

// ============================================================================
// DuplexPipe
// ============================================================================

/// One end of a bidirectional byte stream.
#[derive(Debug, Clone)]
pub struct DuplexPipe {
    /// Bytes arriving at this end.
    pub input: PipeReader,
    /// Bytes leaving this end.
    pub output: PipeWriter,
}

impl DuplexPipe {
    /// Creates a connected pair of ends.
    ///
    /// `input_options` governs the pipe carrying application-to-transport
    /// bytes, `output_options` the pipe carrying transport-to-application
    /// bytes.
    #[must_use]
    pub fn create_pair(input_options: PipeOptions, output_options: PipeOptions) -> DuplexPipePair {
        let input = Pipe::new(input_options);
        let output = Pipe::new(output_options);

        DuplexPipePair {
            transport: Self {
                input: input.reader,
                output: output.writer,
            },
            application: Self {
                input: output.reader,
                output: input.writer,
            },
        }
    }

    /// Completes both directions of this end.
    pub fn complete(&self) {
        self.output.complete(None);
        self.input.complete();
    }
}

// ============================================================================
// DuplexPipePair
// ============================================================================

/// Both ends of a freshly created duplex stream.
#[derive(Debug, Clone)]
pub struct DuplexPipePair {
    /// End driven by the transport adapter.
    pub transport: DuplexPipe,
    /// End handed to the connection consumer.
    pub application: DuplexPipe,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use proptest::prelude::*;
    use tokio::time::timeout;

    /// Writes all chunks on `writer` while draining `reader` concurrently.
    async fn pump(chunks: Vec<Vec<u8>>, writer: PipeWriter, reader: PipeReader) -> Vec<u8> {
        let producer = tokio::spawn(async move {
            for chunk in chunks {
                let flush = writer.write(&chunk).await.unwrap();
                assert!(!flush.is_rejected());
            }
            writer.complete(None);
        });

        let mut received = Vec::new();
        loop {
            let result = reader.read().await.unwrap();
            received.extend_from_slice(&result.buffer);
            reader.advance(result.buffer.len());
            if result.is_completed {
                break;
            }
        }

        producer.await.unwrap();
        received
    }

    proptest! {
        #[test]
        fn prop_any_chunking_round_trips_both_directions(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..32),
        ) {
            let expected: Vec<u8> = chunks.concat();
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let (to_app, to_transport) = runtime.block_on(async {
                let pair = DuplexPipe::create_pair(PipeOptions::new(16, 8), PipeOptions::new(16, 8));
                let to_app = pump(
                    chunks.clone(),
                    pair.transport.output.clone(),
                    pair.application.input.clone(),
                )
                .await;
                let to_transport = pump(
                    chunks.clone(),
                    pair.application.output.clone(),
                    pair.transport.input.clone(),
                )
                .await;
                (to_app, to_transport)
            });

            prop_assert_eq!(&to_app, &expected);
            prop_assert_eq!(&to_transport, &expected);
        }
    }

    #[tokio::test]
    async fn test_cancellation_unblocks_both_sides_without_losing_bytes() {
        let pair = DuplexPipe::create_pair(PipeOptions::new(4, 0), PipeOptions::new(4, 0));

        // Fill the transport-to-application pipe so the next write suspends.
        pair.transport.output.write(b"1234").await.unwrap();
        let writer = pair.transport.output.clone();
        let blocked_write = tokio::spawn(async move { writer.write(b"5678").await });

        // Suspend a read on the (empty) application-to-transport pipe.
        let reader = pair.transport.input.clone();
        let blocked_read = tokio::spawn(async move { reader.read().await });

        tokio::task::yield_now().await;
        pair.transport.input.cancel_pending_read();
        pair.transport.output.cancel_pending_flush();

        let read = timeout(Duration::from_secs(1), blocked_read)
            .await
            .expect("read unblocked")
            .unwrap()
            .unwrap();
        assert!(read.is_canceled);

        let flush = timeout(Duration::from_secs(1), blocked_write)
            .await
            .expect("write unblocked")
            .unwrap()
            .unwrap();
        assert!(flush.is_canceled);

        // Already-buffered bytes are intact and not duplicated.
        let delivered = pair.application.input.read().await.unwrap();
        assert_eq!(&delivered.buffer[..], b"1234");
    }

    #[tokio::test]
    async fn test_complete_end_signals_peer() {
        let pair = DuplexPipe::create_pair(PipeOptions::default(), PipeOptions::default());
        pair.application.complete();

        let result = pair.transport.input.read().await.unwrap();
        assert!(result.is_completed);
        assert!(pair.transport.output.is_reader_completed());
    }
}
