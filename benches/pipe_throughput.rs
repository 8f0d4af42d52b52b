//! Duplex pipe throughput benchmark suite.
//!
//! Pushes a fixed payload through one pipe direction at different chunk
//! sizes, with a concurrent reader draining the other end:
//! - Chunk sizes: 64 B, 4 KiB, 64 KiB
//! - Payload: 4 MiB per iteration
//!
//! Run with: cargo bench --bench pipe_throughput
//! Results saved to: target/criterion/

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use signalr_transport_bridge::{DuplexPipe, PipeOptions};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const CHUNK_SIZES: &[usize] = &[64, 4 * 1024, 64 * 1024];
const PAYLOAD_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// Benchmark: Bounded Pipe
// ============================================================================

fn bench_bounded(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let mut group = c.benchmark_group("pipe_bounded");
    group.throughput(Throughput::Bytes(PAYLOAD_BYTES as u64));

    for &chunk in CHUNK_SIZES {
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &chunk, |b, &chunk| {
            b.to_async(&rt)
                .iter(|| transfer(PipeOptions::default(), chunk));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Unbounded Pipe
// ============================================================================

fn bench_unbounded(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let mut group = c.benchmark_group("pipe_unbounded");
    group.throughput(Throughput::Bytes(PAYLOAD_BYTES as u64));

    for &chunk in CHUNK_SIZES {
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &chunk, |b, &chunk| {
            b.to_async(&rt)
                .iter(|| transfer(PipeOptions::unbounded(), chunk));
        });
    }

    group.finish();
}

// ============================================================================
// Helpers
// ============================================================================

/// Writes `PAYLOAD_BYTES` in `chunk`-sized writes and drains them.
async fn transfer(options: PipeOptions, chunk: usize) -> usize {
    let pair = DuplexPipe::create_pair(options, options);
    let reader = pair.transport.input.clone();

    let drain = tokio::spawn(async move {
        let mut total = 0;
        loop {
            let read = reader.read().await.expect("read");
            let len = read.buffer.len();
            reader.advance(len);
            total += len;
            if read.is_completed && len == 0 {
                break;
            }
        }
        total
    });

    let data = vec![0x5a_u8; chunk];
    let mut written = 0;
    while written < PAYLOAD_BYTES {
        pair.application.output.write(&data).await.expect("write");
        written += chunk;
    }
    pair.application.output.complete(None);

    drain.await.expect("drain task")
}

criterion_group!(benches, bench_bounded, bench_unbounded);
criterion_main!(benches);
