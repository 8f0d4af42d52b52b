//! Scripted collaborators for unit tests.
//!
//! | Fake | Stands in for |
//! |------|---------------|
//! | [`FakeHost`] | [`HostRuntime`] with a recorded call log |
//! | [`FakeHttpClient`] | [`HttpClient`] with queued responses |
//! | [`FakeTransportFactory`] | [`TransportFactory`] with scripted start failures |

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::error::{Error, Result};
use crate::host::{CallbackRouter, HostRuntime};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::identifiers::TransportId;
use crate::pipe::{DuplexPipe, DuplexPipePair, PipeOptions};
use crate::protocol::{TransferFormat, TransportKind};
use crate::transport::{Transport, TransportFactory};

// ============================================================================
// Logging
// ============================================================================

/// Installs a test subscriber honoring `RUST_LOG`; repeated calls are ignored.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_target(false)
        .try_init();
}

// ============================================================================
// FakeHost
// ============================================================================

/// A call the adapter made into the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HostCall {
    OpenSocket { url: String, binary: bool },
    SendSocketFrame(Vec<u8>),
    CloseSocket,
    OpenEventStream { url: String },
    CloseEventStream,
}

/// In-memory host that opens immediately unless told otherwise.
pub(crate) struct FakeHost {
    router: Arc<CallbackRouter>,
    calls: Mutex<Vec<HostCall>>,
    auto_open: AtomicBool,
    fail_open: AtomicBool,
    fail_send: AtomicBool,
    socket_supported: AtomicBool,
    event_stream_supported: AtomicBool,
    send_delay: Mutex<Option<Duration>>,
}

impl FakeHost {
    pub(crate) fn new() -> Arc<Self> {
        init_tracing();
        Arc::new(Self {
            router: CallbackRouter::new(),
            calls: Mutex::new(Vec::new()),
            auto_open: AtomicBool::new(true),
            fail_open: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            socket_supported: AtomicBool::new(true),
            event_stream_supported: AtomicBool::new(true),
            send_delay: Mutex::new(None),
        })
    }

    pub(crate) fn router(&self) -> Arc<CallbackRouter> {
        Arc::clone(&self.router)
    }

    pub(crate) fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HostCall::SendSocketFrame(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn set_auto_open(&self, value: bool) {
        self.auto_open.store(value, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_open(&self, value: bool) {
        self.fail_open.store(value, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_send(&self, value: bool) {
        self.fail_send.store(value, Ordering::SeqCst);
    }

    pub(crate) fn set_socket_supported(&self, value: bool) {
        self.socket_supported.store(value, Ordering::SeqCst);
    }

    pub(crate) fn set_event_stream_supported(&self, value: bool) {
        self.event_stream_supported.store(value, Ordering::SeqCst);
    }

    pub(crate) fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock() = Some(delay);
    }

    /// Delivers `data` to the adapter registered under `id`.
    pub(crate) async fn deliver(&self, id: &TransportId, data: &[u8]) {
        self.router.on_message(id, BASE64.encode(data)).await;
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().push(call);
    }

    async fn open(&self, operation: &str, id: &TransportId) -> Result<()> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::host(operation, "refused by host"));
        }
        if self.auto_open.load(Ordering::SeqCst) {
            self.router.on_opened(id).await;
        }
        Ok(())
    }
}

#[async_trait]
impl HostRuntime for FakeHost {
    async fn open_socket(&self, url: &str, binary: bool, id: &TransportId) -> Result<()> {
        self.record(HostCall::OpenSocket {
            url: url.to_string(),
            binary,
        });
        self.open("open_socket", id).await
    }

    async fn send_socket_frame(&self, payload: &str, _id: &TransportId) -> Result<()> {
        self.record(HostCall::SendSocketFrame(BASE64.decode(payload)?));

        let delay = *self.send_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_send.load(Ordering::SeqCst) {
            return Err(Error::host("send_socket_frame", "send failed"));
        }
        Ok(())
    }

    async fn close_socket(&self, _id: &TransportId) -> Result<()> {
        self.record(HostCall::CloseSocket);
        Ok(())
    }

    async fn is_socket_supported(&self) -> Result<bool> {
        Ok(self.socket_supported.load(Ordering::SeqCst))
    }

    async fn open_event_stream(&self, url: &str, id: &TransportId) -> Result<()> {
        self.record(HostCall::OpenEventStream {
            url: url.to_string(),
        });
        self.open("open_event_stream", id).await
    }

    async fn close_event_stream(&self, _id: &TransportId) -> Result<()> {
        self.record(HostCall::CloseEventStream);
        Ok(())
    }

    async fn is_event_stream_supported(&self) -> Result<bool> {
        Ok(self.event_stream_supported.load(Ordering::SeqCst))
    }
}

// ============================================================================
// FakeHttpClient
// ============================================================================

/// Replays queued responses; answers `200` with an empty body when empty.
#[derive(Default)]
pub(crate) struct FakeHttpClient {
    script: Mutex<VecDeque<Result<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeHttpClient {
    pub(crate) fn new() -> Arc<Self> {
        init_tracing();
        Arc::new(Self::default())
    }

    pub(crate) fn push_response(&self, response: HttpResponse) {
        self.script.lock().push_back(Ok(response));
    }

    pub(crate) fn push_json(&self, body: serde_json::Value) {
        self.push_response(HttpResponse::new(200, body.to_string()));
    }

    pub(crate) fn push_error(&self, error: Error) {
        self.script.lock().push_back(Err(error));
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().push(request);
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(HttpResponse::new(200, "")))
    }
}

// ============================================================================
// FakeTransportFactory
// ============================================================================

/// Creates [`FakeTransport`]s and records what they were asked to do.
#[derive(Default)]
pub(crate) struct FakeTransportFactory {
    failing: Mutex<FxHashSet<TransportKind>>,
    created: Mutex<Vec<TransportKind>>,
    starts: Arc<Mutex<Vec<(TransportKind, String)>>>,
    stops: Arc<AtomicUsize>,
}

impl FakeTransportFactory {
    pub(crate) fn new() -> Arc<Self> {
        init_tracing();
        Arc::new(Self::default())
    }

    /// Makes every adapter of `kind` fail to start.
    pub(crate) fn fail(&self, kind: TransportKind) {
        self.failing.lock().insert(kind);
    }

    pub(crate) fn created(&self) -> Vec<TransportKind> {
        self.created.lock().clone()
    }

    /// Kinds and URLs of every start attempt, in order.
    pub(crate) fn starts(&self) -> Vec<(TransportKind, String)> {
        self.starts.lock().clone()
    }

    pub(crate) fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportFactory for FakeTransportFactory {
    async fn create(&self, kind: TransportKind) -> Result<Box<dyn Transport>> {
        self.created.lock().push(kind);
        Ok(Box::new(FakeTransport {
            kind,
            fail: self.failing.lock().contains(&kind),
            starts: Arc::clone(&self.starts),
            stops: Arc::clone(&self.stops),
            pipes: Mutex::new(None),
        }))
    }
}

/// Transport that either starts instantly or fails as scripted.
pub(crate) struct FakeTransport {
    kind: TransportKind,
    fail: bool,
    starts: Arc<Mutex<Vec<(TransportKind, String)>>>,
    stops: Arc<AtomicUsize>,
    pipes: Mutex<Option<DuplexPipePair>>,
}

#[async_trait]
impl Transport for FakeTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn start(&self, url: &Url, _format: TransferFormat) -> Result<()> {
        self.starts.lock().push((self.kind, url.to_string()));
        if self.fail {
            return Err(Error::transport_start(self.kind, "scripted failure"));
        }

        let pair = DuplexPipe::create_pair(PipeOptions::default(), PipeOptions::default());
        *self.pipes.lock() = Some(pair);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(pair) = self.pipes.lock().as_ref() {
            pair.application.complete();
            pair.transport.complete();
        }
        Ok(())
    }

    fn pipe(&self) -> Option<DuplexPipe> {
        self.pipes.lock().as_ref().map(|pair| pair.application.clone())
    }
}
