//! Native host runtime.
//!
//! Implements [`HostRuntime`] outside a browser: sockets through
//! `tokio-tungstenite`, event streams through a streaming `reqwest` GET.
//! Notifications are delivered through the shared [`CallbackRouter`].
//!
//! # Socket Tasks
//!
//! Each open socket runs two tokio tasks:
//!
//! - a reader that forwards incoming frames to `on_message` (awaiting the
//!   adapter, so backpressure reaches the socket)
//! - a writer that executes [`SocketCommand`]s one at a time
//!
//! Keeping them apart means a reader suspended on backpressure never
//! stalls outbound sends.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use reqwest::header;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::TransportId;

use super::event_stream::EventStreamParser;
use super::{CallbackRouter, HostRuntime};

// ============================================================================
// Constants
// ============================================================================

/// Time a socket's writer gets to send the close frame before it is aborted.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Types
// ============================================================================

/// Commands for a socket's writer task.
enum SocketCommand {
    /// Send one frame and report the outcome.
    Send {
        frame: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Send a close frame and stop.
    Close,
}

/// Handles of one open socket.
struct NativeSocket {
    commands: mpsc::UnboundedSender<SocketCommand>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl NativeSocket {
    fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

// ============================================================================
// NativeHost
// ============================================================================

/// [`HostRuntime`] backed by tokio networking.
pub struct NativeHost {
    router: Arc<CallbackRouter>,
    http: reqwest::Client,
    sockets: Mutex<FxHashMap<TransportId, NativeSocket>>,
    streams: Mutex<FxHashMap<TransportId, JoinHandle<()>>>,
}

impl NativeHost {
    /// Creates a host that reports through `router`.
    #[must_use]
    pub fn new(router: Arc<CallbackRouter>) -> Self {
        Self::with_client(router, reqwest::Client::new())
    }

    /// Creates a host using a preconfigured HTTP client for event streams.
    #[must_use]
    pub fn with_client(router: Arc<CallbackRouter>, http: reqwest::Client) -> Self {
        Self {
            router,
            http,
            sockets: Mutex::new(FxHashMap::default()),
            streams: Mutex::new(FxHashMap::default()),
        }
    }

    /// Number of sockets currently open.
    #[inline]
    #[must_use]
    pub fn socket_count(&self) -> usize {
        self.sockets.lock().len()
    }

    /// Number of event streams currently open.
    #[inline]
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }
}

impl Drop for NativeHost {
    fn drop(&mut self) {
        for (_, socket) in self.sockets.get_mut().drain() {
            socket.abort();
        }
        for (_, task) in self.streams.get_mut().drain() {
            task.abort();
        }
    }
}

impl fmt::Debug for NativeHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHost")
            .field("sockets", &self.socket_count())
            .field("streams", &self.stream_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// NativeHost - HostRuntime
// ============================================================================

#[async_trait]
impl HostRuntime for NativeHost {
    async fn open_socket(&self, url: &str, binary: bool, id: &TransportId) -> Result<()> {
        let id = *id;
        let (ws_stream, _) = connect_async(url).await?;
        let (ws_write, ws_read) = ws_stream.split();

        debug!(transport_id = %id, url, binary, "Native socket connected");

        let (commands, command_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(Self::run_writer(ws_write, command_rx, binary, id));

        let router = Arc::clone(&self.router);
        let reader = tokio::spawn(Self::run_reader(ws_read, router, id));

        let replaced = self.sockets.lock().insert(
            id,
            NativeSocket {
                commands,
                reader,
                writer,
            },
        );
        if let Some(stale) = replaced {
            stale.abort();
        }

        Ok(())
    }

    async fn send_socket_frame(&self, payload: &str, id: &TransportId) -> Result<()> {
        let frame = BASE64.decode(payload)?;
        let (reply, reply_rx) = oneshot::channel();

        {
            let sockets = self.sockets.lock();
            let socket = sockets
                .get(id)
                .ok_or_else(|| Error::host("send_socket_frame", "Unknown connection"))?;
            socket
                .commands
                .send(SocketCommand::Send { frame, reply })
                .map_err(|_| Error::ConnectionClosed)?;
        }

        reply_rx.await?
    }

    async fn close_socket(&self, id: &TransportId) -> Result<()> {
        let Some(socket) = self.sockets.lock().remove(id) else {
            return Ok(());
        };

        // Detach the reader first so no callbacks fire after close.
        socket.reader.abort();
        let _ = socket.commands.send(SocketCommand::Close);

        let mut writer = socket.writer;
        if timeout(CLOSE_TIMEOUT, &mut writer).await.is_err() {
            warn!(transport_id = %id, "Native socket writer did not finish closing; aborting");
            writer.abort();
        }

        debug!(transport_id = %id, "Native socket closed");
        Ok(())
    }

    async fn is_socket_supported(&self) -> Result<bool> {
        Ok(true)
    }

    async fn open_event_stream(&self, url: &str, id: &TransportId) -> Result<()> {
        let id = *id;
        let response = self
            .http
            .get(url)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| Error::host("open_event_stream", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::host(
                "open_event_stream",
                format!("unexpected status {status}"),
            ));
        }

        debug!(transport_id = %id, url, "Native event stream connected");

        let router = Arc::clone(&self.router);
        let task = tokio::spawn(Self::run_event_stream(response, router, id));
        self.streams.lock().insert(id, task);

        Ok(())
    }

    async fn close_event_stream(&self, id: &TransportId) -> Result<()> {
        if let Some(task) = self.streams.lock().remove(id) {
            task.abort();
            debug!(transport_id = %id, "Native event stream closed");
        }
        Ok(())
    }

    async fn is_event_stream_supported(&self) -> Result<bool> {
        Ok(true)
    }
}

// ============================================================================
// NativeHost - Tasks
// ============================================================================

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

impl NativeHost {
    /// Forwards incoming frames to the adapter.
    async fn run_reader(
        mut ws_read: futures_util::stream::SplitStream<WsStream>,
        router: Arc<CallbackRouter>,
        id: TransportId,
    ) {
        router.on_opened(&id).await;

        loop {
            match ws_read.next().await {
                Some(Ok(Message::Text(text))) => {
                    router.on_message(&id, BASE64.encode(text.as_bytes())).await;
                }

                Some(Ok(Message::Binary(data))) => {
                    router.on_message(&id, BASE64.encode(&data)).await;
                }

                Some(Ok(Message::Close(_))) | None => {
                    debug!(transport_id = %id, "Native socket closed by remote");
                    router.on_closed(&id).await;
                    break;
                }

                Some(Err(e)) => {
                    error!(transport_id = %id, error = %e, "Native socket error");
                    router.on_error(&id, e.to_string()).await;
                    break;
                }

                // Ping/Pong handled by tungstenite
                Some(Ok(_)) => {}
            }
        }

        trace!(transport_id = %id, "Native socket reader terminated");
    }

    /// Executes send and close commands in order.
    async fn run_writer(
        mut ws_write: futures_util::stream::SplitSink<WsStream, Message>,
        mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
        binary: bool,
        id: TransportId,
    ) {
        while let Some(command) = command_rx.recv().await {
            match command {
                SocketCommand::Send { frame, reply } => {
                    let result = Self::encode_frame(frame, binary);
                    let result = match result {
                        Ok(message) => ws_write.send(message).await.map_err(Error::from),
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(result);
                }

                SocketCommand::Close => {
                    if let Err(e) = ws_write.close().await {
                        warn!(transport_id = %id, error = %e, "Failed to close native socket");
                    }
                    break;
                }
            }
        }

        trace!(transport_id = %id, "Native socket writer terminated");
    }

    fn encode_frame(frame: Vec<u8>, binary: bool) -> Result<Message> {
        if binary {
            return Ok(Message::Binary(frame.into()));
        }

        String::from_utf8(frame)
            .map(|text| Message::Text(text.into()))
            .map_err(|e| Error::host("send_socket_frame", format!("text frame is not UTF-8: {e}")))
    }

    /// Parses the event stream body and forwards each event.
    async fn run_event_stream(
        response: reqwest::Response,
        router: Arc<CallbackRouter>,
        id: TransportId,
    ) {
        router.on_opened(&id).await;

        let mut parser = EventStreamParser::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for event in parser.push(&bytes) {
                        router.on_message(&id, BASE64.encode(event.as_bytes())).await;
                    }
                }
                Err(e) => {
                    error!(transport_id = %id, error = %e, "Native event stream error");
                    router.on_error(&id, e.to_string()).await;
                    return;
                }
            }
        }

        debug!(transport_id = %id, "Native event stream ended");
        router.on_closed(&id).await;
    }
}

// ============================================================================
// Tests
// ============================================================================
