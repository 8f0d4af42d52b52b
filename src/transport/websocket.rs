//! WebSocket transport adapter.
//!
//! The socket itself lives in the host. This adapter opens it through
//! [`HostRuntime::open_socket`], receives frames through
//! [`HostCallbacks::on_message`] and sends one frame at a time through
//! [`HostRuntime::send_socket_frame`].
//!
//! # I/O Loops
//!
//! ```text
//!                 ┌───────────── process task ─────────────┐
//! on_message ───► │ transport.output ──► application.input │
//!                 │                                        │
//! host send  ◄─── │ send loop ◄── transport.input          │
//!                 └────────────────────────────────────────┘
//! ```
//!
//! Whichever loop ends first tears down the other:
//!
//! | First to end | Then |
//! |--------------|------|
//! | Receive | Cancel the pending read; give the send loop [`SEND_GRACE_PERIOD`], then abort |
//! | Send | Abort: cancel receive, close the socket, cancel the pending flush |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::host::pending::{self, Outcome, PendingReceiver};
use crate::host::{CallbackRouter, HostCallbacks, HostRuntime, PendingOperation, Registration};
use crate::http::AccessTokenSource;
use crate::identifiers::TransportId;
use crate::pipe::{DuplexPipe, DuplexPipePair, PipeOptions, PipeReader, PipeWriter};
use crate::protocol::endpoint;
use crate::protocol::{TransferFormat, TransportKind};

use super::{Transport, TransportState};

// ============================================================================
// Constants
// ============================================================================

/// Time the send loop gets to finish after the receive side ended.
pub const SEND_GRACE_PERIOD: Duration = Duration::from_secs(5);

const KIND: TransportKind = TransportKind::WebSockets;

// ============================================================================
// SocketShared
// ============================================================================

/// State reachable from host callbacks and the I/O tasks.
struct SocketShared {
    id: TransportId,
    host: Arc<dyn HostRuntime>,
    /// Resolved by `on_opened`.
    start: PendingOperation,
    /// Resolved when the receive direction ends.
    receive: PendingOperation,
    aborted: AtomicBool,
    state: Mutex<TransportState>,
    /// Adapter-side output that `on_message` writes to.
    output: Mutex<Option<PipeWriter>>,
}

impl SocketShared {
    fn set_state(&self, state: TransportState) {
        let mut current = self.state.lock();
        if !current.is_terminal() {
            trace!(transport_id = %self.id, from = %*current, to = %state, "Transport state change");
            *current = state;
        }
    }

    async fn close_socket(&self) {
        info!(transport_id = %self.id, "Closing WebSocket");
        if let Err(e) = self.host.close_socket(&self.id).await {
            warn!(transport_id = %self.id, error = %e, "Closing WebSocket failed");
        }
    }

    /// Waits for the receive direction to end and completes the output.
    async fn run_receive(self: Arc<Self>, output: PipeWriter, receive: PendingReceiver) {
        debug!(transport_id = %self.id, "Starting receive loop");

        match pending::wait(receive).await {
            Outcome::Completed | Outcome::Canceled => {
                debug!(transport_id = %self.id, "Receive loop canceled");
            }
            Outcome::Faulted(e) => {
                if !self.aborted.load(Ordering::SeqCst) {
                    error!(transport_id = %self.id, error = %e, "WebSocket receive failed");
                    self.set_state(TransportState::Errored);
                    output.complete(Some(e));
                }
            }
        }

        output.complete(None);
        debug!(transport_id = %self.id, "Receive loop stopped");
    }

    /// Forwards application bytes to the host, one send at a time.
    async fn run_send(self: Arc<Self>, input: PipeReader) {
        debug!(transport_id = %self.id, "Starting the send loop");

        loop {
            let read = match input.read().await {
                Ok(read) => read,
                Err(e) => {
                    debug!(transport_id = %self.id, error = %e, "Application output failed");
                    break;
                }
            };

            if read.is_canceled {
                debug!(transport_id = %self.id, "Send loop canceled");
                break;
            }

            let buffer = read.buffer;
            if !buffer.is_empty() {
                debug!(transport_id = %self.id, size = buffer.len(), "Received message from application");

                let payload = BASE64.encode(&buffer);
                let sent = self.host.send_socket_frame(&payload, &self.id).await;
                input.advance(buffer.len());

                if let Err(e) = sent {
                    if !self.aborted.load(Ordering::SeqCst) {
                        error!(transport_id = %self.id, error = %e, "Error while sending a message");
                    }
                    break;
                }
            } else if read.is_completed {
                break;
            }
        }

        self.close_socket().await;
        input.complete();
        debug!(transport_id = %self.id, "Send loop stopped");
    }

    /// Runs both loops and tears down the survivor.
    async fn run(self: Arc<Self>, transport: DuplexPipe, receive: PendingReceiver) {
        let mut receiving = tokio::spawn(Arc::clone(&self).run_receive(transport.output.clone(), receive));
        let mut sending = tokio::spawn(Arc::clone(&self).run_send(transport.input.clone()));

        tokio::select! {
            _ = &mut receiving => {
                transport.input.cancel_pending_read();

                if timeout(SEND_GRACE_PERIOD, &mut sending).await.is_err() {
                    warn!(transport_id = %self.id, "Send did not finish within grace period; aborting");
                    self.aborted.store(true, Ordering::SeqCst);
                    self.receive.cancel();
                    self.close_socket().await;

                    // Closing fails the in-flight send; abort if the host never answers.
                    sending.abort();
                    let _ = sending.await;
                    transport.input.complete();
                }
            }

            _ = &mut sending => {
                self.aborted.store(true, Ordering::SeqCst);
                self.receive.cancel();
                self.close_socket().await;
                transport.output.cancel_pending_flush();
                let _ = receiving.await;
            }
        }

        self.set_state(TransportState::Closed);
        debug!(transport_id = %self.id, "WebSocket processing finished");
    }
}

#[async_trait]
impl HostCallbacks for SocketShared {
    async fn on_opened(&self) {
        debug!(transport_id = %self.id, "WebSocket opened");
        self.start.complete();
    }

    async fn on_message(&self, payload: String) {
        let data = match BASE64.decode(payload.as_bytes()) {
            Ok(data) => data,
            Err(e) => {
                error!(transport_id = %self.id, error = %e, "Invalid WebSocket payload");
                self.receive.fail(Error::from(e));
                return;
            }
        };

        debug!(transport_id = %self.id, size = data.len(), "Message received");

        let Some(output) = self.output.lock().clone() else {
            trace!(transport_id = %self.id, "Message before start; dropping");
            return;
        };

        match output.write(&data).await {
            Ok(flush) if !flush.is_rejected() => {}
            _ => {
                debug!(transport_id = %self.id, "Canceled passing message to application");
                self.receive.cancel();
            }
        }
    }

    async fn on_error(&self, message: String) {
        debug!(transport_id = %self.id, reason = %message, "WebSocket error");
        self.start.fail(Error::host_callback(message.clone()));
        self.receive.fail(Error::host_callback(message));
    }

    async fn on_closed(&self) {
        debug!(transport_id = %self.id, "WebSocket closed");
        self.start.cancel();
        self.receive.cancel();
    }
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Host-backed WebSocket adapter.
pub struct WebSocketTransport {
    shared: Arc<SocketShared>,
    tokens: Arc<AccessTokenSource>,
    pipe_options: PipeOptions,
    pipes: Mutex<Option<DuplexPipePair>>,
    running: Mutex<Option<JoinHandle<()>>>,
    registration: Mutex<Option<Registration>>,
}

impl WebSocketTransport {
    /// Creates an adapter and registers it with `router`.
    #[must_use]
    pub fn new(
        host: Arc<dyn HostRuntime>,
        router: &Arc<CallbackRouter>,
        tokens: Arc<AccessTokenSource>,
        pipe_options: PipeOptions,
    ) -> Self {
        let id = TransportId::generate();
        let shared = Arc::new(SocketShared {
            id,
            host,
            start: PendingOperation::new("websocket.start"),
            receive: PendingOperation::new("websocket.receive"),
            aborted: AtomicBool::new(false),
            state: Mutex::new(TransportState::Created),
            output: Mutex::new(None),
        });
        let registration = router.register(id, shared.clone());

        Self {
            shared,
            tokens,
            pipe_options,
            pipes: Mutex::new(None),
            running: Mutex::new(None),
            registration: Mutex::new(Some(registration)),
        }
    }

    /// Identity token used for host calls.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TransportId {
        self.shared.id
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> TransportState {
        *self.shared.state.lock()
    }

    /// Returns `true` once teardown forced the socket closed.
    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::SeqCst)
    }

    fn fail_start(&self, message: String) -> Error {
        self.shared.receive.cancel();
        *self.shared.state.lock() = TransportState::Errored;
        *self.shared.output.lock() = None;
        self.pipes.lock().take();
        error!(transport_id = %self.shared.id, reason = %message, "Error starting transport");
        Error::transport_start(KIND, message)
    }

    #[cfg(test)]
    async fn join_running(&self) {
        let running = self.running.lock().take();
        if let Some(task) = running {
            let _ = task.await;
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        KIND
    }

    async fn start(&self, url: &Url, format: TransferFormat) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if *state != TransportState::Created {
                return Err(Error::transport_start(KIND, format!("cannot start from state {}", *state)));
            }
            *state = TransportState::Connecting;
        }

        info!(transport_id = %self.shared.id, %format, "Starting transport");

        let token = match self.tokens.token().await {
            Ok(token) => token,
            Err(e) => return Err(self.fail_start(e.to_string())),
        };
        let socket_url = match endpoint::to_socket_scheme(url) {
            Ok(socket_url) => endpoint::with_access_token(&socket_url, token.as_deref()),
            Err(e) => return Err(self.fail_start(e.to_string())),
        };

        let pair = DuplexPipe::create_pair(self.pipe_options, self.pipe_options);
        *self.shared.output.lock() = Some(pair.transport.output.clone());
        *self.pipes.lock() = Some(pair.clone());

        let start = self.shared.start.arm();
        let receive = self.shared.receive.arm();

        let binary = format == TransferFormat::Binary;
        if let Err(e) = self
            .shared
            .host
            .open_socket(socket_url.as_str(), binary, &self.shared.id)
            .await
        {
            self.shared.start.cancel();
            return Err(self.fail_start(e.to_string()));
        }

        match pending::wait(start).await {
            Outcome::Completed => {}
            Outcome::Canceled => {
                return Err(self.fail_start("connection closed before it opened".into()));
            }
            Outcome::Faulted(e) => {
                self.shared.close_socket().await;
                return Err(self.fail_start(e.to_string()));
            }
        }

        self.shared.set_state(TransportState::Open);
        let task = tokio::spawn(Arc::clone(&self.shared).run(pair.transport, receive));
        *self.running.lock() = Some(task);

        debug!(transport_id = %self.shared.id, "Started transport");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        info!(transport_id = %self.shared.id, "Transport is stopping");

        let Some(pair) = self.pipes.lock().clone() else {
            // Never started
            self.registration.lock().take();
            return Ok(());
        };

        self.shared.set_state(TransportState::Closing);

        self.shared.start.cancel();
        self.shared.receive.cancel();
        self.shared.close_socket().await;

        pair.application.complete();
        pair.transport.input.cancel_pending_read();

        let running = self.running.lock().take();
        let result = match running {
            Some(task) => task.await.map_err(|e| Error::stop(e.to_string())),
            None => Ok(()),
        };

        self.shared.set_state(TransportState::Closed);
        self.registration.lock().take();

        match &result {
            Ok(()) => debug!(transport_id = %self.shared.id, "Transport stopped"),
            Err(e) => warn!(transport_id = %self.shared.id, error = %e, "Transport stopped with error"),
        }
        result
    }

    fn pipe(&self) -> Option<DuplexPipe> {
        let pipes = self.pipes.lock();
        match (self.state(), pipes.as_ref()) {
            (TransportState::Created | TransportState::Connecting, _) => None,
            (_, Some(pair)) => Some(pair.application.clone()),
            (_, None) => None,
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        // Dropped without stop: end both loops so the process task closes the socket.
        if self.running.get_mut().is_none() {
            return;
        }

        self.shared.receive.cancel();
        if let Some(pair) = self.pipes.get_mut().as_ref() {
            pair.application.complete();
            pair.transport.input.cancel_pending_read();
        }
    }
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
