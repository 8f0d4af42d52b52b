//! Server-sent events transport adapter.
//!
//! Only the receive direction goes through the host: events arrive
//! through [`HostCallbacks::on_message`]. Outbound bytes are POSTed by
//! [`send_messages`](super::send_messages) over the shared [`HttpClient`].
//!
//! Text transfer format only.
//!
//! | First to end | Then |
//! |--------------|------|
//! | Receive | Cancel the pending read, wait for the send loop |
//! | Send | Record its error, cancel the event stream and the pending flush |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::host::pending::{self, Outcome, PendingReceiver};
use crate::host::{CallbackRouter, HostCallbacks, HostRuntime, PendingOperation, Registration};
use crate::http::{AccessTokenSource, HttpClient};
use crate::identifiers::TransportId;
use crate::pipe::{DuplexPipe, DuplexPipePair, PipeOptions, PipeWriter};
use crate::protocol::endpoint;
use crate::protocol::{TransferFormat, TransportKind};

use super::{Transport, TransportState, send_messages};

// ============================================================================
// Constants
// ============================================================================

const KIND: TransportKind = TransportKind::ServerSentEvents;

// ============================================================================
// EventStreamShared
// ============================================================================

struct EventStreamShared {
    id: TransportId,
    host: Arc<dyn HostRuntime>,
    /// Resolved when the event stream ends.
    events: PendingOperation,
    state: Mutex<TransportState>,
    output: Mutex<Option<PipeWriter>>,
    /// First error from either direction; completes the application input.
    error: Mutex<Option<Error>>,
}

impl EventStreamShared {
    fn set_state(&self, state: TransportState) {
        let mut current = self.state.lock();
        if !current.is_terminal() {
            trace!(transport_id = %self.id, from = %*current, to = %state, "Transport state change");
            *current = state;
        }
    }

    fn record_error(&self, error: Error) {
        self.error.lock().get_or_insert(error);
    }

    async fn close_event_stream(&self) {
        if let Err(e) = self.host.close_event_stream(&self.id).await {
            error!(transport_id = %self.id, error = %e, "Failed to stop event stream");
        }
    }

    async fn run_receive(self: Arc<Self>, output: PipeWriter, events: PendingReceiver) {
        debug!(transport_id = %self.id, "Starting receive loop");

        match pending::wait(events).await {
            Outcome::Completed | Outcome::Canceled => {
                debug!(transport_id = %self.id, "Receive loop canceled");
            }
            Outcome::Faulted(e) => {
                debug!(transport_id = %self.id, error = %e, "Event stream failed");
                self.set_state(TransportState::Errored);
                self.record_error(e);
            }
        }

        let error = self.error.lock().take();
        output.complete(error);
        debug!(transport_id = %self.id, "Receive loop stopped");

        self.close_event_stream().await;
    }

    async fn run(
        self: Arc<Self>,
        transport: DuplexPipe,
        events: PendingReceiver,
        http: Arc<dyn HttpClient>,
        url: String,
    ) {
        let mut receiving = tokio::spawn(Arc::clone(&self).run_receive(transport.output.clone(), events));

        let input = transport.input.clone();
        let mut sending = tokio::spawn(async move { send_messages(&url, &input, &*http).await });

        tokio::select! {
            _ = &mut receiving => {
                transport.input.cancel_pending_read();
                let _ = sending.await;
            }

            sent = &mut sending => {
                match sent {
                    Ok(Err(e)) => self.record_error(e),
                    Err(e) => self.record_error(Error::stop(e.to_string())),
                    Ok(Ok(())) => {}
                }

                self.events.cancel();
                transport.output.cancel_pending_flush();
                let _ = receiving.await;
            }
        }

        self.set_state(TransportState::Closed);
        debug!(transport_id = %self.id, "Event stream processing finished");
    }
}

#[async_trait]
impl HostCallbacks for EventStreamShared {
    async fn on_opened(&self) {
        debug!(transport_id = %self.id, "Event stream opened");
    }

    async fn on_message(&self, payload: String) {
        debug!(transport_id = %self.id, size = payload.len(), "Parsing event stream message");

        let data = match BASE64.decode(payload.as_bytes()) {
            Ok(data) => data,
            Err(e) => {
                error!(transport_id = %self.id, error = %e, "Invalid event stream payload");
                self.events.fail(Error::from(e));
                return;
            }
        };

        let Some(output) = self.output.lock().clone() else {
            trace!(transport_id = %self.id, "Message before start; dropping");
            return;
        };

        debug!(transport_id = %self.id, size = data.len(), "Passing message to application");

        match output.write(&data).await {
            Ok(flush) if !flush.is_rejected() => {}
            _ => {
                debug!(transport_id = %self.id, "Event stream ended");
                self.events.cancel();
            }
        }
    }

    async fn on_error(&self, message: String) {
        debug!(transport_id = %self.id, reason = %message, "Event stream error");
        self.events.fail(Error::host_callback(message));
    }

    async fn on_closed(&self) {
        debug!(transport_id = %self.id, "Event stream closed");
        self.events.cancel();
    }
}

// ============================================================================
// ServerSentEventsTransport
// ============================================================================

/// Host-backed server-sent events adapter.
pub struct ServerSentEventsTransport {
    shared: Arc<EventStreamShared>,
    http: Arc<dyn HttpClient>,
    tokens: Arc<AccessTokenSource>,
    pipe_options: PipeOptions,
    pipes: Mutex<Option<DuplexPipePair>>,
    running: Mutex<Option<JoinHandle<()>>>,
    registration: Mutex<Option<Registration>>,
}

impl ServerSentEventsTransport {
    /// Creates an adapter and registers it with `router`.
    #[must_use]
    pub fn new(
        host: Arc<dyn HostRuntime>,
        router: &Arc<CallbackRouter>,
        http: Arc<dyn HttpClient>,
        tokens: Arc<AccessTokenSource>,
        pipe_options: PipeOptions,
    ) -> Self {
        let id = TransportId::generate();
        let shared = Arc::new(EventStreamShared {
            id,
            host,
            events: PendingOperation::new("sse.events"),
            state: Mutex::new(TransportState::Created),
            output: Mutex::new(None),
            error: Mutex::new(None),
        });
        let registration = router.register(id, shared.clone());

        Self {
            shared,
            http,
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

    fn fail_start(&self, message: String) -> Error {
        self.shared.events.cancel();
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
impl Transport for ServerSentEventsTransport {
    fn kind(&self) -> TransportKind {
        KIND
    }

    async fn start(&self, url: &Url, format: TransferFormat) -> Result<()> {
        if format != TransferFormat::Text {
            return Err(Error::unsupported_transfer_format(KIND, format));
        }

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
        let stream_url = endpoint::with_access_token(url, token.as_deref());

        let pair = DuplexPipe::create_pair(self.pipe_options, self.pipe_options);
        *self.shared.output.lock() = Some(pair.transport.output.clone());
        *self.pipes.lock() = Some(pair.clone());

        let events = self.shared.events.arm();

        if let Err(e) = self
            .shared
            .host
            .open_event_stream(stream_url.as_str(), &self.shared.id)
            .await
        {
            return Err(self.fail_start(e.to_string()));
        }

        self.shared.set_state(TransportState::Open);
        let task = tokio::spawn(Arc::clone(&self.shared).run(
            pair.transport,
            events,
            Arc::clone(&self.http),
            url.to_string(),
        ));
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

        self.shared.events.cancel();
        self.shared.close_event_stream().await;

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
        if matches!(self.state(), TransportState::Created | TransportState::Connecting) {
            return None;
        }
        self.pipes.lock().as_ref().map(|pair| pair.application.clone())
    }
}

impl fmt::Debug for ServerSentEventsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSentEventsTransport")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
