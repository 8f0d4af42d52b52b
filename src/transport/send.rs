//! Request-based send loop.
//!
//! Drains the adapter's input pipe and POSTs each buffered chunk to the
//! connection URL. Used by transports whose receive direction cannot
//! carry outbound data.

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpRequest};
use crate::pipe::PipeReader;

// ============================================================================
// send_messages
// ============================================================================

/// POSTs everything read from `input` to `url` until the pipe ends.
///
/// The input reader is completed on every exit path.
///
/// # Errors
///
/// - [`Error::Http`] if a POST fails or returns a non-2xx status
/// - The writer's completion error, if the application failed its output
pub async fn send_messages(url: &str, input: &PipeReader, http: &dyn HttpClient) -> Result<()> {
    debug!(url, "Starting the send loop");

    let result = run(url, input, http).await;

    match &result {
        Ok(()) => debug!("Send loop stopped"),
        Err(e) => error!(error = %e, "Error while sending to the server"),
    }

    input.complete();
    result
}

async fn run(url: &str, input: &PipeReader, http: &dyn HttpClient) -> Result<()> {
    loop {
        let read = input.read().await?;

        if read.is_canceled {
            debug!("Send loop canceled");
            return Ok(());
        }

        let buffer = read.buffer;
        if !buffer.is_empty() {
            debug!(size = buffer.len(), "Sending payload to server");

            let request = HttpRequest::post(url)
                .with_header("Content-Type", "application/octet-stream")
                .with_body(buffer.to_vec());
            let sent = http.send(request).await;
            input.advance(buffer.len());

            let response = sent?;
            if !response.is_success() {
                return Err(Error::http(format!(
                    "send to '{url}' failed with status {}",
                    response.status
                )));
            }
        } else if read.is_completed {
            return Ok(());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
