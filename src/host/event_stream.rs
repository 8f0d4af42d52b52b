//! Incremental `text/event-stream` parser.
//!
//! Bytes may arrive split anywhere, including inside a UTF-8 sequence or
//! between `\r` and `\n`. Only `data` fields are kept; `event`, `id` and
//! `retry` are ignored, and comment lines (leading `:`) are skipped.

// ============================================================================
// EventStreamParser
// ============================================================================

/// Accumulates bytes and yields the `data` payload of each complete event.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    /// Bytes of the current, not yet terminated line.
    line: Vec<u8>,
    /// `data` lines of the event being assembled.
    data: Vec<String>,
}

impl EventStreamParser {
    /// Creates an empty parser.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the events it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut events = Vec::new();

        for &byte in chunk {
            if byte != b'\n' {
                self.line.push(byte);
                continue;
            }

            if self.line.last() == Some(&b'\r') {
                self.line.pop();
            }

            let line = std::mem::take(&mut self.line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    fn process_line(&mut self, line: &[u8]) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.data).join("\n"));
        }

        if line[0] == b':' {
            return None;
        }

        let text = String::from_utf8_lossy(line);
        let (field, value) = match text.find(':') {
            Some(pos) => {
                let value = &text[pos + 1..];
                (&text[..pos], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (text.as_ref(), ""),
        };

        if field == "data" {
            self.data.push(value.to_string());
        }

        None
    }
}

// ============================================================================
// Tests
// ============================================================================
