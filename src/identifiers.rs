//! Type-safe identifiers.
//!
//! Newtype wrappers keep host routing tokens and server connection
//! identifiers from being mixed up at compile time.
//!
//! | Type | Minted by | Purpose |
//! |------|-----------|---------|
//! | [`TransportId`] | Client, per adapter | Routes host callbacks to one adapter |
//! | [`ConnectionId`] | Server, per negotiation | Sent as `id=` on the connect URL |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// TransportId
// ============================================================================

/// Process-unique identity token of one transport adapter instance.
///
/// Handed to every host call so the host can report asynchronous
/// notifications back through the `CallbackRouter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportId(Uuid);

impl TransportId {
    /// Mints a fresh random identity token.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a token previously rendered with `to_string`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the
    /// string is not a UUID.
    pub fn parse(value: &str) -> Result<Self> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|e| Error::config(format!("invalid transport id '{value}': {e}")))
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// Opaque, non-empty connection identifier issued by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wraps a server-issued identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the identifier is empty or whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(Error::config("Invalid connection id."));
        }
        Ok(Self(value))
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
