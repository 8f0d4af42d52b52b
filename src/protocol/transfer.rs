//! Transfer formats and transport kinds.
//!
//! The enabled-transport set is a set of [`TransportKind`] variants
//! rather than a flags integer, so selection is a membership test.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// TransferFormat
// ============================================================================

/// Whether the logical stream carries text or binary payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferFormat {
    /// UTF-8 text frames.
    #[default]
    Text,
    /// Arbitrary binary frames.
    Binary,
}

impl TransferFormat {
    /// Wire name as it appears in `transferFormats`.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Binary => "Binary",
        }
    }
}

impl fmt::Display for TransferFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Text" => Ok(Self::Text),
            "Binary" => Ok(Self::Binary),
            other => Err(Error::config(format!("unknown transfer format '{other}'"))),
        }
    }
}

// ============================================================================
// TransportKind
// ============================================================================

/// One concrete mechanism for moving bytes between client and server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransportKind {
    /// Full-duplex socket.
    WebSockets,
    /// Server-push event stream with request-based sends.
    ServerSentEvents,
    /// Fallback polling (external implementation).
    LongPolling,
}

impl TransportKind {
    /// All kinds, in the client's default preference order.
    pub const ALL: [Self; 3] = [Self::WebSockets, Self::ServerSentEvents, Self::LongPolling];

    /// Wire name as advertised by the server.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WebSockets => "WebSockets",
            Self::ServerSentEvents => "ServerSentEvents",
            Self::LongPolling => "LongPolling",
        }
    }

    /// Looks up a kind by its advertised name.
    ///
    /// Matching is exact; unknown names return `None` and are skipped by
    /// the selector.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TransportSet
// ============================================================================

/// Set of transports the client allows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSet {
    kinds: FxHashSet<TransportKind>,
}

impl TransportSet {
    /// Empty set (nothing enabled).
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self {
            kinds: FxHashSet::default(),
        }
    }

    /// Every known transport.
    #[must_use]
    pub fn all() -> Self {
        Self::from_iter(TransportKind::ALL)
    }

    /// Set holding a single transport.
    #[must_use]
    pub fn only(kind: TransportKind) -> Self {
        Self::from_iter([kind])
    }

    /// Adds a transport.
    #[inline]
    #[must_use]
    pub fn with(mut self, kind: TransportKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    /// Removes a transport.
    #[inline]
    #[must_use]
    pub fn without(mut self, kind: TransportKind) -> Self {
        self.kinds.remove(&kind);
        self
    }

    /// Returns `true` if `kind` is enabled.
    #[inline]
    #[must_use]
    pub fn contains(&self, kind: TransportKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Returns `true` if nothing is enabled.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Number of enabled transports.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Returns the single enabled transport, if exactly one is enabled.
    #[must_use]
    pub fn single(&self) -> Option<TransportKind> {
        if self.kinds.len() == 1 {
            self.kinds.iter().next().copied()
        } else {
            None
        }
    }
}

impl Default for TransportSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<TransportKind> for TransportSet {
    fn from_iter<I: IntoIterator<Item = TransportKind>>(iter: I) -> Self {
        Self {
            kinds: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
