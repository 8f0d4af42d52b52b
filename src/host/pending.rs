//! Single-assignment completion handles.
//!
//! A [`PendingOperation`] correlates one outstanding host call or expected
//! notification with the adapter that issued it. Arming it hands out a
//! [`PendingReceiver`]; the matching callback resolves it exactly once.
//! Resolving a handle that is not armed is a traced no-op.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{trace, warn};

use crate::error::Error;

// ============================================================================
// Outcome
// ============================================================================

/// How an armed operation ended.
#[derive(Debug)]
pub enum Outcome {
    /// The expected notification arrived.
    Completed,
    /// The operation was abandoned (closed, torn down, superseded).
    Canceled,
    /// The host reported an error.
    Faulted(Error),
}

/// Receiving half returned by [`PendingOperation::arm`].
pub type PendingReceiver = oneshot::Receiver<Outcome>;

/// Awaits an armed operation.
///
/// A dropped sender counts as cancellation.
pub async fn wait(receiver: PendingReceiver) -> Outcome {
    receiver.await.unwrap_or(Outcome::Canceled)
}

// ============================================================================
// PendingOperation
// ============================================================================

/// Slot holding at most one armed completion.
pub struct PendingOperation {
    /// Operation name, for tracing.
    name: &'static str,
    /// Sender of the currently armed completion.
    slot: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl PendingOperation {
    /// Creates an unarmed operation slot.
    #[inline]
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(None),
        }
    }

    /// Arms the slot and returns the receiver to await.
    ///
    /// Re-arming while armed cancels the previous completion.
    pub fn arm(&self) -> PendingReceiver {
        let (tx, rx) = oneshot::channel();
        let previous = self.slot.lock().replace(tx);

        if let Some(previous) = previous {
            warn!(operation = self.name, "Re-armed pending operation; canceling previous");
            let _ = previous.send(Outcome::Canceled);
        }

        rx
    }

    /// Returns `true` if a completion is armed.
    #[inline]
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Resolves the armed completion successfully.
    ///
    /// Returns `false` if nothing was armed.
    pub fn complete(&self) -> bool {
        self.resolve(Outcome::Completed)
    }

    /// Resolves the armed completion as canceled.
    ///
    /// Returns `false` if nothing was armed.
    pub fn cancel(&self) -> bool {
        self.resolve(Outcome::Canceled)
    }

    /// Resolves the armed completion with an error.
    ///
    /// Returns `false` if nothing was armed.
    pub fn fail(&self, error: Error) -> bool {
        self.resolve(Outcome::Faulted(error))
    }

    fn resolve(&self, outcome: Outcome) -> bool {
        let Some(tx) = self.slot.lock().take() else {
            trace!(operation = self.name, ?outcome, "Pending operation not armed; ignoring");
            return false;
        };

        // The awaiting side may already be gone; the slot is disarmed either way.
        let _ = tx.send(outcome);
        true
    }
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("name", &self.name)
            .field("armed", &self.is_armed())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
