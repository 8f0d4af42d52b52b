//! Identity-token routing of host callbacks.
//!
//! The host only knows the [`TransportId`] it was given; the
//! [`CallbackRouter`] maps that token back to the adapter that issued it.
//!
//! ```text
//! ┌──────────────┐  on_message(id, b64)  ┌──────────────────────────┐
//! │ HostRuntime  │──────────────────────►│ CallbackRouter           │
//! │ (socket,     │                       │  id=… → WebSocket adapter│
//! │  EventSource)│                       │  id=… → SSE adapter      │
//! └──────────────┘                       └──────────────────────────┘
//! ```
//!
//! The table is written only when an adapter registers (construction) and
//! when its [`Registration`] is dropped (teardown). Callbacks only read it.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::identifiers::TransportId;

// ============================================================================
// HostCallbacks
// ============================================================================

/// Notifications a host delivers to one adapter.
///
/// `on_message` is awaited by the host, so a slow consumer applies
/// backpressure to the host instead of buffering without bound.
#[async_trait]
pub trait HostCallbacks: Send + Sync {
    /// The connection opened.
    async fn on_opened(&self);

    /// A base64-encoded payload arrived.
    async fn on_message(&self, payload: String);

    /// The host reported an error.
    async fn on_error(&self, message: String);

    /// The connection closed.
    async fn on_closed(&self);
}

// ============================================================================
// CallbackRouter
// ============================================================================

/// Table of live adapters keyed by identity token.
#[derive(Default)]
pub struct CallbackRouter {
    routes: RwLock<FxHashMap<TransportId, Arc<dyn HostCallbacks>>>,
}

impl CallbackRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `callbacks` under `id` until the returned guard drops.
    #[must_use = "dropping the registration unregisters immediately"]
    pub fn register(self: &Arc<Self>, id: TransportId, callbacks: Arc<dyn HostCallbacks>) -> Registration {
        self.routes.write().insert(id, callbacks);
        debug!(transport_id = %id, "Registered host callbacks");

        Registration {
            router: Arc::clone(self),
            id,
        }
    }

    /// Number of registered adapters.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// Returns `true` if no adapter is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Returns `true` if `id` is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &TransportId) -> bool {
        self.routes.read().contains_key(id)
    }

    fn lookup(&self, id: &TransportId) -> Option<Arc<dyn HostCallbacks>> {
        let target = self.routes.read().get(id).cloned();
        if target.is_none() {
            trace!(transport_id = %id, "Callback for unknown transport dropped");
        }
        target
    }

    fn unregister(&self, id: &TransportId) {
        if self.routes.write().remove(id).is_some() {
            debug!(transport_id = %id, "Unregistered host callbacks");
        }
    }
}

// ============================================================================
// CallbackRouter - Host Entry Points
// ============================================================================

impl CallbackRouter {
    /// Routes an "opened" notification. Returns `false` if `id` is unknown.
    pub async fn on_opened(&self, id: &TransportId) -> bool {
        match self.lookup(id) {
            Some(target) => {
                target.on_opened().await;
                true
            }
            None => false,
        }
    }

    /// Routes a message notification. Returns `false` if `id` is unknown.
    pub async fn on_message(&self, id: &TransportId, payload: String) -> bool {
        match self.lookup(id) {
            Some(target) => {
                target.on_message(payload).await;
                true
            }
            None => false,
        }
    }

    /// Routes an error notification. Returns `false` if `id` is unknown.
    pub async fn on_error(&self, id: &TransportId, message: String) -> bool {
        match self.lookup(id) {
            Some(target) => {
                target.on_error(message).await;
                true
            }
            None => false,
        }
    }

    /// Routes a "closed" notification. Returns `false` if `id` is unknown.
    pub async fn on_closed(&self, id: &TransportId) -> bool {
        match self.lookup(id) {
            Some(target) => {
                target.on_closed().await;
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for CallbackRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRouter")
            .field("routes", &self.len())
            .finish()
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Keeps an adapter routable; unregisters it on drop.
pub struct Registration {
    router: Arc<CallbackRouter>,
    id: TransportId,
}

impl Registration {
    /// The registered identity token.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TransportId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.router.unregister(&self.id);
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration").field("id", &self.id).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
