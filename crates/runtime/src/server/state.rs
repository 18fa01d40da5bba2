//! Shared application state injected into every Axum handler.

use std::fmt;
use std::sync::Arc;

use common::Handler;
use tokio::sync::watch;

use crate::inflight::InFlightSet;

/// Lifecycle phase of one server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// State created, listener not yet serving.
    Starting,
    /// Accepting and serving requests.
    Running,
    /// Shutdown triggered; waiting for in-flight requests to finish.
    Draining,
    /// Listener closed.
    Stopped,
}

/// Observable lifecycle of a server instance.
///
/// Phases only move forward; an attempt to go back is ignored.
#[derive(Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<Phase>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Phase::Starting);
        Self { tx: Arc::new(tx) }
    }

    /// Current phase.
    pub fn current(&self) -> Phase {
        *self.tx.borrow()
    }

    /// Move to `phase`. Returns `true` if the phase changed.
    pub fn advance(&self, phase: Phase) -> bool {
        self.tx.send_if_modified(|current| {
            if phase > *current {
                *current = phase;
                true
            } else {
                false
            }
        })
    }

    /// Subscribe to phase changes.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.tx.subscribe()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lifecycle").field(&self.current()).finish()
    }
}

/// Application state shared across all request handlers.
///
/// All fields are `Arc`-backed so that Axum can clone the state for each
/// request without copying anything expensive. Each server instance owns its
/// own state; nothing is process-global.
#[derive(Clone)]
pub struct AppState {
    /// User-supplied message handler.
    pub handler: Arc<dyn Handler>,
    /// Requests currently being processed on `/messages`.
    pub in_flight: InFlightSet,
    /// Lifecycle phase of this instance.
    pub lifecycle: Lifecycle,
}

impl AppState {
    /// Create a new [`AppState`] around `handler`.
    pub fn new(handler: impl Handler) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    /// Create a new [`AppState`] from an already shared handler.
    pub fn from_arc(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            in_flight: InFlightSet::new(),
            lifecycle: Lifecycle::new(),
        }
    }
}

impl Default for AppState {
    /// Creates an [`AppState`] around the reference echo handler, suitable for tests.
    fn default() -> Self {
        Self::new(common::EchoHandler)
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("in_flight", &self.in_flight)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}
