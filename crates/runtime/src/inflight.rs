//! Tracking of requests currently being processed.
//!
//! Every `POST /messages` request registers itself in an [`InFlightSet`]
//! before it reads its body and holds the returned [`InFlightGuard`] until its
//! response has been written. The shutdown path waits on
//! [`InFlightSet::wait_idle`] so that no handler invocation is cut off by
//! process exit.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use uuid::Uuid;

/// Opaque identifier of the worker serving one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(Uuid);

impl WorkerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Concurrent set of in-flight request workers.
///
/// Cheap to clone; all clones share the same set.
#[derive(Clone, Default)]
pub struct InFlightSet {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    workers: Mutex<HashSet<WorkerId>>,
    idle: Notify,
}

impl Inner {
    fn workers(&self) -> MutexGuard<'_, HashSet<WorkerId>> {
        // The set is never left half-updated, so a poisoned lock is still usable.
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InFlightSet {
    /// Create a new, empty [`InFlightSet`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new worker. The worker stays in the set until the returned
    /// guard is dropped.
    #[must_use = "the worker is deregistered as soon as the guard is dropped"]
    pub fn register(&self) -> InFlightGuard {
        let id = WorkerId::new();
        self.inner.workers().insert(id);
        InFlightGuard {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of requests currently in flight.
    pub fn len(&self) -> usize {
        self.inner.workers().len()
    }

    /// Return `true` if no request is in flight.
    pub fn is_empty(&self) -> bool {
        self.inner.workers().is_empty()
    }

    /// Return `true` if `id` is currently registered.
    pub fn contains(&self, id: WorkerId) -> bool {
        self.inner.workers().contains(&id)
    }

    /// Wait until no request is in flight.
    ///
    /// Completes immediately if the set is already empty. There is no timeout:
    /// a request that never finishes keeps this future pending forever.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register interest before checking so a concurrent last-exit
            // cannot slip between the check and the await.
            notified.as_mut().enable();

            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for InFlightSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightSet")
            .field("len", &self.len())
            .finish()
    }
}

/// Registration of one in-flight worker. Deregisters on drop.
pub struct InFlightGuard {
    id: WorkerId,
    inner: Arc<Inner>,
}

impl InFlightGuard {
    /// Identifier of the registered worker.
    pub fn id(&self) -> WorkerId {
        self.id
    }
}

impl fmt::Debug for InFlightGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InFlightGuard").field(&self.id).finish()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let now_idle = {
            let mut workers = self.inner.workers();
            workers.remove(&self.id);
            workers.is_empty()
        };
        if now_idle {
            self.inner.idle.notify_waiters();
        }
    }
}
