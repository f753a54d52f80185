//! Observer lists.
//!
//! Handlers are stored as `Arc<F>` so emission can snapshot the list and
//! release the lock before calling anything:
//!   - a handler removed during emission still runs in that round;
//!   - a handler added during emission first runs in the next round.
//!
//! `F` is an unsized closure type such as `dyn Fn(&E, IndexPath) + Send + Sync`,
//! which lets each list keep its natural call signature.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Identifier returned by [`ObserverList::register`]
pub type ListenerId = u64;

/// Ordered list of handlers
pub struct ObserverList<F: ?Sized> {
    handlers: Mutex<Vec<(ListenerId, Arc<F>)>>,
    next_id: AtomicU64,
}

impl<F: ?Sized> ObserverList<F> {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends a handler; handlers run in registration order
    pub fn register(&self, handler: Arc<F>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().push((id, handler));
        id
    }

    /// Removes a handler. Returns false if `id` was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        handlers.len() != before
    }

    /// Handlers in registration order, detached from the lock
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.handlers
            .lock()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.lock().is_empty()
    }
}

impl<F: ?Sized> Default for ObserverList<F> {
    fn default() -> Self {
        Self::new()
    }
}
