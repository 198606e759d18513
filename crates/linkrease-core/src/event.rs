//! Listener registry with handle-based unsubscription.
//!
//! Listeners are boxed callbacks kept in registration order. Delivery is
//! synchronous and re-entrant: the owner [`detaches`](ListenerSet::detach)
//! the current listeners, calls each with mutable access to itself, and
//! [`reattaches`](ListenerSet::reattach) them afterwards. While detached:
//!
//! - a listener may subscribe new listeners; they join after the batch and
//!   first hear the next notification,
//! - a listener may unsubscribe any listener, including itself; the removal
//!   is applied when the batch is reattached, and a removed listener that has
//!   not yet run in the current batch is skipped,
//! - a listener in the batch cannot be called again until the batch is
//!   back, so the owner checks [`is_delivering`](ListenerSet::is_delivering)
//!   and queues a nested notification for a further pass over every live
//!   listener once the current one finishes.

use crate::id::ListenerId;
use std::collections::BTreeSet;

/// Registration-ordered set of listeners of type `F`
/// (usually a `dyn FnMut(..)`).
pub struct ListenerSet<F: ?Sized> {
    entries: Vec<(ListenerId, Box<F>)>,
    /// Every id subscribed and not yet unsubscribed.
    live: BTreeSet<ListenerId>,
    /// Unsubscribed while their batch was detached.
    pending_removals: BTreeSet<ListenerId>,
    /// Number of batches currently detached.
    detached: usize,
    next_id: u64,
}

impl<F: ?Sized> std::fmt::Debug for ListenerSet<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("live", &self.live)
            .field("pending_removals", &self.pending_removals)
            .field("detached", &self.detached)
            .finish_non_exhaustive()
    }
}

impl<F: ?Sized> Default for ListenerSet<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Listeners taken out of a [`ListenerSet`] for one delivery.
pub struct ListenerBatch<F: ?Sized> {
    entries: Vec<(ListenerId, Box<F>)>,
}

impl<F: ?Sized> ListenerBatch<F> {
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ListenerId, &mut F)> {
        self.entries.iter_mut().map(|(id, f)| (*id, f.as_mut()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<F: ?Sized> ListenerSet<F> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            live: BTreeSet::new(),
            pending_removals: BTreeSet::new(),
            detached: 0,
            next_id: 0,
        }
    }

    /// Register a listener. Returns the handle used to unsubscribe it.
    pub fn subscribe(&mut self, listener: Box<F>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        self.live.insert(id);
        id
    }

    /// Remove a listener. Returns `false` if the handle is unknown or was
    /// already removed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        if !self.live.remove(&id) {
            return false;
        }
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        if self.entries.len() == before {
            // Lives in a detached batch.
            self.pending_removals.insert(id);
        }
        true
    }

    /// Whether `id` is subscribed.
    pub fn is_live(&self, id: ListenerId) -> bool {
        self.live.contains(&id)
    }

    /// Number of subscribed listeners, including any in a detached batch.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Whether a batch is currently detached for delivery.
    pub fn is_delivering(&self) -> bool {
        self.detached > 0
    }

    /// Take the attached listeners out for delivery.
    pub fn detach(&mut self) -> ListenerBatch<F> {
        self.detached += 1;
        ListenerBatch {
            entries: std::mem::take(&mut self.entries),
        }
    }

    /// Put a batch back in front of any listeners subscribed meanwhile, and
    /// apply removals requested during delivery.
    pub fn reattach(&mut self, batch: ListenerBatch<F>) {
        let added = std::mem::replace(&mut self.entries, batch.entries);
        self.entries.extend(added);
        self.detached = self.detached.saturating_sub(1);

        if !self.pending_removals.is_empty() {
            let pending = &self.pending_removals;
            self.entries.retain(|(id, _)| !pending.contains(id));
            if self.detached == 0 {
                self.pending_removals.clear();
            }
        }
    }
}
