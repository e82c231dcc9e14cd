//! Typed event dispatch with durable and exclusive listener registration.
//!
//! The dispatcher is keyed by a caller-supplied event-kind value and invokes
//! listeners synchronously, in registration order. Two registration modes
//! exist:
//!
//! - [`Registration::Durable`] (via [`EventDispatcher::on`]) appends the
//!   listener to the kind's list;
//! - [`Registration::Exclusive`] (via [`EventDispatcher::replace`]) REPLACES
//!   the kind's entire listener list with the single new listener.
//!
//! Exclusive registration is not fire-and-forget: the listener stays
//! registered until removed or replaced. Removal is by [`ListenerId`] token,
//! since closures have no usable identity to compare by.
//!
//! `emit` does not swallow panics; a panicking listener unwinds into the
//! emitter's caller.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// How a listener is attached to an event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Appended to the listener list; coexists with other listeners.
    Durable,
    /// Replaces the entire listener list for the event kind.
    Exclusive,
}

/// Token identifying a registered listener, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId<K> {
    kind: K,
    seq: u64,
}

impl<K: fmt::Debug> fmt::Display for ListenerId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.kind, self.seq)
    }
}

struct Entry<E> {
    seq: u64,
    listener: Arc<dyn Fn(&E) + Send + Sync>,
}

/// Synchronous, typed event dispatcher.
///
/// `K` is the event-kind key (a small `Copy` enum in practice), `E` the
/// event payload delivered to listeners by reference. Cloning the dispatcher
/// clones a handle to the same listener table.
pub struct EventDispatcher<K, E> {
    listeners: Arc<Mutex<HashMap<K, Vec<Entry<E>>>>>,
    next_seq: Arc<AtomicU64>,
}

impl<K, E> Clone for EventDispatcher<K, E> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
            next_seq: self.next_seq.clone(),
        }
    }
}

impl<K, E> Default for EventDispatcher<K, E>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E> EventDispatcher<K, E>
where
    K: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a durable listener for `kind`.
    pub fn on<F>(&self, kind: K, listener: F) -> ListenerId<K>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(kind, Registration::Durable, listener)
    }

    /// Register an exclusive listener for `kind`, replacing every listener
    /// currently attached to it.
    pub fn replace<F>(&self, kind: K, listener: F) -> ListenerId<K>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(kind, Registration::Exclusive, listener)
    }

    /// Register a listener with an explicit [`Registration`] mode.
    pub fn register<F>(&self, kind: K, mode: Registration, listener: F) -> ListenerId<K>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            seq,
            listener: Arc::new(listener),
        };
        let mut table = self.listeners.lock();
        let list = table.entry(kind).or_default();
        if mode == Registration::Exclusive {
            list.clear();
        }
        list.push(entry);
        ListenerId { kind, seq }
    }

    /// Remove the listener identified by `id`. No-op when it is not present
    /// (already removed, or displaced by an exclusive registration).
    pub fn off(&self, id: ListenerId<K>) {
        let mut table = self.listeners.lock();
        if let Some(list) = table.get_mut(&id.kind) {
            list.retain(|entry| entry.seq != id.seq);
        }
    }

    /// Remove every listener for every kind.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    /// Invoke all listeners registered for `kind`, in registration order.
    ///
    /// Listeners run synchronously on the caller's stack. The listener table
    /// lock is not held during invocation, so listeners may register or
    /// remove listeners themselves; such changes take effect from the next
    /// `emit`.
    pub fn emit(&self, kind: K, event: &E) {
        let snapshot: Vec<Arc<dyn Fn(&E) + Send + Sync>> = {
            let table = self.listeners.lock();
            match table.get(&kind) {
                Some(list) => list.iter().map(|e| e.listener.clone()).collect(),
                None => return,
            }
        };
        for listener in snapshot {
            listener(event);
        }
    }

    /// Number of listeners currently attached to `kind`.
    pub fn listener_count(&self, kind: K) -> usize {
        self.listeners.lock().get(&kind).map_or(0, |l| l.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        A,
        B,
    }

    #[test]
    fn durable_listeners_accumulate_and_fire_in_order() {
        let dispatcher: EventDispatcher<Kind, u32> = EventDispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        dispatcher.on(Kind::A, move |v| o1.lock().push(("first", *v)));
        let o2 = order.clone();
        dispatcher.on(Kind::A, move |v| o2.lock().push(("second", *v)));

        dispatcher.emit(Kind::A, &7);
        assert_eq!(*order.lock(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn exclusive_registration_replaces_listener_list() {
        let dispatcher: EventDispatcher<Kind, u32> = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = hits.clone();
        dispatcher.on(Kind::A, move |_| {
            h1.fetch_add(1, Ordering::SeqCst);
        });
        let h2 = hits.clone();
        dispatcher.on(Kind::A, move |_| {
            h2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(dispatcher.listener_count(Kind::A), 2);

        // Exclusive displaces both durable listeners but keeps firing itself
        // on every subsequent emit.
        let h3 = hits.clone();
        dispatcher.replace(Kind::A, move |_| {
            h3.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(dispatcher.listener_count(Kind::A), 1);

        dispatcher.emit(Kind::A, &0);
        dispatcher.emit(Kind::A, &0);
        assert_eq!(hits.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn off_removes_only_the_identified_listener() {
        let dispatcher: EventDispatcher<Kind, u32> = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = hits.clone();
        let id = dispatcher.on(Kind::A, move |_| {
            h1.fetch_add(1, Ordering::SeqCst);
        });
        let h2 = hits.clone();
        dispatcher.on(Kind::A, move |_| {
            h2.fetch_add(100, Ordering::SeqCst);
        });

        dispatcher.off(id);
        // Removing again is a no-op.
        dispatcher.off(id);

        dispatcher.emit(Kind::A, &0);
        assert_eq!(hits.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn emit_on_unknown_kind_is_a_no_op() {
        let dispatcher: EventDispatcher<Kind, u32> = EventDispatcher::new();
        dispatcher.emit(Kind::B, &1);
    }
}
