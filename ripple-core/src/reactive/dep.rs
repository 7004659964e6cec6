//! Dependency Cells
//!
//! A [`Dep`] is the tracking and notification unit attached to one reactive
//! storage location: a signal, one key of a reactive map, the output of a memo.
//!
//! # Subscriber Slots
//!
//! Subscribers are kept in an ordered slot array. Removing a subscriber turns
//! its slot into a tombstone instead of shifting the array, so positions held
//! by the side index stay valid. When tombstones outnumber live slots the
//! array is compacted, preserving the order of the survivors.
//!
//! Slots hold weak references. A cell never keeps a computation alive; the
//! computation owns its cells (see [`Effect`](super::Effect)), which keeps the
//! graph free of reference cycles.
//!
//! # Notification
//!
//! [`Dep::notify`] first takes a snapshot of the live subscribers and only then
//! starts calling [`DependencyTarget::update`]. A subscriber unlinked by an
//! earlier subscriber's update still receives its call; a subscriber linked
//! during dispatch waits for the next notification.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use super::context::ReactiveContext;
use super::subscriber::{DependencyTarget, SubscriberId};

/// Unique identifier for a dependency cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

impl DepId {
    /// Generate a new unique cell ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for DepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dep#{}", self.0)
    }
}

struct Slot {
    id: SubscriberId,
    target: Weak<dyn DependencyTarget>,
}

/// Slot array plus the id -> positions index.
#[derive(Default)]
struct SubscriberList {
    slots: Vec<Option<Slot>>,
    index: HashMap<SubscriberId, SmallVec<[usize; 1]>>,
    tombstones: usize,
}

impl SubscriberList {
    fn push(&mut self, id: SubscriberId, target: Weak<dyn DependencyTarget>) {
        let position = self.slots.len();
        self.slots.push(Some(Slot { id, target }));
        self.index.entry(id).or_default().push(position);
    }

    fn remove(&mut self, id: SubscriberId) -> bool {
        let Some(positions) = self.index.remove(&id) else {
            return false;
        };

        for position in positions {
            if let Some(slot) = self.slots.get_mut(position) {
                if slot.take().is_some() {
                    self.tombstones += 1;
                }
            }
        }

        if self.tombstones > self.live() {
            self.compact();
        }
        true
    }

    fn live(&self) -> usize {
        self.slots.len() - self.tombstones
    }

    fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        self.tombstones = 0;
        self.index.clear();
        for (position, slot) in self.slots.iter().enumerate() {
            if let Some(slot) = slot {
                self.index.entry(slot.id).or_default().push(position);
            }
        }
    }

    /// Upgrade every live slot, tombstoning targets that no longer exist.
    fn snapshot(&mut self) -> Vec<Arc<dyn DependencyTarget>> {
        let mut live = Vec::with_capacity(self.live());
        let mut dead = Vec::new();

        for slot in self.slots.iter().flatten() {
            match slot.target.upgrade() {
                Some(target) => live.push(target),
                None => dead.push(slot.id),
            }
        }

        for id in dead {
            self.remove(id);
        }
        live
    }

    fn ids(&self) -> Vec<SubscriberId> {
        self.slots.iter().flatten().map(|slot| slot.id).collect()
    }
}

struct DepInner {
    id: DepId,
    subscribers: Mutex<SubscriberList>,
}

/// A dependency cell.
///
/// Cloning a `Dep` yields another handle to the same cell.
///
/// # Example
///
/// ```rust,ignore
/// let dep = Dep::new();
/// let effect = Effect::new({
///     let dep = dep.clone();
///     move || dep.depend()
/// });
///
/// dep.notify(); // re-runs `effect`
/// ```
#[derive(Clone)]
pub struct Dep {
    inner: Arc<DepInner>,
}

impl Dep {
    /// Create a new cell with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DepInner {
                id: DepId::new(),
                subscribers: Mutex::new(SubscriberList::default()),
            }),
        }
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Link the current computation, if any, to this cell.
    ///
    /// Reads outside a tracked computation, or while tracking is paused,
    /// are not recorded.
    pub fn depend(&self) {
        if !ReactiveContext::should_track() {
            return;
        }
        if let Some(target) = ReactiveContext::current_target() {
            target.add_dep(self);
        }
    }

    /// Tell every subscriber that this cell changed.
    pub fn notify(&self) {
        let snapshot = self.inner.subscribers.lock().snapshot();
        trace!(dep = %self.inner.id, subscribers = snapshot.len(), "notify");

        for target in snapshot {
            target.update();
        }
    }

    /// Append a subscriber.
    ///
    /// No uniqueness check happens here; callers that must not subscribe
    /// twice check their own link set first.
    pub fn add_subscriber(&self, id: SubscriberId, target: Weak<dyn DependencyTarget>) {
        self.inner.subscribers.lock().push(id, target);
    }

    /// Unlink a subscriber. Returns whether it was subscribed.
    pub fn remove_subscriber(&self, id: SubscriberId) -> bool {
        self.inner.subscribers.lock().remove(id)
    }

    /// Check whether a subscriber is linked.
    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.inner.subscribers.lock().index.contains_key(&id)
    }

    /// Get the number of live subscriber slots.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().live()
    }

    /// Get the subscribers in notification order.
    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.inner.subscribers.lock().ids()
    }

    /// Number of slots, tombstones included.
    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.inner.subscribers.lock().slots.len()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Dep {}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.inner.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    type Hook = Box<dyn Fn() + Send + Sync>;

    /// Records update calls into a shared log and links on `add_dep`.
    struct Recorder {
        id: SubscriberId,
        this: Weak<Recorder>,
        log: Arc<Mutex<Vec<SubscriberId>>>,
        on_update: Mutex<Option<Hook>>,
    }

    impl Recorder {
        fn new(log: &Arc<Mutex<Vec<SubscriberId>>>) -> Arc<Self> {
            Arc::new_cyclic(|this| Self {
                id: SubscriberId::new(),
                this: this.clone(),
                log: log.clone(),
                on_update: Mutex::new(None),
            })
        }

        fn subscribe(self: &Arc<Self>, dep: &Dep) {
            let weak: Weak<dyn DependencyTarget> = self.this.clone();
            dep.add_subscriber(self.id, weak);
        }
    }

    impl DependencyTarget for Recorder {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn add_dep(&self, dep: &Dep) {
            if !dep.has_subscriber(self.id) {
                dep.add_subscriber(self.id, self.this.clone());
            }
        }

        fn update(&self) {
            self.log.lock().push(self.id);
            if let Some(hook) = self.on_update.lock().as_ref() {
                hook();
            }
        }
    }

    #[test]
    fn dep_ids_are_unique() {
        let d1 = Dep::new();
        let d2 = Dep::new();
        assert_ne!(d1.id(), d2.id());
        assert!(d2.id().raw() > d1.id().raw());
    }

    #[test]
    fn notify_visits_subscribers_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dep = Dep::new();
        let a = Recorder::new(&log);
        let b = Recorder::new(&log);
        let c = Recorder::new(&log);

        b.subscribe(&dep);
        a.subscribe(&dep);
        c.subscribe(&dep);

        dep.notify();
        assert_eq!(*log.lock(), vec![b.id, a.id, c.id]);
    }

    #[test]
    fn depend_without_context_is_noop() {
        let dep = Dep::new();
        dep.depend();
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn depend_delegates_to_current_target() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dep = Dep::new();
        let recorder = Recorder::new(&log);

        {
            let _ctx = ReactiveContext::enter(recorder.clone());
            dep.depend();
            dep.depend();
        }

        assert_eq!(dep.subscriber_ids(), vec![recorder.id]);
    }

    #[test]
    fn add_subscriber_does_not_deduplicate() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dep = Dep::new();
        let recorder = Recorder::new(&log);

        recorder.subscribe(&dep);
        recorder.subscribe(&dep);
        assert_eq!(dep.subscriber_count(), 2);

        assert!(dep.remove_subscriber(recorder.id));
        assert_eq!(dep.subscriber_count(), 0);
        assert!(!dep.remove_subscriber(recorder.id));
    }

    #[test]
    fn removal_during_dispatch_uses_snapshot() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dep = Dep::new();
        let first = Recorder::new(&log);
        let second = Recorder::new(&log);
        let late = Recorder::new(&log);

        first.subscribe(&dep);
        second.subscribe(&dep);

        // The first subscriber unlinks the second and links a newcomer.
        let (dep_hook, second_id, late_hook) = (dep.clone(), second.id, late.clone());
        *first.on_update.lock() = Some(Box::new(move || {
            dep_hook.remove_subscriber(second_id);
            late_hook.subscribe(&dep_hook);
        }));

        dep.notify();
        assert_eq!(*log.lock(), vec![first.id, second.id]);

        *first.on_update.lock() = None;
        log.lock().clear();
        dep.notify();
        assert_eq!(*log.lock(), vec![first.id, late.id]);
    }

    #[test]
    fn tombstones_compact_preserving_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dep = Dep::new();
        let recorders: Vec<_> = (0..6).map(|_| Recorder::new(&log)).collect();
        for recorder in &recorders {
            recorder.subscribe(&dep);
        }

        dep.remove_subscriber(recorders[1].id);
        dep.remove_subscriber(recorders[3].id);
        // Two tombstones, four live: no compaction yet.
        assert_eq!(dep.slot_count(), 6);

        dep.remove_subscriber(recorders[0].id);
        dep.remove_subscriber(recorders[4].id);
        // Four tombstones, two live: compacted.
        assert_eq!(dep.slot_count(), 2);
        assert_eq!(
            dep.subscriber_ids(),
            vec![recorders[2].id, recorders[5].id]
        );

        // The index still points at the right slots after compaction.
        dep.remove_subscriber(recorders[5].id);
        assert_eq!(dep.subscriber_ids(), vec![recorders[2].id]);
    }

    #[test]
    fn dropped_targets_are_pruned_on_notify() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dep = Dep::new();
        let kept = Recorder::new(&log);
        let dropped = Recorder::new(&log);

        kept.subscribe(&dep);
        dropped.subscribe(&dep);
        drop(dropped);

        dep.notify();
        assert_eq!(*log.lock(), vec![kept.id]);
        assert_eq!(dep.subscriber_ids(), vec![kept.id]);
    }
}
