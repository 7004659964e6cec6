//! Signal Implementation
//!
//! A Signal is the simplest reactive storage location: one value and the
//! [`Dep`] that guards it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (effect or memo), the
//!    signal's cell links that computation.
//!
//! 2. When a signal's value is written, the cell notifies every linked
//!    computation, synchronously.
//!
//! 3. Notifications trigger re-execution of dependent computations, which
//!    re-link to whatever they read this time.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - The value (stored behind Arc, shared by clones)
//! - A dependency cell (id plus subscriber slots)

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::dep::{Dep, DepId};

/// A reactive signal holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the signal. Must be Clone + Send + Sync.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value (tracked inside effects)
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// The current value.
    value: Arc<RwLock<T>>,

    /// Cell linking readers to writers.
    dep: Dep,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(RwLock::new(value)),
            dep: Dep::new(),
        }
    }

    /// Get the signal's unique ID (the ID of its cell).
    pub fn id(&self) -> DepId {
        self.dep.id()
    }

    /// Get the cell backing this signal.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also links the
    /// current computation to the signal.
    pub fn get(&self) -> T {
        self.dep.depend();
        self.value.read().clone()
    }

    /// Read the current value by reference, tracking it like [`Signal::get`].
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.dep.depend();
        f(&self.value.read())
    }

    /// Get the current value without tracking dependencies.
    ///
    /// Use this when you need to read the value without establishing
    /// a reactive dependency.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Set a new value and notify subscribers.
    ///
    /// This will trigger re-execution of all dependent computations.
    pub fn set(&self, value: T) {
        *self.value.write() = value;
        self.dep.notify();
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.value.read();
            f(&guard)
        };
        self.set(new_value);
    }

    /// Mutate the value in place, then notify subscribers.
    pub fn modify<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        f(&mut self.value.write());
        self.dep.notify();
    }

    /// Notify subscribers without changing the value.
    pub fn notify(&self) {
        self.dep.notify();
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.dep.subscriber_count()
    }
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Set a new value, notifying subscribers only if it differs.
    ///
    /// Returns whether the value changed.
    pub fn set_if_changed(&self, value: T) -> bool {
        {
            let mut guard = self.value.write();
            if *guard == value {
                return false;
            }
            *guard = value;
        }
        self.dep.notify();
        true
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            dep: self.dep.clone(),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.dep.id())
            .field("value", &self.get_untracked())
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
    use crate::reactive::{untracked, Effect};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);

        signal.modify(|v| *v *= 2);
        assert_eq!(signal.get(), 30);
    }

    #[test]
    fn signal_notifies_effects() {
        let signal = Signal::new(0);
        let seen = Arc::new(AtomicI32::new(-1));
        let seen_clone = seen.clone();

        let signal_clone = signal.clone();
        let _effect = Effect::new(move || {
            seen_clone.store(signal_clone.get(), Ordering::SeqCst);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(signal.subscriber_count(), 1);

        signal.set(1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        signal.update(|v| v + 1);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let signal = Signal::new(0);
        let signal_clone = signal.clone();

        let effect = Effect::new(move || {
            signal_clone.get_untracked();
            untracked(|| signal_clone.get());
        });

        assert_eq!(effect.dependency_count(), 0);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn set_if_changed_skips_equal_values() {
        let signal = Signal::new(String::from("a"));
        let signal_clone = signal.clone();

        let effect = Effect::new(move || {
            signal_clone.with(|s| s.len());
        });

        assert!(!signal.set_if_changed(String::from("a")));
        assert_eq!(effect.run_count(), 1);

        assert!(signal.set_if_changed(String::from("b")));
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }
}
