//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that can be linked to a [`Dep`]: effects,
//! memos, render functions, or a custom type implementing
//! [`DependencyTarget`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::dep::Dep;

/// Unique identifier for a subscriber.
///
/// Each subscriber (effect, memo, or other reactive computation) gets a unique
/// ID when created. Cells key their subscriber index by this ID, and effects
/// use it to detach themselves from their scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Anything that can subscribe to a [`Dep`].
///
/// The contract is deliberately small: an identity, a way to accept a link
/// while the target is the current tracking context, and a way to be told that
/// something it read has changed.
pub trait DependencyTarget: Send + Sync {
    /// The subscriber's identity, unique across the process.
    fn id(&self) -> SubscriberId;

    /// Called by [`Dep::depend`] while this target is the current one.
    ///
    /// Implementations decide whether to link: the cell itself performs no
    /// duplicate check.
    fn add_dep(&self, dep: &Dep);

    /// Called by [`Dep::notify`] when a linked cell changes.
    ///
    /// Must complete its work synchronously.
    fn update(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscriber_ids_increase() {
        let first = SubscriberId::new();
        let second = SubscriberId::new();
        assert!(second.raw() > first.raw());
        assert_eq!(format!("{}", first), format!("sub#{}", first.raw()));
    }
}
