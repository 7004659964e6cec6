//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a cell is read,
//! we can link the current computation to it.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., running an effect or memo), we push
//! the target onto the stack. When the computation completes, we pop it.
//!
//! This design supports nested reactive contexts (e.g., an effect that runs a
//! child effect, or reads a memo that recomputes). Because the stack lives in
//! thread-local storage, independent reactive trees on different threads never
//! see each other's targets.
//!
//! A `None` entry on the stack marks an untracked region: reads inside it do
//! not link to the computation further down the stack.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use super::subscriber::{DependencyTarget, SubscriberId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };

    /// Whether reads currently link at all. Saved values for
    /// `pause_tracking` / `enable_tracking` live in `TRACK_STACK`.
    static SHOULD_TRACK: Cell<bool> = const { Cell::new(true) };
    static TRACK_STACK: RefCell<Vec<bool>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Clone)]
struct ContextEntry {
    /// The computation that receives links, or `None` for an untracked region.
    target: Option<Arc<dyn DependencyTarget>>,
    /// Pushed by `set_current_target` on an empty stack; popped when that
    /// target is cleared again.
    base: bool,
}

impl ContextEntry {
    fn id(&self) -> Option<SubscriberId> {
        self.target.as_ref().map(|target| target.id())
    }
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given target.
    ///
    /// While this context is active, any cells that are read will
    /// call `target.add_dep`.
    ///
    /// The context is automatically exited when the returned guard is dropped.
    pub fn enter(target: Arc<dyn DependencyTarget>) -> Self {
        let subscriber_id = Some(target.id());
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                target: Some(target),
                base: false,
            });
        });

        Self { subscriber_id }
    }

    /// Enter an untracked region.
    ///
    /// Reads performed before the guard drops link to nothing, even when an
    /// outer computation is running.
    pub fn enter_untracked() -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                target: None,
                base: false,
            });
        });

        Self {
            subscriber_id: None,
        }
    }

    /// Check if there is a computation receiving links right now.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|entry| entry.target.is_some())
        })
    }

    /// Get the current target, if any.
    pub fn current_target() -> Option<Arc<dyn DependencyTarget>> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.target.clone())
        })
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(ContextEntry::id))
    }

    /// Get the innermost running computation, looking through untracked
    /// regions.
    pub fn running_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().iter().rev().find_map(ContextEntry::id))
    }

    /// Replace the current target and return the previous one.
    ///
    /// This is the low-level accessor for layers that cannot scope activation
    /// to a guard. The caller must hand the returned value back to
    /// `set_current_target` when it is done; [`ReactiveContext::enter`] is
    /// preferred wherever a lexical scope exists.
    ///
    /// On an empty stack the target gets a base entry of its own, which is
    /// removed when `None` is handed back, leaving the stack empty again.
    pub fn set_current_target(
        target: Option<Arc<dyn DependencyTarget>>,
    ) -> Option<Arc<dyn DependencyTarget>> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if target.is_none() && stack.last().is_some_and(|entry| entry.base) {
                return stack.pop().and_then(|entry| entry.target);
            }
            match stack.last_mut() {
                Some(entry) => std::mem::replace(&mut entry.target, target),
                None if target.is_none() => None,
                None => {
                    stack.push(ContextEntry { target, base: true });
                    None
                }
            }
        })
    }

    #[cfg(test)]
    fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// Whether a read right now would establish a link.
    pub fn should_track() -> bool {
        SHOULD_TRACK.with(Cell::get) && Self::is_active()
    }

    /// Suspend linking until the matching [`ReactiveContext::reset_tracking`].
    pub fn pause_tracking() {
        Self::push_tracking(false);
    }

    /// Force linking on until the matching [`ReactiveContext::reset_tracking`].
    pub fn enable_tracking() {
        Self::push_tracking(true);
    }

    /// Restore the tracking switch saved by the last pause or enable.
    pub fn reset_tracking() {
        let previous = TRACK_STACK.with(|saved| saved.borrow_mut().pop());
        SHOULD_TRACK.with(|flag| flag.set(previous.unwrap_or(true)));
    }

    fn push_tracking(enabled: bool) {
        let current = SHOULD_TRACK.with(Cell::get);
        TRACK_STACK.with(|saved| saved.borrow_mut().push(current));
        SHOULD_TRACK.with(|flag| flag.set(enabled));
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right context.
            // This helps catch bugs where contexts are mismatched.
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.id(),
                    self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id,
                    entry.id()
                );
            }
        });
    }
}

/// Run `f` without linking any reads to the current computation.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::enter_untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Dep;

    struct StubTarget {
        id: SubscriberId,
    }

    impl StubTarget {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: SubscriberId::new(),
            })
        }
    }

    impl DependencyTarget for StubTarget {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn add_dep(&self, _dep: &Dep) {}

        fn update(&self) {}
    }

    #[test]
    fn context_tracks_subscriber() {
        let target = StubTarget::new();
        let id = target.id;

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(target);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn nested_contexts() {
        let outer = StubTarget::new();
        let inner = StubTarget::new();
        let (id1, id2) = (outer.id, inner.id);

        {
            let _ctx1 = ReactiveContext::enter(outer);
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(inner);
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn context_unwinds_on_panic() {
        let target = StubTarget::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ctx = ReactiveContext::enter(target);
            panic!("computation failed");
        }));

        assert!(result.is_err());
        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn untracked_hides_outer_target() {
        let target = StubTarget::new();
        let id = target.id;
        let _ctx = ReactiveContext::enter(target);

        untracked(|| {
            assert!(!ReactiveContext::is_active());
            assert!(!ReactiveContext::should_track());
        });

        assert_eq!(ReactiveContext::current_subscriber(), Some(id));
    }

    #[test]
    fn set_current_target_returns_previous() {
        let first = StubTarget::new();
        let second = StubTarget::new();
        let second_id = second.id;

        let _ctx = ReactiveContext::enter(first.clone());
        let previous = ReactiveContext::set_current_target(Some(second));
        assert_eq!(previous.map(|t| t.id()), Some(first.id));
        assert_eq!(ReactiveContext::current_subscriber(), Some(second_id));

        let replaced = ReactiveContext::set_current_target(Some(first.clone()));
        assert_eq!(replaced.map(|t| t.id()), Some(second_id));
        assert_eq!(ReactiveContext::current_subscriber(), Some(first.id));
    }

    #[test]
    fn set_current_target_on_empty_stack_restores_empty() {
        let target = StubTarget::new();
        let id = target.id;
        assert_eq!(ReactiveContext::depth(), 0);

        let previous = ReactiveContext::set_current_target(Some(target));
        assert!(previous.is_none());
        assert_eq!(ReactiveContext::current_subscriber(), Some(id));

        let restored = ReactiveContext::set_current_target(previous);
        assert_eq!(restored.map(|t| t.id()), Some(id));
        assert_eq!(ReactiveContext::depth(), 0);
        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn running_subscriber_looks_through_untracked() {
        let target = StubTarget::new();
        let id = target.id;
        let _ctx = ReactiveContext::enter(target);

        untracked(|| {
            assert!(ReactiveContext::current_subscriber().is_none());
            assert_eq!(ReactiveContext::running_subscriber(), Some(id));
        });
    }

    #[test]
    fn pause_and_reset_tracking() {
        let _ctx = ReactiveContext::enter(StubTarget::new());
        assert!(ReactiveContext::should_track());

        ReactiveContext::pause_tracking();
        assert!(!ReactiveContext::should_track());

        ReactiveContext::enable_tracking();
        assert!(ReactiveContext::should_track());

        ReactiveContext::reset_tracking();
        assert!(!ReactiveContext::should_track());

        ReactiveContext::reset_tracking();
        assert!(ReactiveContext::should_track());
    }
}
