//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation inside its own lazy
//!    effect and caches the result.
//!
//! 2. When accessed again, if nothing it read has changed, returns the cache.
//!
//! 3. When a dependency changes, the effect's scheduler marks the memo dirty
//!    and notifies the memo's own cell instead of recomputing.
//!
//! 4. On next access, the memo recomputes.
//!
//! Reading a memo inside an effect links the effect to the memo's cell, while
//! the memo's recomputation links its own effect to the signals it reads. The
//! two links never mix: the recomputation runs in its own reactive context,
//! nested inside the reader's.

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::context::untracked;
use super::dep::{Dep, DepId};
use super::effect::Effect;
use super::options::EffectOptions;

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// The memo needs to recompute on next access.
    Dirty,
}

type Compute<T> = Arc<dyn Fn() -> T + Send + Sync>;

struct MemoInner<T> {
    /// The computation function, shared with the effect.
    compute: Compute<T>,

    /// The cached value (None if never computed).
    value: RwLock<Option<T>>,

    /// Current dirty state.
    state: Mutex<MemoState>,

    /// Cell for readers of this memo.
    dep: Dep,

    /// Tracks what the computation reads.
    effect: Effect<T>,
}

impl<T> MemoInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Mark dirty and tell readers, once per invalidation.
    fn invalidate(&self) {
        {
            let mut state = self.state.lock();
            if *state == MemoState::Dirty {
                return;
            }
            *state = MemoState::Dirty;
        }
        self.dep.notify();
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone + Send + Sync.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(2);
/// let doubled = Memo::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<MemoInner<T>>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let compute: Compute<T> = Arc::new(compute);

        let inner = Arc::new_cyclic(|this: &Weak<MemoInner<T>>| {
            let scheduled = this.clone();
            let stopped = this.clone();
            let run = Arc::clone(&compute);
            let effect = Effect::with_options(
                move || run(),
                EffectOptions::new()
                    .lazy()
                    .scheduler(move || {
                        if let Some(memo) = scheduled.upgrade() {
                            memo.invalidate();
                        }
                    })
                    // Once stopped, the cache can no longer be trusted.
                    .on_stop(move || {
                        if let Some(memo) = stopped.upgrade() {
                            *memo.state.lock() = MemoState::Dirty;
                        }
                    }),
            );

            MemoInner {
                compute,
                value: RwLock::new(None),
                state: Mutex::new(MemoState::Dirty),
                dep: Dep::new(),
                effect,
            }
        });

        Self { inner }
    }

    /// Get the memo's unique ID (the ID of its cell).
    pub fn id(&self) -> DepId {
        self.inner.dep.id()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a memo's value.
    pub fn get(&self) -> T {
        self.inner.dep.depend();

        if self.state() == MemoState::Clean {
            if let Some(value) = self.inner.value.read().clone() {
                return value;
            }
        }
        self.recompute()
    }

    /// Mark the memo as needing recomputation and notify its readers.
    pub fn mark_dirty(&self) {
        self.inner.invalidate();
    }

    /// Recompute the memo's value.
    ///
    /// A stopped memo no longer tracks anything, so it computes untracked
    /// on every access.
    fn recompute(&self) -> T {
        let Some(value) = self.inner.effect.run() else {
            return untracked(|| (self.inner.compute)());
        };

        *self.inner.value.write() = Some(value.clone());
        *self.inner.state.lock() = MemoState::Clean;
        value
    }

    /// Stop tracking. Later reads compute on demand, every time.
    pub fn stop(&self) {
        self.inner.effect.stop();
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        *self.inner.state.lock()
    }

    /// Get the number of computations reading this memo.
    pub fn dependent_count(&self) -> usize {
        self.inner.dep.subscriber_count()
    }

    /// Get the number of cells the last computation read.
    pub fn dependency_count(&self) -> usize {
        self.inner.effect.dependency_count()
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
