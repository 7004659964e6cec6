//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever a cell it
//! read during its last run changes.
//!
//! # How Effects Work
//!
//! 1. `run()` unlinks the effect from every cell it is currently linked to.
//!
//! 2. The effect pushes itself onto the reactive context and calls its
//!    function. Every cell read along the way calls back into `add_dep`,
//!    which links both sides exactly once.
//!
//! 3. The context is popped, on panic as well, leaving the link set equal to
//!    the cells read during this run.
//!
//! 4. When a linked cell notifies, `update()` re-runs the effect (or hands it
//!    to the configured scheduler) before `notify()` moves on. A write made
//!    by the effect's own function, while it is the innermost running
//!    computation, is ignored unless the effect allows recursion. Writes from
//!    a child computation it runs still re-run it.
//!
//! Reads can be conditional, so the link set is rebuilt from scratch on every
//! run rather than diffed.
//!
//! # Ownership
//!
//! An effect owns handles to the cells it reads; cells hold only weak
//! references back. Dropping the last handle to an effect that no scope owns
//! unlinks it everywhere.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use super::context::ReactiveContext;
use super::dep::{Dep, DepId};
use super::options::{EffectOptions, Scheduler, StopHook};
use super::scope::{get_current_scope, EffectScope, ScopeMember, WeakScope};
use super::subscriber::{DependencyTarget, SubscriberId};

/// Mutable bookkeeping for one effect.
#[derive(Default)]
struct EffectState {
    stopped: bool,
    paused: bool,
    /// Set when a notification arrives while paused.
    pending: bool,
    /// Nesting depth of `run` for this effect.
    running: usize,
    run_count: usize,
    /// Cells read during the most recent run, in first-read order.
    deps: IndexMap<DepId, Dep>,
    scope: Option<WeakScope>,
}

pub(crate) struct EffectInner<T> {
    id: SubscriberId,
    this: Weak<EffectInner<T>>,
    func: Box<dyn Fn() -> T + Send + Sync>,
    allow_recurse: bool,
    scheduler: Option<Scheduler>,
    on_stop: Mutex<Option<StopHook>>,
    state: Mutex<EffectState>,
}

/// Decrements the running depth when a run ends, including by panic.
struct RunningGuard<'a> {
    state: &'a Mutex<EffectState>,
}

impl<'a> RunningGuard<'a> {
    fn enter(state: &'a Mutex<EffectState>) -> Self {
        state.lock().running += 1;
        Self { state }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().running -= 1;
    }
}

impl<T: 'static> EffectInner<T> {
    fn run(&self) -> Option<T> {
        if self.state.lock().stopped {
            trace!(effect = %self.id, "run skipped, effect stopped");
            return None;
        }
        let this: Arc<dyn DependencyTarget> = self.this.upgrade()?;

        self.cleanup();

        let _running = RunningGuard::enter(&self.state);
        let _ctx = ReactiveContext::enter(this);
        let value = (self.func)();

        self.state.lock().run_count += 1;
        Some(value)
    }

    /// Unlink from every cell and clear the link set.
    fn cleanup(&self) {
        let deps = std::mem::take(&mut self.state.lock().deps);
        for dep in deps.values() {
            dep.remove_subscriber(self.id);
        }
    }

    fn stop(&self) {
        let scope = {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.paused = false;
            state.pending = false;
            state.scope.take()
        };

        self.cleanup();

        if let Some(scope) = scope.and_then(|scope| scope.upgrade()) {
            scope.forget_effect(self.id);
        }
        if let Some(hook) = self.on_stop.lock().take() {
            hook();
        }
        trace!(effect = %self.id, "effect stopped");
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        if !state.stopped {
            state.paused = true;
        }
    }

    fn resume(&self) {
        let replay = {
            let mut state = self.state.lock();
            if !state.paused {
                return;
            }
            state.paused = false;
            std::mem::take(&mut state.pending)
        };

        if replay {
            self.update();
        }
    }
}

impl<T: 'static> DependencyTarget for EffectInner<T> {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn add_dep(&self, dep: &Dep) {
        {
            let mut state = self.state.lock();
            if state.stopped || state.deps.contains_key(&dep.id()) {
                return;
            }
            state.deps.insert(dep.id(), dep.clone());
        }
        dep.add_subscriber(self.id, self.this.clone());
    }

    fn update(&self) {
        {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            if !self.allow_recurse && ReactiveContext::running_subscriber() == Some(self.id) {
                trace!(effect = %self.id, "self-triggered update suppressed");
                return;
            }
            if state.paused {
                state.pending = true;
                trace!(effect = %self.id, "update deferred, effect paused");
                return;
            }
        }

        match &self.scheduler {
            Some(scheduler) => scheduler(),
            None => {
                self.run();
            }
        }
    }
}

impl<T: 'static> ScopeMember for EffectInner<T> {
    fn member_id(&self) -> SubscriberId {
        self.id
    }

    fn stop(&self) {
        EffectInner::stop(self);
    }

    fn pause(&self) {
        EffectInner::pause(self);
    }

    fn resume(&self) {
        EffectInner::resume(self);
    }
}

impl<T> Drop for EffectInner<T> {
    fn drop(&mut self) {
        for dep in self.state.get_mut().deps.values() {
            dep.remove_subscriber(self.id);
        }
    }
}

/// A side-effecting computation that re-runs when the cells it read change.
///
/// The type parameter is the function's return value, handed back by
/// [`Effect::run`]. Cloning an `Effect` yields another handle to the same
/// computation.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// ```
pub struct Effect<T = ()> {
    inner: Arc<EffectInner<T>>,
}

impl<T: 'static> Effect<T> {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(run, EffectOptions::new())
    }

    /// Create a new effect without running it.
    ///
    /// The effect links to nothing until the first [`Effect::run`].
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(run, EffectOptions::new().lazy())
    }

    /// Create a new effect with explicit options.
    ///
    /// The effect joins the scope named in `options`, or the ambient scope
    /// when none is named.
    pub fn with_options<F>(run: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let EffectOptions {
            lazy,
            allow_recurse,
            scheduler,
            on_stop,
            scope,
        } = options;

        let inner = Arc::new_cyclic(|this| EffectInner {
            id: SubscriberId::new(),
            this: this.clone(),
            func: Box::new(run),
            allow_recurse,
            scheduler,
            on_stop: Mutex::new(on_stop),
            state: Mutex::new(EffectState::default()),
        });
        let effect = Self { inner };

        if let Some(scope) = scope.or_else(get_current_scope) {
            effect.attach_scope(&scope);
        }
        if !lazy {
            effect.run();
        }

        effect
    }

    fn attach_scope(&self, scope: &EffectScope) {
        let member: Arc<dyn ScopeMember> = self.inner.clone();
        if scope.record_effect(member) {
            self.inner.state.lock().scope = Some(scope.downgrade());
        }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Run the function, re-tracking every cell it reads.
    ///
    /// Returns `None` without calling the function if the effect was stopped.
    /// A panic in the function propagates after the reactive context is
    /// restored; links made before the panic are kept.
    pub fn run(&self) -> Option<T> {
        self.inner.run()
    }

    /// React to a change in a linked cell, as [`Dep::notify`] does.
    pub fn update(&self) {
        DependencyTarget::update(&*self.inner);
    }

    /// Unlink from every cell, leave the owning scope, and never run again.
    ///
    /// Stopping twice is a no-op.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Swallow notifications until [`Effect::resume`].
    pub fn pause(&self) {
        self.inner.pause();
    }

    /// Stop swallowing notifications, replaying one update if any arrived
    /// while paused.
    pub fn resume(&self) {
        self.inner.resume();
    }

    /// Whether the effect has not been stopped.
    pub fn is_active(&self) -> bool {
        !self.inner.state.lock().stopped
    }

    /// Whether notifications are currently being swallowed.
    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    /// Whether the function is executing right now.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running > 0
    }

    /// Get the number of completed runs.
    pub fn run_count(&self) -> usize {
        self.inner.state.lock().run_count
    }

    /// Get the number of cells linked to this effect.
    pub fn dependency_count(&self) -> usize {
        self.inner.state.lock().deps.len()
    }

    /// Get the linked cells in first-read order.
    pub fn dependency_ids(&self) -> Vec<DepId> {
        self.inner.state.lock().deps.keys().copied().collect()
    }

    /// Check whether `dep` is linked to this effect.
    pub fn depends_on(&self, dep: DepId) -> bool {
        self.inner.state.lock().deps.contains_key(&dep)
    }
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &state.run_count)
            .field("dependency_count", &state.deps.len())
            .field("stopped", &state.stopped)
            .field("paused", &state.paused)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
