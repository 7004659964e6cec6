//! Effect Scopes
//!
//! An [`EffectScope`] groups the effects and child scopes created while it is
//! the ambient scope, so a whole group can be stopped (or paused) with one
//! call. Scopes nest the way component trees do: a scope created while another
//! is ambient becomes its child unless created with [`EffectScope::detached`].
//!
//! # Ambient Scope
//!
//! Each thread has one ambient scope slot. [`EffectScope::run`] swaps it for
//! the duration of a closure and restores it on exit, panics included.
//! [`EffectScope::on`] and [`EffectScope::off`] do the same across calls that
//! cannot share one closure; nested `on` calls on the same scope are counted.
//!
//! # Ownership
//!
//! A scope owns its effects and child scopes. Children and effects refer back
//! to it weakly, so a scope dropped without being stopped takes its members
//! with it.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use super::subscriber::SubscriberId;
use crate::error::{ReactiveError, Result};

thread_local! {
    static ACTIVE_SCOPE: RefCell<Option<EffectScope>> = const { RefCell::new(None) };
}

/// Unique identifier for an effect scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Generate a new unique scope ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// The lifecycle surface a scope needs from the effects it owns.
pub(crate) trait ScopeMember: Send + Sync {
    fn member_id(&self) -> SubscriberId;
    fn stop(&self);
    fn pause(&self);
    fn resume(&self);
}

type Cleanup = Box<dyn FnOnce() + Send>;

struct ScopeState {
    stopped: bool,
    paused: bool,
    effects: IndexMap<SubscriberId, Arc<dyn ScopeMember>>,
    children: IndexMap<ScopeId, EffectScope>,
    cleanups: Vec<Cleanup>,
    parent: Option<WeakScope>,
    /// Depth of `on()` calls not yet matched by `off()`.
    on_depth: usize,
    /// Ambient scope saved by the outermost `on()`.
    previous: Option<EffectScope>,
}

struct ScopeInner {
    id: ScopeId,
    state: Mutex<ScopeState>,
}

/// Weak handle held by members and children.
#[derive(Clone)]
pub(crate) struct WeakScope(Weak<ScopeInner>);

impl WeakScope {
    pub(crate) fn upgrade(&self) -> Option<EffectScope> {
        self.0.upgrade().map(|inner| EffectScope { inner })
    }
}

/// Restores the previous ambient scope on drop.
struct AmbientGuard {
    previous: Option<EffectScope>,
}

impl AmbientGuard {
    fn enter(scope: EffectScope) -> Self {
        let previous = ACTIVE_SCOPE.with(|slot| slot.replace(Some(scope)));
        Self { previous }
    }
}

impl Drop for AmbientGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let replaced = ACTIVE_SCOPE.with(|slot| slot.replace(previous));
        drop(replaced);
    }
}

/// A lifecycle group of effects and nested scopes.
///
/// Cloning an `EffectScope` yields another handle to the same scope.
///
/// # Example
///
/// ```rust,ignore
/// let scope = EffectScope::new();
/// scope.run(|| {
///     Effect::new(move || render(&state));
///     EffectScope::new().run(|| Effect::new(move || log(&state)))
/// })?;
///
/// scope.stop(); // stops both effects
/// ```
#[derive(Clone)]
pub struct EffectScope {
    inner: Arc<ScopeInner>,
}

impl EffectScope {
    /// Create a scope, as a child of the ambient scope if there is one.
    pub fn new() -> Self {
        let scope = Self::create();
        if let Some(parent) = get_current_scope() {
            parent.adopt(&scope);
        }
        scope
    }

    /// Create a scope with no parent, whatever the ambient scope.
    pub fn detached() -> Self {
        Self::create()
    }

    fn create() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: ScopeId::new(),
                state: Mutex::new(ScopeState {
                    stopped: false,
                    paused: false,
                    effects: IndexMap::new(),
                    children: IndexMap::new(),
                    cleanups: Vec::new(),
                    parent: None,
                    on_depth: 0,
                    previous: None,
                }),
            }),
        }
    }

    fn adopt(&self, child: &EffectScope) {
        {
            let mut state = self.inner.state.lock();
            if state.stopped {
                return;
            }
            state.children.insert(child.id(), child.clone());
        }
        child.inner.state.lock().parent = Some(self.downgrade());
    }

    pub(crate) fn downgrade(&self) -> WeakScope {
        WeakScope(Arc::downgrade(&self.inner))
    }

    /// Take ownership of an effect. Returns `false` if the scope is stopped.
    ///
    /// An effect joining a paused scope starts paused.
    pub(crate) fn record_effect(&self, effect: Arc<dyn ScopeMember>) -> bool {
        let paused = {
            let mut state = self.inner.state.lock();
            if state.stopped {
                return false;
            }
            state.effects.insert(effect.member_id(), Arc::clone(&effect));
            state.paused
        };
        if paused {
            effect.pause();
        }
        true
    }

    pub(crate) fn forget_effect(&self, id: SubscriberId) {
        self.inner.state.lock().effects.shift_remove(&id);
    }

    /// Get the scope's unique ID.
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    /// Run `f` with this scope as the ambient scope.
    ///
    /// Effects and scopes created inside `f` are owned by this scope. Fails
    /// with [`ReactiveError::InactiveScope`] once the scope is stopped.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> Result<T> {
        if !self.is_active() {
            return Err(ReactiveError::InactiveScope { scope: self.id() });
        }
        let _ambient = AmbientGuard::enter(self.clone());
        Ok(f())
    }

    /// Make this scope ambient until the matching [`EffectScope::off`].
    ///
    /// Fails with [`ReactiveError::InactiveScope`] once the scope is stopped,
    /// leaving the ambient scope untouched.
    pub fn on(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.stopped {
                return Err(ReactiveError::InactiveScope { scope: self.inner.id });
            }
            state.on_depth += 1;
            if state.on_depth > 1 {
                return Ok(());
            }
        }
        let previous = ACTIVE_SCOPE.with(|slot| slot.replace(Some(self.clone())));
        self.inner.state.lock().previous = previous;
        Ok(())
    }

    /// Undo one [`EffectScope::on`]. The outermost call restores the scope
    /// that was ambient before it.
    pub fn off(&self) {
        let previous = {
            let mut state = self.inner.state.lock();
            if state.on_depth == 0 {
                return;
            }
            state.on_depth -= 1;
            if state.on_depth > 0 {
                return;
            }
            state.previous.take()
        };
        let replaced = ACTIVE_SCOPE.with(|slot| slot.replace(previous));
        drop(replaced);
    }

    /// Stop every owned effect, run cleanups, stop every child scope, and
    /// leave the parent. Stopping twice is a no-op.
    pub fn stop(&self) {
        let (effects, cleanups, children, parent) = {
            let mut state = self.inner.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            (
                std::mem::take(&mut state.effects),
                std::mem::take(&mut state.cleanups),
                std::mem::take(&mut state.children),
                state.parent.take(),
            )
        };

        debug!(
            scope = %self.inner.id,
            effects = effects.len(),
            cleanups = cleanups.len(),
            children = children.len(),
            "scope stopped"
        );

        for effect in effects.values() {
            effect.stop();
        }
        for cleanup in cleanups {
            cleanup();
        }
        for child in children.values() {
            child.stop();
        }
        if let Some(parent) = parent.and_then(|parent| parent.upgrade()) {
            parent.inner.state.lock().children.shift_remove(&self.inner.id);
        }
    }

    /// Pause every owned effect and child scope.
    pub fn pause(&self) {
        let (effects, children) = {
            let mut state = self.inner.state.lock();
            if state.stopped || state.paused {
                return;
            }
            state.paused = true;
            Self::members(&state)
        };
        for effect in &effects {
            effect.pause();
        }
        for child in &children {
            child.pause();
        }
    }

    /// Resume every owned effect and child scope.
    pub fn resume(&self) {
        let (effects, children) = {
            let mut state = self.inner.state.lock();
            if state.stopped || !state.paused {
                return;
            }
            state.paused = false;
            Self::members(&state)
        };
        for effect in &effects {
            effect.resume();
        }
        for child in &children {
            child.resume();
        }
    }

    fn members(state: &ScopeState) -> (Vec<Arc<dyn ScopeMember>>, Vec<EffectScope>) {
        (
            state.effects.values().cloned().collect(),
            state.children.values().cloned().collect(),
        )
    }

    /// Register `f` to run when this scope stops.
    pub fn on_dispose<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.stopped {
            return Err(ReactiveError::InactiveScope { scope: self.inner.id });
        }
        state.cleanups.push(Box::new(f));
        Ok(())
    }

    /// Whether the scope has not been stopped.
    pub fn is_active(&self) -> bool {
        !self.inner.state.lock().stopped
    }

    /// Whether the scope is paused.
    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    /// Get the parent scope, if it is still alive.
    pub fn parent(&self) -> Option<EffectScope> {
        self.inner
            .state
            .lock()
            .parent
            .as_ref()
            .and_then(WeakScope::upgrade)
    }

    /// Get the number of effects owned directly by this scope.
    pub fn effect_count(&self) -> usize {
        self.inner.state.lock().effects.len()
    }

    /// Get the number of direct child scopes.
    pub fn child_count(&self) -> usize {
        self.inner.state.lock().children.len()
    }
}

impl Default for EffectScope {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for EffectScope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for EffectScope {}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("EffectScope")
            .field("id", &self.inner.id)
            .field("stopped", &state.stopped)
            .field("paused", &state.paused)
            .field("effect_count", &state.effects.len())
            .field("child_count", &state.children.len())
            .finish()
    }
}

/// Get the ambient scope on this thread, if any.
pub fn get_current_scope() -> Option<EffectScope> {
    ACTIVE_SCOPE.with(|slot| slot.borrow().clone())
}

/// Register `f` to run when the ambient scope stops.
pub fn on_scope_dispose<F>(f: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    match get_current_scope() {
        Some(scope) => scope.on_dispose(f),
        None => Err(ReactiveError::NoActiveScope),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
