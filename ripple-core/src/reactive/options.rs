//! Effect construction options.

use std::fmt;
use std::sync::Arc;

use super::scope::EffectScope;

/// Callback invoked in place of a re-run when a scheduled effect is notified.
pub type Scheduler = Arc<dyn Fn() + Send + Sync>;

/// Callback invoked once when an effect stops.
pub type StopHook = Box<dyn FnOnce() + Send>;

/// Options for [`Effect::with_options`](super::Effect::with_options).
///
/// ```rust,ignore
/// let queue = Arc::new(Mutex::new(0));
/// let q = queue.clone();
/// let effect = Effect::with_options(
///     move || render(),
///     EffectOptions::new().lazy().scheduler(move || *q.lock() += 1),
/// );
/// ```
#[derive(Default)]
pub struct EffectOptions {
    pub(crate) lazy: bool,
    pub(crate) allow_recurse: bool,
    pub(crate) scheduler: Option<Scheduler>,
    pub(crate) on_stop: Option<StopHook>,
    pub(crate) scope: Option<EffectScope>,
}

impl EffectOptions {
    /// Default options: run immediately, no scheduler, no recursion.
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not run on construction.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Allow a notification raised by the effect's own run to re-run it.
    pub fn allow_recurse(mut self) -> Self {
        self.allow_recurse = true;
        self
    }

    /// Call `scheduler` instead of re-running when notified.
    ///
    /// The scheduler decides when (and whether) to call `run` again.
    pub fn scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Call `hook` once when the effect stops.
    pub fn on_stop<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_stop = Some(Box::new(hook));
        self
    }

    /// Register with `scope` instead of the ambient scope.
    pub fn scope(mut self, scope: &EffectScope) -> Self {
        self.scope = Some(scope.clone());
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("allow_recurse", &self.allow_recurse)
            .field("scheduler", &self.scheduler.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .field("scope", &self.scope.as_ref().map(EffectScope::id))
            .finish()
    }
}
