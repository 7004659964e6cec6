//! Reactive Primitives
//!
//! This module implements the reactive core: dependency cells, the tracking
//! context, effects, and effect scopes, plus the signals, maps, and memos
//! built on top of them.
//!
//! # Concepts
//!
//! ## Dependency Cells
//!
//! A [`Dep`] belongs to one reactive storage location. Reading the location
//! inside a running computation calls `depend()`, which links the two;
//! writing it calls `notify()`, which tells every linked computation.
//!
//! ## Effects
//!
//! An [`Effect`] is a computation that re-runs whenever a cell it read
//! changes. Each run starts by dropping every link and rebuilds them from the
//! reads it actually performs, so conditional reads never leave stale links.
//!
//! ## Scopes
//!
//! An [`EffectScope`] owns the effects and child scopes created while it is
//! ambient. Stopping a scope stops the whole subtree.
//!
//! ## Signals, Maps, and Memos
//!
//! [`Signal`] and [`ReactiveMap`] wrap plain data so reads depend and writes
//! notify. A [`Memo`] caches a derived value and is invalidated, not
//! recomputed, when its inputs change.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a cell is read, we check if there is an active
//! tracking context and, if so, hand the cell to the running computation.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod context;
mod dep;
mod effect;
mod map;
mod memo;
mod options;
mod scope;
mod signal;
mod subscriber;

pub use context::{untracked, ReactiveContext};
pub use dep::{Dep, DepId};
pub use effect::Effect;
pub use map::ReactiveMap;
pub use memo::{Memo, MemoState};
pub use options::{EffectOptions, Scheduler, StopHook};
pub use scope::{get_current_scope, on_scope_dispose, EffectScope, ScopeId};
pub use signal::Signal;
pub use subscriber::{DependencyTarget, SubscriberId};
