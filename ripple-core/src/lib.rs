//! Ripple Core
//!
//! This crate provides the reactive core of the Ripple UI runtime.
//! It implements:
//!
//! - Dependency cells that link state to the computations reading it
//! - A thread-local tracking context with nested, panic-safe activation
//! - Effects that re-run when what they read changes
//! - Effect scopes that stop whole groups of effects at once
//!
//! Component instantiation, rendering, and templating live in higher layers
//! and use this crate only to run tracked functions, stop them, and create
//! child scopes.
//!
//! # Architecture
//!
//! - `reactive`: Cells, context, effects, scopes, and the primitives on top
//! - `error`: The error type for the few fallible operations
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::reactive::{EffectScope, Effect, Memo, Signal};
//!
//! let count = Signal::new(0);
//! let doubled = Memo::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! let scope = EffectScope::new();
//! scope.run(|| {
//!     Effect::new(move || {
//!         println!("Count: {}, Doubled: {}", count.get(), doubled.get());
//!     })
//! })?;
//!
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//!
//! scope.stop();
//! ```

pub mod error;
pub mod reactive;

pub use error::{ReactiveError, Result};
