//! Error types for the reactive core.
//!
//! Most misuse of the core is a defined no-op (running a stopped effect,
//! stopping twice). The errors here cover the calls whose result the caller
//! cannot do without.

use crate::reactive::ScopeId;

/// Errors reported by the reactive core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReactiveError {
    /// The scope was stopped and cannot run or accept new members.
    #[error("effect scope {scope} is no longer active")]
    InactiveScope {
        /// The stopped scope.
        scope: ScopeId,
    },

    /// A scope-relative operation was called with no ambient scope.
    #[error("no effect scope is active on this thread")]
    NoActiveScope,
}

/// Result alias for reactive operations.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
