//! # Error Types
//!
//! Errors raised while registering or sequencing ordered items. All errors
//! use `thiserror` and carry the names of the offending items so a caller
//! can tell which registration to fix.

use thiserror::Error;

/// Error in dependency ordering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// An item with this name was already registered.
    #[error("item '{0}' is already registered")]
    DuplicateItem(String),

    /// Registering the item would close a dependency cycle.
    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    Cycle {
        /// Names along the cycle, starting and ending with the same item.
        cycle: Vec<String>,
    },

    /// An item depends on a name that was never registered.
    #[error("item '{item}' depends on unknown item '{dependency}'")]
    UnknownDependency {
        /// The item declaring the dependency.
        item: String,
        /// The missing dependency name.
        dependency: String,
    },
}
