//! Public error types.

use std::collections::TryReserveError;

use thiserror::Error;

/// Error returned by the duplicate-rejecting insertion paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InsertError {
    #[error("key already present")]
    DuplicateKey,
}

/// Error returned by the sizing operations.
#[derive(Debug, Error)]
pub enum ExpandError {
    /// A migration is already in progress; the table shape is pinned until
    /// it completes.
    #[error("rehash already in progress")]
    Rehashing,
    /// The requested size cannot hold the live entries.
    #[error("requested size does not cover {used} live entries")]
    TooSmall { used: usize },
    /// The rounded size equals the current one; nothing to do.
    #[error("table is already at the requested size")]
    SameSize,
    /// Resizing is disabled process-wide.
    #[error("resizing is disabled")]
    ResizeDisabled,
    /// The new bucket array could not be allocated (fallible path only).
    #[error("bucket array allocation failed")]
    Alloc(#[from] TryReserveError),
}
