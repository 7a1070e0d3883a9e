//! Error types for switchlib
//!
//! Defines the core error types used throughout the routing fabric.
//! Crossbar drivers surface their own failure types; the core carries them
//! uninterpreted.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwitchError {
    /// Selecting a different source on an output whose lock count is still
    /// positive.
    #[error("output in use: {0}")]
    LockedOutput(String),

    /// Releasing an output whose lock count is already zero.
    #[error("invalid lock state: {0}")]
    AlreadyUnlocked(String),

    /// No path through the current fabric can deliver the requested source
    /// to the requested output.
    #[error("unroutable: {0}")]
    UnroutableOutput(String),

    /// A crossbar driver failed while programming a route. Fatal for the
    /// current select; never retried by the core.
    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

/// Result type that uses SwitchError
pub type Result<T> = std::result::Result<T, SwitchError>;
