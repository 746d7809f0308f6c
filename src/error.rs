//! Error types for checkpoint, restore, and continuation
//!
//! Every failure in the crate maps to one [`ReanudarError`] variant. All of
//! them are fatal for the run that raised them: callers propagate with `?`
//! and abandon the generation rather than retry, because a half-applied
//! restore or a silently padded read corrupts every token that follows.

use thiserror::Error;

/// Error type for state capture, restore, and generation
#[derive(Debug, Error)]
pub enum ReanudarError {
    /// Prompt produced no tokens
    #[error("Tokenization failed: {0}")]
    Tokenize(String),

    /// State buffer length disagrees with the engine's required size
    ///
    /// Signals configuration drift between the engine that captured the
    /// state and the engine consuming it. Never auto-corrected: the restore
    /// is rejected before any byte is applied.
    #[error("State size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Size the consuming engine requires
        expected: usize,
        /// Size that was offered
        actual: usize,
    },

    /// Durable storage failure
    ///
    /// A short read is fatal and surfaces here; missing bytes are never
    /// zero-padded.
    #[error("I/O error: {message}")]
    IoError {
        /// What failed, including the underlying cause
        message: String,
    },

    /// Engine failed to advance past a position
    ///
    /// The position counter is not advanced past the failure.
    #[error("Evaluate failed at position {position}: {reason}")]
    Evaluate {
        /// Position counter at the failed step
        position: usize,
        /// Engine-reported cause
        reason: String,
    },

    /// Engine or harness construction rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type alias for reanudar operations
pub type Result<T> = std::result::Result<T, ReanudarError>;
