//! Rotation errors

use thiserror::Error;

/// Convenience alias for rotation results
pub type Result<T> = std::result::Result<T, RotateError>;

/// Errors surfaced by the rotation engine
#[derive(Debug, Error)]
pub enum RotateError {
    /// The engine was closed; the triggering write must be dropped
    #[error("rotation engine is closed")]
    Closed,

    /// The destination file is not open (a previous rotation failed)
    #[error("destination log file is not open")]
    FileNotOpen,

    /// Configured timezone is not a known IANA name
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    /// `sequence.stat` held something other than a decimal integer
    #[error("corrupt sequence file: {contents:?}")]
    BadSequence { contents: String },

    /// Underlying filesystem operation failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
