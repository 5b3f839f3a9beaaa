//! Errors surfaced by the ingestion and durability pipeline

use thiserror::Error;

/// Convenience alias used throughout the core
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors produced by the pool, double buffer, WAL, and orchestrator
#[derive(Debug, Error)]
pub enum CoreError {
    /// Operation attempted on a closed component
    #[error("buffer is closed")]
    BufferClosed,

    /// Async write found the buffer full even after a switch attempt
    #[error("buffer is full")]
    BufferFull,

    /// Pool allocation would exceed the configured maximum
    #[error("pool is at max size")]
    PoolExhausted,

    /// Pool was closed while a caller was waiting on it
    #[error("pool is closed")]
    PoolClosed,

    /// The OS accepted fewer bytes than requested
    #[error("short write: wrote {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// WAL batch write failed after every retry attempt
    #[error("wal write failed after {attempts} attempts: {source}")]
    WalRetriesExhausted {
        attempts: u32,
        source: std::io::Error,
    },

    /// Destination-file rotation failed; the triggering write is dropped
    #[error("rotation failed: {0}")]
    Rotation(#[from] timber_rotate::RotateError),

    /// Underlying file or directory operation failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
