//! Facade errors

use thiserror::Error;

/// Errors surfaced while building or driving a [`Logger`](crate::Logger)
#[derive(Debug, Error)]
pub enum TimberError {
    /// Configuration rejected
    #[error(transparent)]
    Config(#[from] timber_config::ConfigError),

    /// Pipeline failure (pool, buffer, WAL)
    #[error(transparent)]
    Core(#[from] timber_core::CoreError),

    /// Destination-file rotation failure
    #[error(transparent)]
    Rotate(#[from] timber_rotate::RotateError),
}
