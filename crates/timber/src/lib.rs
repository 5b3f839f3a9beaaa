//! timber: high-throughput structured logging with a durable WAL core
//!
//! Records flow from the level-gated [`Logger`] into a double-buffered,
//! batching pipeline: every accepted record is CRC-framed into a write-ahead
//! log before any sink sees it, the destination file rotates by date and
//! size with optional gzip of retired files, and daily timezone-aware tasks
//! handle rollover and retention.
//!
//! # Example
//!
//! ```ignore
//! use timber::{Config, Level, Logger};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), timber::TimberError> {
//!     let logger = Logger::new(
//!         Config::new("/var/log/myapp")
//!             .with_level(Level::Debug)
//!             .with_async_writes(),
//!     )?;
//!
//!     logger.info("service started");
//!     logger.error("backend unreachable");
//!
//!     logger.close().await;
//!     Ok(())
//! }
//! ```
//!
//! Severity decides durability: `Error`, `Panic`, and `Fatal` are fsynced to
//! the WAL before the call returns; `Debug`/`Info`/`Warn` batch through the
//! double buffer when `enable_async` is on. `Fatal` only writes; process
//! termination stays with the host.

mod caller;
mod color;
mod error;
mod field;
mod logger;

pub use error::TimberError;
pub use field::{Field, FieldValue};
pub use logger::{Logger, FILE_SINK_KEY};

pub use timber_config::{CompressionLevel, Config, ConfigError, Level};
pub use timber_core::{
    BufferReader, BufferWriter, CoreError, DoubleBuffer, DoubleBufferConfig, Sink, WalReader,
    WalWriter, WriterConfig, CHUNK_SIZE, WAL_FILE,
};
pub use timber_rotate::{Clock, RotateError, RotationConfig, RotationEngine, SystemClock};
pub use timber_sinks::{FileSink, NetworkSink, TerminalSink, TerminalTarget};
