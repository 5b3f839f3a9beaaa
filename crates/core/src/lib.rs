//! Ingestion and durability pipeline
//!
//! The core accepts opaque records from many concurrent producers, persists
//! them through a CRC-framed write-ahead log, and hands them to registered
//! sinks. Four pieces cooperate:
//!
//! - [`pool::BoundedPool`]: capped, pre-warmed cache of reusable buffers
//! - [`double_buffer::DoubleBuffer`]: swap-based staging with a consumer
//!   stream, triggered by size, fill ratio, or a timer
//! - [`wal::WalWriter`]: durable append log with batched flush + fsync and
//!   bounded retry
//! - [`writer::BufferWriter`]: the orchestrator exposing the synchronous
//!   and asynchronous write paths
//!
//! Destination-file lineage (rotation, compression, retention) lives in the
//! `timber-rotate` crate; the orchestrator drives its `check()` on every
//! synchronous write.

pub mod double_buffer;
pub mod error;
pub mod frame;
pub mod pool;
pub mod sink;
pub mod wal;
pub mod writer;

pub use double_buffer::{BufferReader, DoubleBuffer, DoubleBufferConfig};
pub use error::{CoreError, Result};
pub use pool::{BoundedPool, PoolStats};
pub use sink::Sink;
pub use wal::{WalReader, WalWriter, WAL_FILE};
pub use writer::{BufferWriter, WriterConfig, CHUNK_SIZE};
