//! Sink contract consumed by the orchestrator
//!
//! Sinks are downstream consumers of rendered records (file, terminal,
//! network shipper). The orchestrator fans records out to every registered
//! sink after they are durable in the WAL; the contract is deliberately
//! small so implementations stay interchangeable.

use std::io;

use timber_config::Level;

/// A downstream consumer of records
pub trait Sink: Send + Sync {
    /// Deliver one rendered record
    fn write(&self, record: &[u8]) -> io::Result<()>;

    /// Push any buffered records to their destination
    fn flush(&self) -> io::Result<()>;

    /// Release the sink's resources
    fn close(&self) -> io::Result<()>;

    /// Whether this sink wants records of the given severity
    fn check_level(&self, _level: Level) -> bool {
        true
    }

    /// Resize the sink's internal buffer, where one exists
    fn set_buffer_size(&self, _bytes: usize) {}
}
