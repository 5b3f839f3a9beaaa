//! Destination-file sink
//!
//! Appends records through the rotation engine's current handle; the engine
//! accounts every byte and decides when the file lineage rolls. The engine
//! itself is shared with the orchestrator and closed by its owner, not here.

use std::io;
use std::sync::Arc;

use timber_core::Sink;
use timber_rotate::RotationEngine;

/// Sink writing into the rotated destination log file
pub struct FileSink {
    engine: Arc<RotationEngine>,
}

impl FileSink {
    /// Wrap a shared rotation engine
    pub fn new(engine: Arc<RotationEngine>) -> Self {
        Self { engine }
    }
}

impl Sink for FileSink {
    fn write(&self, record: &[u8]) -> io::Result<()> {
        // Cover rotation for records arriving outside the synchronous path.
        self.engine.check().map_err(io::Error::other)?;

        let written = self.engine.append(record)?;
        if written != record.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {written} of {} bytes", record.len()),
            ));
        }
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        self.engine.flush()
    }

    fn close(&self) -> io::Result<()> {
        // The engine is shared; its owner closes it.
        Ok(())
    }
}
