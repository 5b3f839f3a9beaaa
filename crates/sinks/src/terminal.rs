//! Terminal sink
//!
//! Buffered stdout/stderr output. Records accumulate in an internal buffer
//! until it crosses the configured size (or someone flushes), which keeps
//! interleaving with other writers coarse instead of per-record. A severity
//! gate lets the terminal show only what an operator cares about while the
//! file keeps everything.

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use timber_config::Level;
use timber_core::Sink;

/// Default internal buffer size before an automatic flush
const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Which stream the sink writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalTarget {
    Stdout,
    Stderr,
}

/// Buffered terminal sink with a severity gate
pub struct TerminalSink {
    target: TerminalTarget,
    min_level: Level,
    buffer: Mutex<Vec<u8>>,
    buffer_size: AtomicUsize,
}

impl TerminalSink {
    /// Sink on stdout admitting `min_level` and above
    pub fn stdout(min_level: Level) -> Self {
        Self::new(TerminalTarget::Stdout, min_level)
    }

    /// Sink on stderr admitting `min_level` and above
    pub fn stderr(min_level: Level) -> Self {
        Self::new(TerminalTarget::Stderr, min_level)
    }

    fn new(target: TerminalTarget, min_level: Level) -> Self {
        Self {
            target,
            min_level,
            buffer: Mutex::new(Vec::with_capacity(DEFAULT_BUFFER_SIZE)),
            buffer_size: AtomicUsize::new(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    fn flush_locked(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        match self.target {
            TerminalTarget::Stdout => {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                handle.write_all(buffer)?;
                handle.flush()?;
            }
            TerminalTarget::Stderr => {
                let stderr = io::stderr();
                let mut handle = stderr.lock();
                handle.write_all(buffer)?;
                handle.flush()?;
            }
        }
        buffer.clear();
        Ok(())
    }
}

impl Sink for TerminalSink {
    fn write(&self, record: &[u8]) -> io::Result<()> {
        let mut buffer = self.buffer.lock();
        buffer.extend_from_slice(record);
        if buffer.len() >= self.buffer_size.load(Ordering::Relaxed) {
            self.flush_locked(&mut buffer)?;
        }
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        let mut buffer = self.buffer.lock();
        self.flush_locked(&mut buffer)
    }

    fn close(&self) -> io::Result<()> {
        self.flush()
    }

    fn check_level(&self, level: Level) -> bool {
        self.min_level.admits(level)
    }

    fn set_buffer_size(&self, bytes: usize) {
        self.buffer_size.store(bytes.max(1), Ordering::Relaxed);
    }
}
