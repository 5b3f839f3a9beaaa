//! Write-ahead log
//!
//! Every accepted record is framed (payload + CRC32) and appended here
//! before any downstream sink sees it. The file is opened in append mode and
//! wrapped in a 4 KiB buffered writer behind a mutex; durability comes from
//! flush + fsync, immediately on the synchronous path and batched on the
//! asynchronous path.
//!
//! Batch appends retry on I/O failure with exponential backoff plus uniform
//! jitter; the periodic flush task bounds the loss window for batches that
//! have not yet hit a swap-triggered flush.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, Result};
use crate::frame::{self, CHECKSUM_SIZE};

/// WAL filename inside the base directory
pub const WAL_FILE: &str = "wal.log";

/// In-memory write buffer in front of the file descriptor
pub const WAL_BUFFER_SIZE: usize = 4096;

/// Retry attempts for batch appends
const MAX_RETRIES: u32 = 5;

/// Base delay of the retry backoff
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Append-only durable log of framed records
pub struct WalWriter {
    /// File lock; guards every write, flush, and fsync
    inner: Mutex<BufWriter<File>>,
    path: PathBuf,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl WalWriter {
    /// Open (or create) `wal.log` under `base_dir` in append mode.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let path = base_dir.as_ref().join(WAL_FILE);
        let file = open_append(&path)?;
        Ok(Self {
            inner: Mutex::new(BufWriter::with_capacity(WAL_BUFFER_SIZE, file)),
            path,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably append one record as its own frame.
    ///
    /// The frame is written in a single call under the file lock and the file
    /// is fsynced before returning. A short write is fatal for the record and
    /// reported without retry; I/O errors come back verbatim.
    pub fn append_sync(&self, record: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::BufferClosed);
        }
        let framed = frame::seal(record);

        let mut wal = self.inner.lock();
        let written = wal.write(&framed)?;
        if written != record.len() + CHECKSUM_SIZE {
            return Err(CoreError::ShortWrite {
                written,
                expected: record.len() + CHECKSUM_SIZE,
            });
        }
        flush_and_sync(&mut wal)
    }

    /// Append a pre-sealed batch frame, retrying on I/O failure.
    ///
    /// Up to five attempts with delay `100ms << attempt` plus uniform jitter
    /// in `[0, delay/2)`. Returns the final error when every attempt failed;
    /// the batch is then the caller's to drop.
    pub async fn append_async(&self, framed: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::BufferClosed);
        }

        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            let result = {
                let mut wal = self.inner.lock();
                wal.write_all(framed)
                    .and_then(|()| wal.flush())
                    .and_then(|()| wal.get_ref().sync_all())
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = MAX_RETRIES,
                        error = %e,
                        "wal batch append failed, retrying"
                    );
                    last_err = Some(e);
                }
            }

            if attempt + 1 < MAX_RETRIES {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }

        Err(CoreError::WalRetriesExhausted {
            attempts: MAX_RETRIES,
            source: last_err.unwrap_or_else(|| std::io::Error::other("wal append failed")),
        })
    }

    /// Flush the in-memory buffer and fsync the file
    pub fn flush(&self) -> Result<()> {
        let mut wal = self.inner.lock();
        flush_and_sync(&mut wal)
    }

    /// Start the periodic flush task. Failures are logged and the ticker
    /// keeps running; the task exits on close.
    pub fn spawn_flusher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let wal = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                if let Err(e) = wal.flush() {
                    tracing::error!(error = %e, "periodic wal flush failed");
                }
            }
        })
    }

    /// Stop the flusher, flush + fsync once more, and reject further
    /// appends. Idempotent; close errors are swallowed after logging.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        if let Err(e) = self.flush() {
            tracing::error!(error = %e, "final wal flush failed");
        }
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Sequential frame reader for WAL replay.
///
/// Frames carry no length prefix, so the caller supplies each payload length
/// from its knowledge of the batching discipline (record sizes on the sync
/// path, batch sizes on the async path).
pub struct WalReader {
    file: File,
}

impl WalReader {
    /// Open a WAL file for replay
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            file: File::open(path)?,
        })
    }

    /// Read the next frame given its payload length.
    ///
    /// Returns the payload and whether the stored CRC matched.
    pub fn read_frame(&mut self, payload_len: usize) -> Result<(Vec<u8>, bool)> {
        let mut buf = vec![0u8; payload_len + CHECKSUM_SIZE];
        self.file.read_exact(&mut buf)?;
        let ok = frame::verify(&buf);
        buf.truncate(payload_len);
        Ok((buf, ok))
    }

    /// Bytes remaining after the current position
    pub fn remaining(&mut self) -> Result<u64> {
        let pos = self.file.stream_position()?;
        let len = self.file.metadata()?.len();
        Ok(len - pos)
    }

    /// Rewind to the start of the log
    pub fn rewind(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o666);
    }
    Ok(options.open(path)?)
}

fn flush_and_sync(wal: &mut BufWriter<File>) -> Result<()> {
    wal.flush()?;
    wal.get_ref().sync_all()?;
    Ok(())
}

/// Exponential backoff with uniform jitter in `[0, delay/2)`
fn backoff_delay(attempt: u32) -> Duration {
    let delay = RETRY_BASE_DELAY * (1 << attempt);
    let half = (delay.as_millis() as u64 / 2).max(1);
    let jitter = rand::thread_rng().gen_range(0..half);
    delay + Duration::from_millis(jitter)
}

#[cfg(test)]
#[path = "wal_test.rs"]
mod wal_test;
