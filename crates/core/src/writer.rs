//! Write orchestrator: double buffer + WAL + sink fan-out
//!
//! [`BufferWriter`] is the front door of the pipeline. High-severity records
//! go through [`sync_write`](BufferWriter::sync_write): rotation check, WAL
//! frame, fsync, then fan-out to every registered sink. Ordinary records go
//! through [`async_write`](BufferWriter::async_write): staged into the
//! consumer stream and a chunk-sized byte buffer whose swaps seal one
//! CRC-framed batch each for the WAL drain task.
//!
//! ```text
//! sync_write ──▶ rotation.check ──▶ wal.append_sync ──▶ sinks
//!
//! async_write ─▶ stream (DoubleBuffer) ─▶ delivery task ─▶ sinks
//!            └─▶ active buffer ──swap──▶ sealed frame ─▶ drain task ─▶ wal
//! ```
//!
//! Swaps are serialized under the buffer lock and never hold it across I/O;
//! the drain task owns the WAL retry loop, so a producer that triggered a
//! swap is never blocked on its outcome.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use timber_config::Level;
use timber_rotate::RotationEngine;

use crate::double_buffer::{BufferReader, DoubleBuffer, DoubleBufferConfig};
use crate::error::{CoreError, Result};
use crate::frame::{self, CHECKSUM_SIZE};
use crate::pool::BoundedPool;
use crate::sink::Sink;
use crate::wal::WalWriter;

/// Batch size of the asynchronous WAL path
pub const CHUNK_SIZE: usize = 4096;

/// Staging buffers kept by the buffer pool (active + draining + slack)
const BUFFER_POOL_SIZE: usize = 4;

/// Tuning for a [`BufferWriter`]
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Swap threshold of the WAL batching buffer
    pub chunk_size: usize,

    /// Interval of the periodic WAL flush task
    pub flush_interval: Duration,

    /// Sealed batches the WAL drain queue will hold before dropping
    pub drain_queue: usize,

    /// Tuning of the consumer stream
    pub stream: DoubleBufferConfig,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            flush_interval: Duration::from_secs(1),
            drain_queue: 64,
            stream: DoubleBufferConfig::default(),
        }
    }
}

/// Counters exposed by [`BufferWriter::metrics`]
#[derive(Debug, Default)]
pub struct WriterMetrics {
    /// Records written through the synchronous path
    pub sync_writes: AtomicU64,

    /// Records accepted by the asynchronous path
    pub async_writes: AtomicU64,

    /// Batch frames sealed by buffer swaps
    pub batches_sealed: AtomicU64,

    /// Batch frames dropped because the drain queue was full
    pub batches_dropped: AtomicU64,
}

struct Staging {
    active: BytesMut,
    draining: BytesMut,
}

/// Orchestrator gluing the double buffer, the WAL, and the sink fan-out
pub struct BufferWriter {
    staging: Mutex<Staging>,
    buffer_pool: Arc<BoundedPool<BytesMut>>,
    scratch_pool: Arc<BoundedPool<BytesMut>>,
    wal: Arc<WalWriter>,
    rotation: Arc<RotationEngine>,
    sinks: Arc<Mutex<HashMap<String, Arc<dyn Sink>>>>,
    stream: Arc<DoubleBuffer>,
    drain_tx: Mutex<Option<mpsc::Sender<BytesMut>>>,
    drain_handle: Mutex<Option<JoinHandle<()>>>,
    flusher_handle: Mutex<Option<JoinHandle<()>>>,
    delivery_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    chunk_size: usize,
    metrics: WriterMetrics,
}

impl BufferWriter {
    /// Open the WAL under `base_dir`, borrow two staging buffers from the
    /// pool, and start the background tasks (WAL drain, periodic flush,
    /// sink delivery).
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(
        base_dir: impl AsRef<Path>,
        rotation: Arc<RotationEngine>,
        cfg: WriterConfig,
    ) -> Result<Arc<Self>> {
        let chunk_size = cfg.chunk_size.max(1);
        let wal = Arc::new(WalWriter::open(base_dir)?);

        let buffer_pool = Arc::new(
            BoundedPool::new(BUFFER_POOL_SIZE, move || BytesMut::with_capacity(chunk_size))
                .with_reset(|mut buf: BytesMut| {
                    buf.clear();
                    buf
                }),
        );
        let active = buffer_pool.acquire()?;
        let draining = buffer_pool.acquire()?;

        let scratch_capacity = chunk_size + CHECKSUM_SIZE;
        let scratch_pool = Arc::new(
            BoundedPool::new(cfg.drain_queue + 4, move || {
                BytesMut::with_capacity(scratch_capacity)
            })
            .with_reset(|mut buf: BytesMut| {
                buf.clear();
                buf
            }),
        );

        let stream = DoubleBuffer::new(cfg.stream.clone())?;
        let (drain_tx, drain_rx) = mpsc::channel(cfg.drain_queue);

        let sinks: Arc<Mutex<HashMap<String, Arc<dyn Sink>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let writer = Arc::new(Self {
            staging: Mutex::new(Staging { active, draining }),
            buffer_pool,
            scratch_pool: Arc::clone(&scratch_pool),
            wal: Arc::clone(&wal),
            rotation,
            sinks: Arc::clone(&sinks),
            stream: Arc::clone(&stream),
            drain_tx: Mutex::new(Some(drain_tx)),
            drain_handle: Mutex::new(None),
            flusher_handle: Mutex::new(None),
            delivery_handle: Mutex::new(None),
            closed: AtomicBool::new(false),
            chunk_size,
            metrics: WriterMetrics::default(),
        });

        let drain = tokio::spawn(run_wal_drain(
            Arc::clone(&wal),
            Arc::clone(&scratch_pool),
            drain_rx,
        ));
        *writer.drain_handle.lock() = Some(drain);

        *writer.flusher_handle.lock() = Some(wal.spawn_flusher(cfg.flush_interval));

        let delivery = tokio::spawn(run_delivery(stream.register(), sinks));
        *writer.delivery_handle.lock() = Some(delivery);

        Ok(writer)
    }

    /// Durable write path for high-severity records.
    ///
    /// Runs the rotation check, appends one CRC-framed record to the WAL
    /// with an immediate fsync, then fans the record out to every registered
    /// sink. Every sink is attempted; the first sink error is returned.
    pub fn sync_write(&self, record: &[u8]) -> Result<()> {
        self.sync_write_filtered(record, None)
    }

    /// [`sync_write`](Self::sync_write) that skips sinks rejecting `level`
    /// via [`Sink::check_level`].
    pub fn sync_write_leveled(&self, level: Level, record: &[u8]) -> Result<()> {
        self.sync_write_filtered(record, Some(level))
    }

    fn sync_write_filtered(&self, record: &[u8], level: Option<Level>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::BufferClosed);
        }

        self.rotation.check()?;
        self.wal.append_sync(record)?;
        self.metrics.sync_writes.fetch_add(1, Ordering::Relaxed);

        let targets: Vec<Arc<dyn Sink>> = self.sinks.lock().values().cloned().collect();
        let mut first_err = None;
        for sink in targets {
            if let Some(level) = level {
                if !sink.check_level(level) {
                    continue;
                }
            }
            if let Err(e) = sink.write(record) {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Batched write path for ordinary records.
    ///
    /// The record enters the consumer stream, then the WAL batching buffer;
    /// when the buffer would cross the chunk size the swap protocol runs
    /// first and the sealed batch is queued for the WAL drain task. The call
    /// never waits on WAL I/O.
    pub fn async_write(&self, record: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::BufferClosed);
        }

        self.stream.write(Bytes::copy_from_slice(record))?;

        let sealed = {
            let mut staging = self.staging.lock();
            let sealed = if staging.active.len() + record.len() > self.chunk_size {
                self.seal_active_locked(&mut staging)?
            } else {
                None
            };
            staging.active.extend_from_slice(record);
            sealed
        };

        if let Some(framed) = sealed {
            self.dispatch_batch(framed);
        }
        self.metrics.async_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Register a sink under `key`, replacing any previous holder of the key
    pub fn add_sink(&self, key: impl Into<String>, sink: Arc<dyn Sink>) {
        self.sinks.lock().insert(key.into(), sink);
    }

    /// Remove the sink registered under `key`
    pub fn remove_sink(&self, key: &str) -> Option<Arc<dyn Sink>> {
        self.sinks.lock().remove(key)
    }

    /// Read handle over the consumer stream of async records
    pub fn register_stream(&self) -> BufferReader {
        self.stream.register()
    }

    /// Counter snapshot
    pub fn metrics(&self) -> &WriterMetrics {
        &self.metrics
    }

    /// The write-ahead log backing this writer
    pub fn wal(&self) -> &WalWriter {
        &self.wal
    }

    /// Stop the pipeline: seal any residual batch, run the drain queue dry,
    /// stop the flusher, close the stream and the WAL, return the staging
    /// buffers to their pool, and flush + close every sink. Idempotent;
    /// errors are logged and swallowed.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Residual bytes in the active buffer become one last batch.
        let sealed = {
            let mut staging = self.staging.lock();
            self.seal_active_locked(&mut staging).unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to seal residual batch at close");
                None
            })
        };
        let tx = self.drain_tx.lock().take();
        if let Some(tx) = tx {
            if let Some(framed) = sealed {
                if tx.send(framed).await.is_err() {
                    tracing::error!("wal drain task gone, residual batch dropped");
                }
            }
            drop(tx);
        }

        // The drain task finishes its queue once the sender is gone.
        if let Some(handle) = self.drain_handle.lock().take() {
            let _ = handle.await;
        }

        self.wal.close();
        if let Some(handle) = self.flusher_handle.lock().take() {
            let _ = handle.await;
        }

        self.stream.close().await;
        if let Some(handle) = self.delivery_handle.lock().take() {
            let _ = handle.await;
        }

        self.rotation.close();

        {
            let mut staging = self.staging.lock();
            let active = std::mem::take(&mut staging.active);
            let draining = std::mem::take(&mut staging.draining);
            self.buffer_pool.release(active);
            self.buffer_pool.release(draining);
        }
        self.buffer_pool.close();
        self.scratch_pool.close();

        let targets: Vec<Arc<dyn Sink>> = self.sinks.lock().values().cloned().collect();
        for sink in targets {
            if let Err(e) = sink.flush().and_then(|()| sink.close()) {
                tracing::warn!(error = %e, "sink close failed");
            }
        }
    }

    /// Swap protocol, caller holds the buffer lock: copy the active bytes
    /// into a pooled scratch slice, seal it with a trailing CRC, exchange
    /// the buffer roles, and reset the fresh active. Returns the sealed
    /// frame, or `None` when there was nothing staged.
    fn seal_active_locked(&self, staging: &mut Staging) -> Result<Option<BytesMut>> {
        if staging.active.is_empty() {
            return Ok(None);
        }

        let mut scratch = self.scratch_pool.acquire()?;
        scratch.extend_from_slice(&staging.active);
        frame::seal_in_place(&mut scratch);

        std::mem::swap(&mut staging.active, &mut staging.draining);
        staging.active.clear();

        self.metrics.batches_sealed.fetch_add(1, Ordering::Relaxed);
        Ok(Some(scratch))
    }

    /// Queue a sealed batch for the WAL drain task; a full queue drops the
    /// batch (the WAL is already behind by more than the queue depth).
    fn dispatch_batch(&self, framed: BytesMut) {
        let tx = self.drain_tx.lock();
        let Some(tx) = tx.as_ref() else {
            self.metrics.batches_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        match tx.try_send(framed) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(framed))
            | Err(mpsc::error::TrySendError::Closed(framed)) => {
                self.metrics.batches_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!(bytes = framed.len(), "wal drain queue full, batch dropped");
                self.scratch_pool.release(framed);
            }
        }
    }
}

/// Drain task: owns the WAL retry loop for sealed batches.
async fn run_wal_drain(
    wal: Arc<WalWriter>,
    scratch_pool: Arc<BoundedPool<BytesMut>>,
    mut rx: mpsc::Receiver<BytesMut>,
) {
    while let Some(framed) = rx.recv().await {
        if let Err(e) = wal.append_async(&framed).await {
            tracing::error!(bytes = framed.len(), error = %e, "wal batch dropped after retries");
        }
        scratch_pool.release(framed);
    }
}

/// Delivery task: forwards async records from the consumer stream to every
/// registered sink, best effort per sink.
async fn run_delivery(reader: BufferReader, sinks: Arc<Mutex<HashMap<String, Arc<dyn Sink>>>>) {
    while let Some(record) = reader.recv().await {
        let targets: Vec<Arc<dyn Sink>> = sinks.lock().values().cloned().collect();
        for sink in targets {
            if let Err(e) = sink.write(&record) {
                tracing::warn!(error = %e, "async sink delivery failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod writer_test;
