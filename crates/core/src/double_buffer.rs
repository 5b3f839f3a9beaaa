//! Swap-based staging for asynchronous records
//!
//! Two bounded record segments trade roles: `active` accepts non-blocking
//! producer writes while the previously retired segment drains into a shared
//! read queue. Switches trigger on staged bytes, fill ratio, or a periodic
//! timer; each switch closes the active segment, hands it to a drainer task,
//! and installs a fresh segment from the bounded pool.
//!
//! ```text
//! [write()] → [active segment] ──switch──▶ [drain worker] → [readq] → consumers
//!                  ▲                               │
//!                  └──────────── pool ◀────────────┘
//! ```
//!
//! Producers never block on drain I/O. Retired segments queue up for one
//! long-lived drain worker that empties them strictly in retirement order,
//! which is what keeps per-producer FIFO intact across switches; the
//! in-flight counter tracks segments handed to the worker but not yet
//! returned to the pool.
//!
//! The background tasks assume a multi-threaded runtime, like the rest of
//! the pipeline.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, Result};
use crate::pool::BoundedPool;

/// Default staged-byte switch threshold (10 MiB)
pub const SIZE_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Default periodic switch interval
pub const TIME_THRESHOLD: Duration = Duration::from_millis(500);

/// Fill ratio of the active segment that forces a switch
const FILL_RATIO: f64 = 0.8;

/// Poll interval while waiting for in-flight drainers at close
const DRAINER_POLL: Duration = Duration::from_millis(5);

/// Segments kept by the internal pool: active + passive + retiring slack
const SEGMENT_POOL_SIZE: usize = 8;

/// Tuning for a [`DoubleBuffer`]
#[derive(Debug, Clone)]
pub struct DoubleBufferConfig {
    /// Record capacity of each segment
    pub capacity: usize,

    /// Staged bytes that force a switch
    pub size_threshold: u64,

    /// Periodic switch interval
    pub switch_interval: Duration,
}

impl Default for DoubleBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            size_threshold: SIZE_THRESHOLD,
            switch_interval: TIME_THRESHOLD,
        }
    }
}

impl DoubleBufferConfig {
    /// Config with a given per-segment record capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ..Default::default()
        }
    }

    /// Override the staged-byte switch threshold
    #[must_use]
    pub fn with_size_threshold(mut self, bytes: u64) -> Self {
        self.size_threshold = bytes;
        self
    }

    /// Override the periodic switch interval
    #[must_use]
    pub fn with_switch_interval(mut self, interval: Duration) -> Self {
        self.switch_interval = interval;
        self
    }
}

/// One bounded FIFO segment of records
struct Segment {
    queue: ArrayQueue<Bytes>,
    closed: AtomicBool,
}

enum PushRejected {
    Closed(Bytes),
    Full(Bytes),
}

impl Segment {
    fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, record: Bytes) -> std::result::Result<(), PushRejected> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PushRejected::Closed(record));
        }
        self.queue.push(record).map_err(PushRejected::Full)
    }

    fn pop(&self) -> Option<Bytes> {
        self.queue.pop()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn reopen(&self) {
        while self.queue.pop().is_some() {}
        self.closed.store(false, Ordering::Release);
    }
}

/// Cloneable consumer handle over the read queue
///
/// Multiple readers compete for drained records; each record is delivered to
/// exactly one reader.
#[derive(Clone)]
pub struct BufferReader {
    inner: Arc<tokio::sync::Mutex<mpsc::Receiver<Bytes>>>,
}

impl BufferReader {
    /// Receive the next drained record; `None` once the buffer closed and
    /// the read queue emptied.
    pub async fn recv(&self) -> Option<Bytes> {
        self.inner.lock().await.recv().await
    }

    /// Non-blocking receive
    pub fn try_recv(&self) -> Option<Bytes> {
        self.inner.try_lock().ok()?.try_recv().ok()
    }
}

struct Slots {
    active: Arc<Segment>,
    passive: Arc<Segment>,
    size: u64,
}

/// Double-buffered record staging with a pooled segment supply
pub struct DoubleBuffer {
    slots: Mutex<Slots>,
    pool: Arc<BoundedPool<Arc<Segment>>>,
    readq_tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    drain_tx: Mutex<Option<mpsc::UnboundedSender<Arc<Segment>>>>,
    reader: BufferReader,
    drainers: Arc<AtomicUsize>,
    closed: AtomicBool,
    cancel: CancellationToken,
    fill_limit: usize,
    cfg: DoubleBufferConfig,
}

impl DoubleBuffer {
    /// Build the buffer and start its periodic switch timer.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(cfg: DoubleBufferConfig) -> Result<Arc<Self>> {
        let capacity = cfg.capacity.max(1);
        let pool = Arc::new(
            BoundedPool::new(SEGMENT_POOL_SIZE, move || Arc::new(Segment::new(capacity)))
                .with_reset(|segment: Arc<Segment>| {
                    segment.reopen();
                    segment
                }),
        );

        let active = pool.acquire()?;
        let passive = pool.acquire()?;

        let (readq_tx, readq_rx) = mpsc::channel(capacity * 2);
        let (drain_tx, drain_rx) = mpsc::unbounded_channel();
        let fill_limit = ((capacity as f64) * FILL_RATIO).ceil() as usize;

        let buffer = Arc::new(Self {
            slots: Mutex::new(Slots {
                active,
                passive,
                size: 0,
            }),
            pool: Arc::clone(&pool),
            readq_tx: Mutex::new(Some(readq_tx.clone())),
            drain_tx: Mutex::new(Some(drain_tx)),
            reader: BufferReader {
                inner: Arc::new(tokio::sync::Mutex::new(readq_rx)),
            },
            drainers: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            fill_limit,
            cfg,
        });

        tokio::spawn(run_drain_worker(
            drain_rx,
            readq_tx,
            pool,
            Arc::clone(&buffer.drainers),
            buffer.cancel.clone(),
        ));
        buffer.clone().spawn_switch_timer();
        Ok(buffer)
    }

    /// Stage one record.
    ///
    /// Checks the switch triggers, then attempts a non-blocking enqueue to
    /// the active segment. A full segment forces one switch attempt before
    /// the write is rejected with `BufferFull`.
    pub fn write(&self, record: Bytes) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::BufferClosed);
        }

        let len = record.len() as u64;
        let mut slots = self.slots.lock();

        if slots.size + len > self.cfg.size_threshold || slots.active.len() >= self.fill_limit {
            self.switch_locked(&mut slots)?;
        }

        match slots.active.push(record) {
            Ok(()) => {
                slots.size += len;
                Ok(())
            }
            Err(PushRejected::Closed(_)) => Err(CoreError::BufferClosed),
            Err(PushRejected::Full(record)) => {
                self.switch_locked(&mut slots)?;
                match slots.active.push(record) {
                    Ok(()) => {
                        slots.size += len;
                        Ok(())
                    }
                    Err(_) => Err(CoreError::BufferFull),
                }
            }
        }
    }

    /// Register a consumer of drained records
    pub fn register(&self) -> BufferReader {
        self.reader.clone()
    }

    /// Records currently staged in the active segment
    pub fn active_len(&self) -> usize {
        self.slots.lock().active.len()
    }

    /// Bytes staged since the last switch
    pub fn staged_bytes(&self) -> u64 {
        self.slots.lock().size
    }

    /// Drainer tasks currently forwarding retired segments
    pub fn in_flight_drainers(&self) -> usize {
        self.drainers.load(Ordering::Acquire)
    }

    /// Close the buffer: signal first, reject new writes, wait for in-flight
    /// drainers, forward any residue, close the read queue, and return the
    /// segments to the pool. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();

        let (active, passive) = {
            let slots = self.slots.lock();
            slots.active.close();
            slots.passive.close();
            (Arc::clone(&slots.active), Arc::clone(&slots.passive))
        };

        while self.drainers.load(Ordering::Acquire) > 0 {
            tokio::time::sleep(DRAINER_POLL).await;
        }

        // One final drain of whatever the last active segment still holds.
        if let Some(tx) = self.readq_tx.lock().as_ref() {
            while let Some(record) = active.pop() {
                if tx.try_send(record).is_err() {
                    break;
                }
            }
        }
        *self.readq_tx.lock() = None;
        *self.drain_tx.lock() = None;

        self.pool.release(active);
        self.pool.release(passive);
        self.pool.close();
    }

    /// Swap the active segment out for draining. Caller holds the slot lock,
    /// which serializes switches against producers and keeps retirement
    /// order identical to staging order.
    fn switch_locked(&self, slots: &mut Slots) -> Result<()> {
        let retired = Arc::clone(&slots.active);
        retired.close();
        {
            let tx = self.drain_tx.lock();
            if let Some(tx) = tx.as_ref() {
                // Counted before the send; the worker decrements when done.
                self.drainers.fetch_add(1, Ordering::AcqRel);
                if tx.send(Arc::clone(&retired)).is_err() {
                    self.drainers.fetch_sub(1, Ordering::AcqRel);
                }
            }
        }

        let fresh = self.pool.acquire().map_err(|e| match e {
            CoreError::PoolClosed => CoreError::BufferClosed,
            other => other,
        })?;

        slots.active = std::mem::replace(&mut slots.passive, fresh);
        slots.size = 0;
        Ok(())
    }

    /// Periodic switch so sparse producers still see bounded latency.
    fn spawn_switch_timer(self: Arc<Self>) {
        let cancel = self.cancel.clone();
        let interval = self.cfg.switch_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                if self.closed.load(Ordering::Acquire) {
                    return;
                }
                let mut slots = self.slots.lock();
                if slots.active.len() == 0 {
                    continue;
                }
                if let Err(e) = self.switch_locked(&mut slots) {
                    tracing::warn!(error = %e, "periodic buffer switch failed");
                }
            }
        });
    }
}

/// Drain worker: empties retired segments strictly in retirement order.
///
/// Each forwarded record waits for read-queue space unless shutdown was
/// signalled, at which point the remainder moves best-effort so the worker
/// can finish and close() can stop waiting.
async fn run_drain_worker(
    mut rx: mpsc::UnboundedReceiver<Arc<Segment>>,
    readq_tx: mpsc::Sender<Bytes>,
    pool: Arc<BoundedPool<Arc<Segment>>>,
    drainers: Arc<AtomicUsize>,
    cancel: CancellationToken,
) {
    while let Some(segment) = rx.recv().await {
        let mut shutdown = cancel.is_cancelled();
        while let Some(record) = segment.pop() {
            if shutdown {
                if readq_tx.try_send(record).is_err() {
                    break;
                }
                continue;
            }
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = readq_tx.reserve() => permit.ok(),
            };
            match permit {
                Some(permit) => permit.send(record),
                None => {
                    shutdown = true;
                    if readq_tx.try_send(record).is_err() {
                        break;
                    }
                }
            }
        }
        pool.release(segment);
        drainers.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for DoubleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoubleBuffer")
            .field("capacity", &self.cfg.capacity)
            .field("staged_bytes", &self.staged_bytes())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
#[path = "double_buffer_test.rs"]
mod double_buffer_test;
