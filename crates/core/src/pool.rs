//! Bounded pool of reusable resources
//!
//! Provides pre-warmed, capped caching of expensive-to-build values (staging
//! buffers, scratch frames) to keep allocations off the hot path. Handout and
//! return accounting runs on CAS'd atomic counters; the slot storage itself
//! sits behind a short mutex.
//!
//! # Example
//!
//! ```ignore
//! let pool = BoundedPool::new(16, || BytesMut::with_capacity(4096))
//!     .with_reset(|mut buf| { buf.clear(); buf });
//!
//! let buf = pool.acquire()?;
//! // ... use buf ...
//! pool.release(buf);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{CoreError, Result};

/// Fraction of `max_size` allocated eagerly at construction
const PREWARM_RATIO: f64 = 0.3;

type MakeFn<T> = Box<dyn Fn() -> T + Send + Sync>;
type ResetFn<T> = Box<dyn Fn(T) -> T + Send + Sync>;
type DisposeFn<T> = Box<dyn Fn(T) + Send + Sync>;

/// Counter snapshot returned by [`BoundedPool::stats`]
///
/// `reuses + allocations == total_gets` holds at any quiescent point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Times the constructor ran (pre-warm included)
    pub allocations: u64,

    /// Acquires served from the pool instead of the constructor
    pub reuses: u64,

    /// Items dropped because the pool was full (or shrunk)
    pub discards: u64,
}

/// Bounded cache of reusable resources
///
/// At most `max_size` instances exist at a time, pooled and handed-out
/// combined. Acquire prefers a pooled instance, allocates below the cap, and
/// spins briefly when every instance is in use; release resets and re-pools
/// below the cap, disposing otherwise.
pub struct BoundedPool<T> {
    /// Pooled instances; pushes are reserved on `in_pool` first
    slots: Mutex<VecDeque<T>>,

    /// Instances currently sitting in the pool
    in_pool: AtomicUsize,

    /// Live instances, pooled or handed out
    live: AtomicUsize,

    /// Logical capacity; adjustable via [`resize`](Self::resize)
    max_size: AtomicUsize,

    allocations: AtomicU64,
    total_gets: AtomicU64,
    discards: AtomicU64,

    closed: AtomicBool,

    make: MakeFn<T>,
    reset: Option<ResetFn<T>>,
    dispose: Option<DisposeFn<T>>,
}

impl<T> BoundedPool<T> {
    /// Create a pool capped at `max_size` (clamped to ≥ 1), pre-warming 30%
    /// of the capacity so first acquires skip the constructor.
    pub fn new<F>(max_size: usize, make: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let max_size = max_size.max(1);
        let pool = Self {
            slots: Mutex::new(VecDeque::with_capacity(max_size)),
            in_pool: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            max_size: AtomicUsize::new(max_size),
            allocations: AtomicU64::new(0),
            total_gets: AtomicU64::new(0),
            discards: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            make: Box::new(make),
            reset: None,
            dispose: None,
        };

        let prewarm = (max_size as f64 * PREWARM_RATIO) as usize;
        if prewarm > 0 {
            let mut slots = pool.slots.lock();
            for _ in 0..prewarm {
                slots.push_back((pool.make)());
            }
            pool.live.store(prewarm, Ordering::Release);
            pool.in_pool.store(prewarm, Ordering::Release);
            pool.allocations.store(prewarm as u64, Ordering::Release);
        }

        pool
    }

    /// Install a reset hook applied to every released instance
    #[must_use]
    pub fn with_reset<F>(mut self, reset: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.reset = Some(Box::new(reset));
        self
    }

    /// Install a disposer run on discarded instances and at close
    #[must_use]
    pub fn with_dispose<F>(mut self, dispose: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.dispose = Some(Box::new(dispose));
        self
    }

    /// Acquire an instance.
    ///
    /// Pooled instances are preferred; below the cap a fresh one is built.
    /// When every instance is handed out, the call spins (yielding) until a
    /// release frees one. Fails with `PoolClosed` once the pool is closed,
    /// or `PoolExhausted` if a shrink left more instances live than the cap
    /// allows.
    pub fn acquire(&self) -> Result<T> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(CoreError::PoolClosed);
            }

            let pooled = self.in_pool.load(Ordering::Acquire);
            if pooled > 0 {
                if self
                    .in_pool
                    .compare_exchange(pooled, pooled - 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    let item = self.pop_slot();
                    self.total_gets.fetch_add(1, Ordering::Relaxed);
                    return Ok(item);
                }
                continue;
            }

            let live = self.live.load(Ordering::Acquire);
            let max = self.max_size.load(Ordering::Acquire);
            if live > max {
                return Err(CoreError::PoolExhausted);
            }
            if live < max {
                if self
                    .live
                    .compare_exchange(live, live + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.allocations.fetch_add(1, Ordering::Relaxed);
                    self.total_gets.fetch_add(1, Ordering::Relaxed);
                    return Ok((self.make)());
                }
                continue;
            }

            // Everything is handed out; wait for a release.
            std::thread::yield_now();
        }
    }

    /// Return an instance.
    ///
    /// The reset hook runs first. Below the cap the instance re-enters the
    /// pool; at the cap (or after close) it is disposed and the live count
    /// drops.
    pub fn release(&self, item: T) {
        let item = match &self.reset {
            Some(reset) => reset(item),
            None => item,
        };

        if self.closed.load(Ordering::Acquire) {
            self.discard(item);
            return;
        }

        loop {
            let pooled = self.in_pool.load(Ordering::Acquire);
            if pooled >= self.max_size.load(Ordering::Acquire) {
                self.discards.fetch_add(1, Ordering::Relaxed);
                self.discard(item);
                return;
            }
            if self
                .in_pool
                .compare_exchange(pooled, pooled + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.slots.lock().push_back(item);
                return;
            }
        }
    }

    /// Change the capacity; shrinking drains excess pooled items through the
    /// disposer.
    pub fn resize(&self, new_max: usize) {
        let new_max = new_max.max(1);
        loop {
            let old = self.max_size.load(Ordering::Acquire);
            if self
                .max_size
                .compare_exchange(old, new_max, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }

        loop {
            let pooled = self.in_pool.load(Ordering::Acquire);
            if pooled <= new_max {
                return;
            }
            if self
                .in_pool
                .compare_exchange(pooled, pooled - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let item = self.pop_slot();
                self.discards.fetch_add(1, Ordering::Relaxed);
                self.discard(item);
            }
        }
    }

    /// Close the pool: every later acquire fails, every later release
    /// disposes, and all currently pooled items are disposed now.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        loop {
            let pooled = self.in_pool.load(Ordering::Acquire);
            if pooled == 0 {
                return;
            }
            if self
                .in_pool
                .compare_exchange(pooled, pooled - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let item = self.pop_slot();
                self.discard(item);
            }
        }
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current capacity
    pub fn max_size(&self) -> usize {
        self.max_size.load(Ordering::Acquire)
    }

    /// Instances currently pooled
    pub fn available(&self) -> usize {
        self.in_pool.load(Ordering::Acquire)
    }

    /// Counter snapshot
    pub fn stats(&self) -> PoolStats {
        let allocations = self.allocations.load(Ordering::Relaxed);
        let total_gets = self.total_gets.load(Ordering::Relaxed);
        PoolStats {
            allocations,
            reuses: total_gets.saturating_sub(allocations),
            discards: self.discards.load(Ordering::Relaxed),
        }
    }

    /// Pop one slot. The caller already won a CAS decrement on `in_pool`,
    /// which guarantees a matching push either landed or is about to; spin
    /// for the brief window where a releaser sits between its counter
    /// reservation and its push.
    fn pop_slot(&self) -> T {
        loop {
            if let Some(item) = self.slots.lock().pop_front() {
                return item;
            }
            std::hint::spin_loop();
        }
    }

    fn discard(&self, item: T) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        if let Some(dispose) = &self.dispose {
            dispose(item);
        }
    }
}

impl<T> std::fmt::Debug for BoundedPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedPool")
            .field("max_size", &self.max_size.load(Ordering::Relaxed))
            .field("in_pool", &self.in_pool.load(Ordering::Relaxed))
            .field("live", &self.live.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod pool_test;
