//! Tests for the bounded pool

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::CoreError;
use crate::pool::BoundedPool;

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_prewarm_fills_thirty_percent() {
    let pool = BoundedPool::new(10, || vec![0u8; 16]);
    assert_eq!(pool.available(), 3);

    let stats = pool.stats();
    assert_eq!(stats.allocations, 3);
    assert_eq!(stats.reuses, 0);
}

#[test]
fn test_max_size_clamped_to_one() {
    let pool = BoundedPool::new(0, || 7u32);
    assert_eq!(pool.max_size(), 1);
    assert!(pool.acquire().is_ok());
}

// ============================================================================
// Acquire / release accounting
// ============================================================================

#[test]
fn test_acquire_prefers_pooled_instance() {
    let pool = BoundedPool::new(10, || vec![0u8; 16]);
    let before = pool.stats().allocations;

    let item = pool.acquire().unwrap();
    assert_eq!(pool.stats().allocations, before, "prewarmed item reused");
    pool.release(item);
}

#[test]
fn test_release_runs_reset() {
    let pool = BoundedPool::new(4, || Vec::<u8>::with_capacity(8)).with_reset(|mut v| {
        v.clear();
        v
    });

    let mut item = pool.acquire().unwrap();
    item.extend_from_slice(b"dirty");
    pool.release(item);

    // Drain prewarmed slots until the released one comes back around.
    for _ in 0..pool.available() {
        let got = pool.acquire().unwrap();
        assert!(got.is_empty());
    }
}

#[test]
fn test_release_beyond_capacity_disposes() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&disposed);
    let pool = BoundedPool::new(2, || 1u32).with_dispose(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();
    pool.release(a);
    pool.release(b);
    // Pool now holds 2 of 2; a foreign release must be discarded.
    pool.release(99);

    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert_eq!(pool.stats().discards, 1);
}

#[test]
fn test_counter_law_reuses_plus_allocations() {
    let pool = BoundedPool::new(4, || 0u64);
    for _ in 0..100 {
        let item = pool.acquire().unwrap();
        pool.release(item);
    }

    let stats = pool.stats();
    assert_eq!(stats.reuses + stats.allocations, 100);
    assert!(stats.allocations <= 4);
}

// ============================================================================
// Concurrency (scenario S1)
// ============================================================================

#[test]
fn test_ten_thousand_concurrent_pairs() {
    let pool = Arc::new(BoundedPool::new(10, || vec![0u8; 32]));
    let mut handles = Vec::new();

    for _ in 0..20 {
        let pool = Arc::clone(&pool);
        handles.push(std::thread::spawn(move || {
            for _ in 0..500 {
                let item = pool.acquire().expect("acquire should not fail");
                pool.release(item);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = pool.stats();
    assert_eq!(stats.reuses + stats.allocations, 10_000);
    assert!(stats.allocations <= 10, "allocations {} > 10", stats.allocations);
    assert!(pool.available() <= 10);
}

// ============================================================================
// Resize
// ============================================================================

#[test]
fn test_resize_shrink_drains_excess() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&disposed);
    let pool = BoundedPool::new(8, || 0u32).with_dispose(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // Fill the pool completely.
    let items: Vec<_> = (0..8).map(|_| pool.acquire().unwrap()).collect();
    for item in items {
        pool.release(item);
    }
    assert_eq!(pool.available(), 8);

    pool.resize(3);
    assert_eq!(pool.max_size(), 3);
    assert_eq!(pool.available(), 3);
    assert_eq!(disposed.load(Ordering::SeqCst), 5);
}

#[test]
fn test_resize_grow_allows_more_allocations() {
    let pool = BoundedPool::new(1, || 0u32);
    let first = pool.acquire().unwrap();

    pool.resize(2);
    let second = pool.acquire().unwrap();
    pool.release(first);
    pool.release(second);

    assert!(pool.stats().allocations <= 2);
}

// ============================================================================
// Close
// ============================================================================

#[test]
fn test_close_disposes_pooled_items() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&disposed);
    let pool = BoundedPool::new(10, || 0u32).with_dispose(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let pooled = pool.available();
    pool.close();
    assert_eq!(disposed.load(Ordering::SeqCst), pooled);
}

#[test]
fn test_acquire_after_close_fails() {
    let pool = BoundedPool::new(4, || 0u32);
    pool.close();
    assert!(matches!(pool.acquire(), Err(CoreError::PoolClosed)));
}

#[test]
fn test_release_after_close_disposes() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&disposed);
    let pool = BoundedPool::new(4, || 0u32).with_dispose(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let item = pool.acquire().unwrap();
    pool.close();
    let after_close = disposed.load(Ordering::SeqCst);

    pool.release(item);
    assert_eq!(disposed.load(Ordering::SeqCst), after_close + 1);
}

#[test]
fn test_close_is_idempotent() {
    let pool = BoundedPool::new(4, || 0u32);
    pool.close();
    pool.close();
    assert!(pool.is_closed());
}
