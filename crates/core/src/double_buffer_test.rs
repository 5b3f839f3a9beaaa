//! Tests for the double-buffered staging area

use std::time::Duration;

use bytes::Bytes;

use crate::double_buffer::{DoubleBuffer, DoubleBufferConfig};
use crate::error::CoreError;

fn record(tag: &str, i: usize) -> Bytes {
    Bytes::from(format!("{tag}-{i:04}"))
}

// ============================================================================
// Write path
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_write_stages_into_active() {
    let buffer = DoubleBuffer::new(DoubleBufferConfig::with_capacity(16)).unwrap();

    buffer.write(Bytes::from_static(b"hello")).unwrap();
    assert_eq!(buffer.active_len(), 1);
    assert_eq!(buffer.staged_bytes(), 5);

    buffer.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fill_ratio_triggers_switch() {
    let cfg = DoubleBufferConfig::with_capacity(10)
        .with_switch_interval(Duration::from_secs(3600));
    let buffer = DoubleBuffer::new(cfg).unwrap();
    let reader = buffer.register();

    // Eight of ten slots hits the 0.8 fill ratio on the next write.
    for i in 0..9 {
        buffer.write(record("r", i)).unwrap();
    }
    assert!(
        buffer.active_len() < 9,
        "ninth write should have switched segments"
    );

    // Everything staged before the switch drains in order.
    for i in 0..8 {
        let got = reader.recv().await.unwrap();
        assert_eq!(got, record("r", i));
    }

    buffer.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_size_threshold_triggers_switch() {
    let cfg = DoubleBufferConfig::with_capacity(64)
        .with_size_threshold(100)
        .with_switch_interval(Duration::from_secs(3600));
    let buffer = DoubleBuffer::new(cfg).unwrap();
    let reader = buffer.register();

    let chunk = Bytes::from(vec![b'x'; 60]);
    buffer.write(chunk.clone()).unwrap();
    assert_eq!(buffer.staged_bytes(), 60);

    // 60 + 60 > 100 forces the switch before the second record lands.
    buffer.write(chunk.clone()).unwrap();
    assert_eq!(buffer.staged_bytes(), 60);

    let drained = reader.recv().await.unwrap();
    assert_eq!(drained.len(), 60);

    buffer.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timer_triggers_switch() {
    let cfg = DoubleBufferConfig::with_capacity(16)
        .with_switch_interval(Duration::from_millis(20));
    let buffer = DoubleBuffer::new(cfg).unwrap();
    let reader = buffer.register();

    buffer.write(Bytes::from_static(b"tick")).unwrap();

    let got = tokio::time::timeout(Duration::from_secs(2), reader.recv())
        .await
        .expect("timer switch should drain the record")
        .unwrap();
    assert_eq!(got, Bytes::from_static(b"tick"));

    buffer.close().await;
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_per_producer_fifo_across_switches() {
    let cfg = DoubleBufferConfig::with_capacity(8)
        .with_switch_interval(Duration::from_millis(10));
    let buffer = DoubleBuffer::new(cfg).unwrap();
    let reader = buffer.register();

    // Collect concurrently so drainers never back up on the read queue.
    let consumer = tokio::spawn(async move {
        let mut seen = Vec::new();
        while seen.len() < 50 {
            match tokio::time::timeout(Duration::from_secs(5), reader.recv()).await {
                Ok(Some(got)) => seen.push(got),
                _ => break,
            }
        }
        seen
    });

    for i in 0..50 {
        buffer.write(record("p", i)).unwrap();
        if i % 7 == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    let seen = consumer.await.unwrap();
    buffer.close().await;

    assert_eq!(seen.len(), 50);
    for (i, got) in seen.iter().enumerate() {
        assert_eq!(got, &record("p", i), "record {i} out of order");
    }
}

// ============================================================================
// Close
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_write_after_close_fails() {
    let buffer = DoubleBuffer::new(DoubleBufferConfig::with_capacity(8)).unwrap();
    buffer.close().await;

    let err = buffer.write(Bytes::from_static(b"late")).unwrap_err();
    assert!(matches!(err, CoreError::BufferClosed));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_drains_residue() {
    let cfg = DoubleBufferConfig::with_capacity(16)
        .with_switch_interval(Duration::from_secs(3600));
    let buffer = DoubleBuffer::new(cfg).unwrap();
    let reader = buffer.register();

    for i in 0..5 {
        buffer.write(record("z", i)).unwrap();
    }
    buffer.close().await;

    for i in 0..5 {
        let got = reader.recv().await.unwrap();
        assert_eq!(got, record("z", i));
    }
    assert!(reader.recv().await.is_none(), "readq should be closed");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_waits_for_drainers() {
    let cfg = DoubleBufferConfig::with_capacity(8)
        .with_switch_interval(Duration::from_millis(5));
    let buffer = DoubleBuffer::new(cfg).unwrap();
    let reader = buffer.register();

    for i in 0..30 {
        let _ = buffer.write(record("d", i));
    }
    buffer.close().await;
    assert_eq!(buffer.in_flight_drainers(), 0);

    // Consuming afterwards still yields whatever was accepted.
    let mut count = 0;
    while reader.recv().await.is_some() {
        count += 1;
    }
    assert!(count > 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_is_idempotent() {
    let buffer = DoubleBuffer::new(DoubleBufferConfig::with_capacity(8)).unwrap();
    buffer.close().await;
    buffer.close().await;
}
