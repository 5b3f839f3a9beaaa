//! Tests for the write orchestrator

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use timber_config::{CompressionLevel, Level};
use timber_rotate::{RotationConfig, RotationEngine, SystemClock};

use crate::error::CoreError;
use crate::sink::Sink;
use crate::wal::{WalReader, WAL_FILE};
use crate::writer::{BufferWriter, WriterConfig};

fn rotation(dir: &TempDir) -> Arc<RotationEngine> {
    RotationEngine::new(
        RotationConfig {
            base_dir: dir.path().to_path_buf(),
            filename: "server.log".to_string(),
            threshold: 100 * 1024 * 1024,
            period_days: 30,
            compress: false,
            compression_level: CompressionLevel::Default,
            timezone: "UTC".to_string(),
        },
        Arc::new(SystemClock),
    )
    .unwrap()
}

fn writer(dir: &TempDir) -> Arc<BufferWriter> {
    BufferWriter::new(dir.path(), rotation(dir), WriterConfig::default()).unwrap()
}

/// Sink that remembers everything written to it
#[derive(Default)]
struct RecordingSink {
    records: Mutex<Vec<Vec<u8>>>,
    min_level: Option<Level>,
}

impl RecordingSink {
    fn gated(min_level: Level) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            min_level: Some(min_level),
        }
    }

    fn seen(&self) -> Vec<Vec<u8>> {
        self.records.lock().clone()
    }
}

impl Sink for RecordingSink {
    fn write(&self, record: &[u8]) -> io::Result<()> {
        self.records.lock().push(record.to_vec());
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        Ok(())
    }

    fn check_level(&self, level: Level) -> bool {
        match self.min_level {
            Some(min) => min.admits(level),
            None => true,
        }
    }
}

/// Sink whose writes always fail
struct FailingSink;

impl Sink for FailingSink {
    fn write(&self, _record: &[u8]) -> io::Result<()> {
        Err(io::Error::other("sink is broken"))
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Synchronous path (scenario: "boom\n" grows the WAL by 9 bytes)
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_write_frames_record_with_crc() {
    let dir = TempDir::new().unwrap();
    let writer = writer(&dir);

    writer.sync_write(b"boom\n").unwrap();

    let wal = std::fs::read(dir.path().join(WAL_FILE)).unwrap();
    assert_eq!(wal.len(), 9);
    assert_eq!(&wal[..5], b"boom\n");
    assert_eq!(&wal[5..], crc32fast::hash(b"boom\n").to_be_bytes());

    writer.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_write_fans_out_to_all_sinks() {
    let dir = TempDir::new().unwrap();
    let writer = writer(&dir);

    let recording = Arc::new(RecordingSink::default());
    writer.add_sink("broken", Arc::new(FailingSink));
    writer.add_sink("recording", Arc::clone(&recording) as Arc<dyn Sink>);

    let err = writer.sync_write(b"critical").unwrap_err();
    assert!(matches!(err, CoreError::Io(_)), "first sink error surfaces");
    assert_eq!(
        recording.seen(),
        vec![b"critical".to_vec()],
        "remaining sinks are still attempted"
    );

    writer.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_leveled_sync_write_respects_sink_gates() {
    let dir = TempDir::new().unwrap();
    let writer = writer(&dir);

    let picky = Arc::new(RecordingSink::gated(Level::Error));
    let lenient = Arc::new(RecordingSink::default());
    writer.add_sink("picky", Arc::clone(&picky) as Arc<dyn Sink>);
    writer.add_sink("lenient", Arc::clone(&lenient) as Arc<dyn Sink>);

    writer.sync_write_leveled(Level::Warn, b"just a warn").unwrap();
    writer.sync_write_leveled(Level::Fatal, b"fatal").unwrap();

    assert_eq!(picky.seen(), vec![b"fatal".to_vec()]);
    assert_eq!(lenient.seen().len(), 2);

    writer.close().await;
}

// ============================================================================
// Asynchronous path (scenario: ten 512-byte records, chunked at 4096)
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_async_writes_batch_into_two_frames() {
    let dir = TempDir::new().unwrap();
    let writer = writer(&dir);

    let record = vec![b'r'; 512];
    for _ in 0..10 {
        writer.async_write(&record).unwrap();
    }
    writer.close().await;

    let wal_len = std::fs::metadata(dir.path().join(WAL_FILE)).unwrap().len();
    assert_eq!(wal_len, (4096 + 4) + (1024 + 4));

    let mut reader = WalReader::open(dir.path().join(WAL_FILE)).unwrap();
    let (batch, ok) = reader.read_frame(4096).unwrap();
    assert!(ok, "first batch CRC must verify");
    assert_eq!(batch.len(), 4096);
    assert!(batch.iter().all(|&b| b == b'r'));

    let (batch, ok) = reader.read_frame(1024).unwrap();
    assert!(ok, "second batch CRC must verify");
    assert_eq!(batch.len(), 1024);
    assert_eq!(reader.remaining().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_async_records_reach_sinks_through_the_stream() {
    let dir = TempDir::new().unwrap();
    let writer = writer(&dir);

    let recording = Arc::new(RecordingSink::default());
    writer.add_sink("recording", Arc::clone(&recording) as Arc<dyn Sink>);

    writer.async_write(b"streamed record").unwrap();

    // The periodic switch (500ms default) pushes the record through.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(3);
    while recording.seen().is_empty() && std::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(recording.seen(), vec![b"streamed record".to_vec()]);

    writer.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_metrics_count_batches() {
    let dir = TempDir::new().unwrap();
    let writer = writer(&dir);

    let record = vec![b'm'; 512];
    for _ in 0..10 {
        writer.async_write(&record).unwrap();
    }
    writer.close().await;

    let metrics = writer.metrics();
    use std::sync::atomic::Ordering;
    assert_eq!(metrics.async_writes.load(Ordering::Relaxed), 10);
    assert_eq!(metrics.batches_sealed.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.batches_dropped.load(Ordering::Relaxed), 0);
}

// ============================================================================
// Close
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_writes_after_close_fail_fast() {
    let dir = TempDir::new().unwrap();
    let writer = writer(&dir);
    writer.close().await;

    assert!(matches!(
        writer.sync_write(b"late"),
        Err(CoreError::BufferClosed)
    ));
    assert!(matches!(
        writer.async_write(b"late"),
        Err(CoreError::BufferClosed)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let writer = writer(&dir);
    writer.close().await;
    writer.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_flushes_residual_batch() {
    let dir = TempDir::new().unwrap();
    let writer = writer(&dir);

    writer.async_write(b"small tail").unwrap();
    writer.close().await;

    let mut reader = WalReader::open(dir.path().join(WAL_FILE)).unwrap();
    let (payload, ok) = reader.read_frame(10).unwrap();
    assert!(ok);
    assert_eq!(payload, b"small tail");
}
