//! Tests for the write-ahead log

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::error::CoreError;
use crate::frame;
use crate::wal::{WalReader, WalWriter, WAL_FILE};

// ============================================================================
// Synchronous appends
// ============================================================================

#[test]
fn test_sync_append_grows_by_payload_plus_crc() {
    let dir = TempDir::new().unwrap();
    let wal = WalWriter::open(dir.path()).unwrap();

    wal.append_sync(b"boom\n").unwrap();

    let bytes = std::fs::read(dir.path().join(WAL_FILE)).unwrap();
    assert_eq!(bytes.len(), 9);
    assert_eq!(&bytes[..5], b"boom\n");
    assert_eq!(&bytes[5..], crc32fast::hash(b"boom\n").to_be_bytes());
}

#[test]
fn test_sync_appends_are_sequential_frames() {
    let dir = TempDir::new().unwrap();
    let wal = WalWriter::open(dir.path()).unwrap();

    wal.append_sync(b"first").unwrap();
    wal.append_sync(b"second record").unwrap();

    let mut reader = WalReader::open(wal.path()).unwrap();
    let (payload, ok) = reader.read_frame(5).unwrap();
    assert!(ok);
    assert_eq!(payload, b"first");

    let (payload, ok) = reader.read_frame(13).unwrap();
    assert!(ok);
    assert_eq!(payload, b"second record");
    assert_eq!(reader.remaining().unwrap(), 0);
}

#[test]
fn test_open_appends_to_existing_log() {
    let dir = TempDir::new().unwrap();
    {
        let wal = WalWriter::open(dir.path()).unwrap();
        wal.append_sync(b"before").unwrap();
        wal.close();
    }
    let wal = WalWriter::open(dir.path()).unwrap();
    wal.append_sync(b"after").unwrap();

    let bytes = std::fs::read(wal.path()).unwrap();
    assert_eq!(bytes.len(), 6 + 4 + 5 + 4);
}

// ============================================================================
// Batched appends
// ============================================================================

#[tokio::test]
async fn test_async_append_writes_sealed_frame() {
    let dir = TempDir::new().unwrap();
    let wal = WalWriter::open(dir.path()).unwrap();

    let batch = b"aaaa bbbb cccc".repeat(10);
    let framed = frame::seal(&batch);
    wal.append_async(&framed).await.unwrap();

    let mut reader = WalReader::open(wal.path()).unwrap();
    let (payload, ok) = reader.read_frame(batch.len()).unwrap();
    assert!(ok);
    assert_eq!(payload, batch);
}

#[tokio::test]
async fn test_async_append_after_close_fails() {
    let dir = TempDir::new().unwrap();
    let wal = WalWriter::open(dir.path()).unwrap();
    wal.close();

    let framed = frame::seal(b"late");
    let err = wal.append_async(&framed).await.unwrap_err();
    assert!(matches!(err, CoreError::BufferClosed));
}

// ============================================================================
// Corruption detection
// ============================================================================

#[test]
fn test_reader_flags_corrupted_frame() {
    let dir = TempDir::new().unwrap();
    let wal = WalWriter::open(dir.path()).unwrap();
    wal.append_sync(b"pristine").unwrap();

    // Flip one payload byte behind the writer's back.
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(wal.path())
        .unwrap();
    let mut first = [0u8; 1];
    file.read_exact(&mut first).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.write_all(&[first[0] ^ 0xff]).unwrap();

    let mut reader = WalReader::open(wal.path()).unwrap();
    let (_, ok) = reader.read_frame(8).unwrap();
    assert!(!ok);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_sync_append_after_close_fails() {
    let dir = TempDir::new().unwrap();
    let wal = WalWriter::open(dir.path()).unwrap();
    wal.close();
    assert!(matches!(
        wal.append_sync(b"x"),
        Err(CoreError::BufferClosed)
    ));
}

#[test]
fn test_close_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let wal = WalWriter::open(dir.path()).unwrap();
    wal.close();
    wal.close();
    assert!(wal.is_closed());
}

#[tokio::test]
async fn test_flusher_exits_on_close() {
    let dir = TempDir::new().unwrap();
    let wal = Arc::new(WalWriter::open(dir.path()).unwrap());
    let handle = wal.spawn_flusher(Duration::from_millis(10));

    tokio::time::sleep(Duration::from_millis(30)).await;
    wal.close();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("flusher should stop after close")
        .unwrap();
}
