//! End-to-end smoke tests: full logger against a real filesystem

use std::sync::Arc;

use tempfile::TempDir;

use timber::{CompressionLevel, Config, Field, Level, Logger, TerminalSink, WalReader, WAL_FILE};

#[tokio::test(flavor = "multi_thread")]
async fn smoke_sync_pipeline_end_to_end() {
    let dir = TempDir::new().unwrap();
    let logger = Logger::new(
        Config::new(dir.path())
            .with_filename("app.log")
            .with_level(Level::Debug),
    )
    .unwrap();

    logger.debug("starting up");
    logger.info_with("listening", &[Field::int("port", 8080)]);
    logger.warn("low disk");
    logger.error_with("backend down", &[Field::str("host", "db-1")]);

    // Destination file carries every admitted record.
    let contents =
        String::from_utf8_lossy(&std::fs::read(logger.rotation().current_path()).unwrap())
            .into_owned();
    for needle in ["starting up", "port=8080", "low disk", "host=db-1"] {
        assert!(contents.contains(needle), "missing {needle:?}");
    }

    logger.close().await;

    // Every record is also a CRC-valid WAL frame, in submission order. The
    // destination file is the exact concatenation of the rendered records,
    // so record lengths can be read back off it; the error record is last
    // and owns everything from its prefix onward (its stack lines included).
    let error_start = contents.find("[ERROR] ").unwrap();
    let mut reader = WalReader::open(dir.path().join(WAL_FILE)).unwrap();
    for needle in ["starting up", "listening", "low disk"] {
        let line_len = contents
            .lines()
            .find(|l| l.contains(needle))
            .map(|l| l.len() + 1)
            .unwrap();
        let (payload, ok) = reader.read_frame(line_len).unwrap();
        assert!(ok, "frame for {needle:?} fails CRC");
        assert!(String::from_utf8_lossy(&payload).contains(needle));
    }
    let (payload, ok) = reader.read_frame(contents.len() - error_start).unwrap();
    assert!(ok, "error frame fails CRC");
    assert!(String::from_utf8_lossy(&payload).contains("backend down"));
    assert_eq!(reader.remaining().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn smoke_size_rotation_with_compression() {
    let dir = TempDir::new().unwrap();
    let logger = Logger::new(
        Config::new(dir.path())
            .with_threshold(512)
            .with_compress(CompressionLevel::BestSpeed),
    )
    .unwrap();

    for i in 0..40 {
        logger.info(&format!("filler record number {i} with some padding"));
    }
    logger.close().await;

    // The day directory must hold a numbered lineage with gzipped retirees.
    let day_dir = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| {
            e.file_type().map(|t| t.is_dir()).unwrap_or(false)
                && e.file_name().to_string_lossy().len() == 8
        })
        .expect("dated directory");

    let names: Vec<String> = std::fs::read_dir(day_dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();

    assert!(
        names.iter().any(|n| n.ends_with(".gz")),
        "expected compressed retired files, got {names:?}"
    );
    assert!(
        names.iter().any(|n| n.contains(".log")),
        "expected numbered successors, got {names:?}"
    );

    let seq: u64 = std::fs::read_to_string(dir.path().join("sequence.stat"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(seq >= 2, "several size rotations expected, got {seq}");
}

#[tokio::test(flavor = "multi_thread")]
async fn smoke_terminal_sink_gates_by_level() {
    let dir = TempDir::new().unwrap();
    let logger = Logger::new(Config::new(dir.path()).with_level(Level::Debug)).unwrap();

    let terminal = Arc::new(TerminalSink::stderr(Level::Error));
    logger.add_sink("terminal", Arc::clone(&terminal) as Arc<dyn timber::Sink>);

    logger.info("quiet on the terminal");
    logger.error("loud everywhere");

    assert!(terminal.buffered() > 0, "error should reach the terminal");

    logger.close().await;
}
