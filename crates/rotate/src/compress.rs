//! gzip of retired log files
//!
//! Rotated-out files are compressed to `<name>.gz` in 1 MiB read chunks.
//! The caller deletes the source only after a successful run; a failed
//! compression never touches the original.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use timber_config::CompressionLevel;

/// Read-chunk size used while streaming the source file
const COPY_CHUNK: usize = 1024 * 1024;

/// Map a configured level onto a flate2 setting
pub fn gzip_compression(level: CompressionLevel) -> Compression {
    Compression::new(level.gzip_level())
}

/// Compress `src` to `<src>.gz`, returning the archive path.
///
/// The source file is left in place; removal is the caller's decision.
pub fn gzip_file(src: &Path, level: CompressionLevel) -> std::io::Result<PathBuf> {
    let mut source = File::open(src)?;

    let gz_path = PathBuf::from(format!("{}.gz", src.display()));
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o666);
    }
    let archive = options.open(&gz_path)?;

    let mut encoder = GzEncoder::new(archive, gzip_compression(level));
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        let n = source.read(&mut buf)?;
        if n == 0 {
            break;
        }
        encoder.write_all(&buf[..n])?;
    }
    encoder.finish()?.sync_all()?;

    Ok(gz_path)
}
