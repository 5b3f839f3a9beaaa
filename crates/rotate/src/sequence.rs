//! Within-day sequence persistence
//!
//! `sequence.stat` holds one ASCII decimal integer: the sequence number of
//! the currently open destination file. Reads rewind the descriptor; writes
//! truncate and rewrite so the file never accumulates stale digits.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Result, RotateError};

/// Filename of the persistent counter inside the base directory
pub const SEQUENCE_FILE: &str = "sequence.stat";

/// Handle over the persistent within-day sequence counter
pub struct SequenceFile {
    file: File,
}

impl SequenceFile {
    /// Open or create the counter file under `base_dir`
    pub fn open(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(SEQUENCE_FILE);
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o666);
        }
        Ok(Self {
            file: options.open(path)?,
        })
    }

    /// Read the persisted sequence; an empty file reads as zero
    pub fn load(&mut self) -> Result<u64> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        self.file.read_to_string(&mut contents)?;

        let trimmed = contents.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        trimmed.parse().map_err(|_| RotateError::BadSequence {
            contents: trimmed.to_string(),
        })
    }

    /// Truncate and rewrite the counter
    pub fn save(&mut self, seq: u64) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(seq.to_string().as_bytes())?;
        Ok(())
    }
}
