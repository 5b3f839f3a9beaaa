//! Rotation engine
//!
//! Owns the destination log file and its lineage: one dated directory per
//! day, a fresh file at sequence zero each morning, and numbered successors
//! whenever the open file crosses the size threshold. Retired files are
//! optionally gzipped; the within-day sequence survives restarts through
//! `sequence.stat`.
//!
//! `check()` is called on the write path: a read-locked fast path returns
//! immediately while the date and size are inside bounds, and the slow path
//! serializes whole rotations under the write lock, so a rotation can never
//! overlap a pending compression of the previous file.
//!
//! # Filesystem layout
//!
//! ```text
//! <base_dir>/
//!   sequence.stat
//!   <YYYYMMDD>/
//!     <filename>.<YYYYMMDD>           # seq 0
//!     <filename>.<YYYYMMDD>.1.log     # seq >= 1
//!     <filename>.<YYYYMMDD>.1.log.gz  # compressed retired file
//! ```

use std::fs::{DirBuilder, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use timber_config::{CompressionLevel, Config};

use crate::clock::Clock;
use crate::compress;
use crate::error::{Result, RotateError};
use crate::schedule;
use crate::sequence::SequenceFile;

/// Date component of directory and file names
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Local time of the daily rollover task
const ROLLOVER_AT: (u32, u32, u32) = (0, 0, 0);

/// Local time of the daily retention sweep
const CLEANUP_AT: (u32, u32, u32) = (1, 0, 0);

/// Rotation policy for one destination file lineage
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Directory holding the dated subdirectories and `sequence.stat`
    pub base_dir: PathBuf,

    /// Destination log basename
    pub filename: String,

    /// Size at which the open file is retired
    pub threshold: u64,

    /// Days of history the cleanup sweep keeps
    pub period_days: u32,

    /// gzip retired files
    pub compress: bool,

    /// gzip level for retired files
    pub compression_level: CompressionLevel,

    /// IANA timezone of the rollover and cleanup schedules
    pub timezone: String,
}

impl From<&Config> for RotationConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            base_dir: cfg.file_path.clone(),
            filename: cfg.filename.clone(),
            threshold: cfg.threshold,
            period_days: cfg.period,
            compress: cfg.enable_compress,
            compression_level: cfg.compression_level,
            timezone: cfg.location.clone(),
        }
    }
}

/// Lifecycle of the engine's file handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPhase {
    /// Handle open and accepting appends
    Active,

    /// Old handle closed, successor not yet open
    Rotating,

    /// Terminal; reached only through [`RotationEngine::close`]
    Closed,
}

struct RotationState {
    real_dir: PathBuf,
    current_date: String,
    sequence: u64,
    file: Option<File>,
    file_path: PathBuf,
    phase: RotationPhase,
    seq_file: SequenceFile,
}

/// Owner of the destination log file lineage
pub struct RotationEngine {
    cfg: RotationConfig,
    tz: Tz,
    clock: Arc<dyn Clock>,
    state: RwLock<RotationState>,
    current_size: AtomicU64,
    rotations: AtomicU64,
    cancel: CancellationToken,
}

impl RotationEngine {
    /// Open the lineage: ensure today's directory, read `sequence.stat`,
    /// open the destination file in append mode, and run one check to cover
    /// a roll missed while the process was down.
    pub fn new(cfg: RotationConfig, clock: Arc<dyn Clock>) -> Result<Arc<Self>> {
        let tz: Tz = cfg
            .timezone
            .parse()
            .map_err(|_| RotateError::UnknownTimezone(cfg.timezone.clone()))?;

        mkdir_all(&cfg.base_dir)?;
        let mut seq_file = SequenceFile::open(&cfg.base_dir)?;

        let now = clock.now_utc().with_timezone(&tz);
        let current_date = now.format(DATE_FORMAT).to_string();
        let real_dir = cfg.base_dir.join(&current_date);
        mkdir_all(&real_dir)?;

        let sequence = seq_file.load()?;
        if sequence == 0 {
            seq_file.save(0)?;
        }
        let file_path = real_dir.join(log_file_name(&cfg.filename, &current_date, sequence));
        let file = open_append(&file_path)?;
        let current_size = file.metadata()?.len();

        let engine = Arc::new(Self {
            cfg,
            tz,
            clock,
            state: RwLock::new(RotationState {
                real_dir,
                current_date,
                sequence,
                file: Some(file),
                file_path,
                phase: RotationPhase::Active,
                seq_file,
            }),
            current_size: AtomicU64::new(current_size),
            rotations: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        });

        engine.check()?;
        Ok(engine)
    }

    /// Record `n` freshly appended bytes
    pub fn add_bytes(&self, n: u64) {
        self.current_size.fetch_add(n, Ordering::Relaxed);
    }

    /// Bytes written to the current file since it opened
    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Completed rotations since startup
    pub fn rotation_count(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Append to the current destination file and account the bytes
    pub fn append(&self, buf: &[u8]) -> std::io::Result<usize> {
        let state = self.state.read();
        let Some(file) = state.file.as_ref() else {
            return Err(std::io::Error::other(RotateError::FileNotOpen));
        };
        let mut handle: &File = file;
        let n = handle.write(buf)?;
        drop(state);
        self.add_bytes(n as u64);
        Ok(n)
    }

    /// Push the current file's data to disk
    pub fn flush(&self) -> std::io::Result<()> {
        let state = self.state.read();
        match state.file.as_ref() {
            Some(file) => file.sync_data(),
            None => Err(std::io::Error::other(RotateError::FileNotOpen)),
        }
    }

    /// Check the rotation triggers and rotate when one fired.
    ///
    /// Fast path under the read lock: date unchanged, size inside the
    /// threshold, handle open. The slow path re-validates under the write
    /// lock and runs the whole rotation (close, optional gzip, reopen,
    /// persist sequence) before releasing it.
    pub fn check(&self) -> Result<()> {
        {
            let state = self.state.read();
            if state.phase == RotationPhase::Closed {
                return Err(RotateError::Closed);
            }
            if state.phase == RotationPhase::Active
                && state.current_date == self.today()
                && self.current_size.load(Ordering::Relaxed) < self.cfg.threshold
            {
                return Ok(());
            }
        }

        let mut state = self.state.write();
        if state.phase == RotationPhase::Closed {
            return Err(RotateError::Closed);
        }

        let today = self.today();
        let date_changed = state.current_date != today;
        let size_breached = self.current_size.load(Ordering::Relaxed) >= self.cfg.threshold;

        let result = if date_changed {
            state.phase = RotationPhase::Rotating;
            self.open_day_locked(&mut state, &today)
        } else if size_breached {
            state.phase = RotationPhase::Rotating;
            self.advance_sequence_locked(&mut state)
        } else if state.file.is_none() {
            // A previous rotation failed half-way; retry the open.
            state.phase = RotationPhase::Rotating;
            self.reopen_locked(&mut state)
        } else {
            state.phase = RotationPhase::Active;
            return Ok(());
        };

        match result {
            Ok(()) => {
                state.phase = RotationPhase::Active;
                self.rotations.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "rotation failed");
                Err(e)
            }
        }
    }

    /// Forced midnight rollover: new day directory, sequence back to zero.
    pub fn rollover_daily(&self) -> Result<()> {
        let mut state = self.state.write();
        if state.phase == RotationPhase::Closed {
            return Err(RotateError::Closed);
        }
        let today = self.today();
        state.phase = RotationPhase::Rotating;
        match self.open_day_locked(&mut state, &today) {
            Ok(()) => {
                state.phase = RotationPhase::Active;
                self.rotations.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "daily rollover failed");
                Err(e)
            }
        }
    }

    /// Remove every dated directory strictly older than the retention
    /// window. Returns the number of directories removed; per-entry
    /// failures are logged and skipped.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let today = self
            .clock
            .now_utc()
            .with_timezone(&self.tz)
            .date_naive();
        let cutoff = today - chrono::Days::new(self.cfg.period_days as u64);

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.cfg.base_dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read base directory entry");
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(date) = NaiveDate::parse_from_str(&name, DATE_FORMAT) else {
                continue;
            };
            if date >= cutoff {
                continue;
            }

            let dir = entry.path();
            if let Err(e) = remove_dir_contents(&dir) {
                tracing::error!(dir = %dir.display(), error = %e, "retention sweep failed");
                continue;
            }
            if let Err(e) = std::fs::remove_dir(&dir) {
                tracing::error!(dir = %dir.display(), error = %e, "failed to remove expired directory");
                continue;
            }
            removed += 1;
        }
        Ok(removed)
    }

    /// Start the timezone-aware daily tasks: rollover at 00:00:00 and the
    /// retention sweep at 01:00:00. Both log failures and keep running.
    pub fn spawn_schedules(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let rollover = {
            let engine = Arc::clone(self);
            schedule::spawn_daily(
                self.tz,
                Arc::clone(&self.clock),
                ROLLOVER_AT,
                self.cancel.clone(),
                move || {
                    if let Err(e) = engine.rollover_daily() {
                        tracing::error!(error = %e, "scheduled rollover failed");
                    }
                },
            )
        };
        let cleanup = {
            let engine = Arc::clone(self);
            schedule::spawn_daily(
                self.tz,
                Arc::clone(&self.clock),
                CLEANUP_AT,
                self.cancel.clone(),
                move || match engine.cleanup_expired() {
                    Ok(removed) if removed > 0 => {
                        tracing::info!(removed, "retention sweep removed expired directories");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "retention sweep failed"),
                },
            )
        };
        vec![rollover, cleanup]
    }

    /// Stop the schedules and close the handle. Idempotent; later checks
    /// and appends fail.
    pub fn close(&self) {
        self.cancel.cancel();
        let mut state = self.state.write();
        if state.phase == RotationPhase::Closed {
            return;
        }
        state.file = None;
        state.phase = RotationPhase::Closed;
    }

    /// Current phase, for observability
    pub fn phase(&self) -> RotationPhase {
        self.state.read().phase
    }

    /// Path of the currently open destination file
    pub fn current_path(&self) -> PathBuf {
        self.state.read().file_path.clone()
    }

    /// Today's date string in the configured timezone
    fn today(&self) -> String {
        self.clock
            .now_utc()
            .with_timezone(&self.tz)
            .format(DATE_FORMAT)
            .to_string()
    }

    /// Date rotation: retire the open file, move to today's directory, and
    /// restart the sequence at zero.
    fn open_day_locked(&self, state: &mut RotationState, today: &str) -> Result<()> {
        self.retire_locked(state);

        state.real_dir = self.cfg.base_dir.join(today);
        mkdir_all(&state.real_dir)?;

        let path = state
            .real_dir
            .join(log_file_name(&self.cfg.filename, today, 0));
        state.file = Some(open_append(&path)?);
        state.file_path = path;
        state.current_date = today.to_string();
        state.sequence = 0;
        self.current_size.store(0, Ordering::Relaxed);
        state.seq_file.save(0)?;
        Ok(())
    }

    /// Size rotation: retire the open file and open the next numbered
    /// successor for the same day.
    fn advance_sequence_locked(&self, state: &mut RotationState) -> Result<()> {
        self.retire_locked(state);

        let next = state.seq_file.load()? + 1;
        let path = state
            .real_dir
            .join(log_file_name(&self.cfg.filename, &state.current_date, next));
        state.file = Some(open_append(&path)?);
        state.file_path = path;
        state.sequence = next;
        self.current_size.store(0, Ordering::Relaxed);
        state.seq_file.save(next)?;
        Ok(())
    }

    /// Recover from a half-failed rotation by reopening the recorded path.
    fn reopen_locked(&self, state: &mut RotationState) -> Result<()> {
        state.file = Some(open_append(&state.file_path)?);
        Ok(())
    }

    /// Close the current handle and gzip the retired file when enabled.
    /// A failed compression keeps the source and is only logged.
    fn retire_locked(&self, state: &mut RotationState) {
        let Some(file) = state.file.take() else {
            return;
        };
        drop(file);

        if !self.cfg.compress {
            return;
        }
        match compress::gzip_file(&state.file_path, self.cfg.compression_level) {
            Ok(_) => {
                if let Err(e) = std::fs::remove_file(&state.file_path) {
                    tracing::error!(
                        file = %state.file_path.display(),
                        error = %e,
                        "failed to remove compressed source"
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    file = %state.file_path.display(),
                    error = %e,
                    "failed to compress retired file"
                );
            }
        }
    }
}

fn log_file_name(filename: &str, date: &str, seq: u64) -> String {
    if seq == 0 {
        format!("{filename}.{date}")
    } else {
        format!("{filename}.{date}.{seq}.log")
    }
}

fn mkdir_all(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o777);
    }
    builder.create(path)
}

fn open_append(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o666);
    }
    options.open(path)
}

fn remove_dir_contents(dir: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            remove_dir_contents(&path)?;
            std::fs::remove_dir(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;
