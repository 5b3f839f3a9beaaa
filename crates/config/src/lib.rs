//! Configuration model for the timber logging pipeline
//!
//! A [`Config`] describes one logger instance: where its files live, the
//! minimum admitted severity, the rotation policy for the destination file,
//! and the knobs of the asynchronous write path. Minimal config should just
//! work; only specify what you need to change.
//!
//! # Parsing
//!
//! Configs deserialize from TOML via `FromStr`, or assemble programmatically
//! with the `with_*` builders:
//!
//! ```
//! use timber_config::{Config, Level};
//!
//! let config = Config::new("/var/log/myapp").with_level(Level::Debug);
//! config.validate().unwrap();
//! ```

mod compression;
mod level;

pub use compression::CompressionLevel;
pub use level::Level;

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default destination log basename
pub const DEFAULT_FILENAME: &str = "server.log";

/// Default per-file rotation threshold (100 MiB)
pub const DEFAULT_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Default retention window in days
pub const DEFAULT_PERIOD_DAYS: u32 = 30;

/// Default IANA timezone for rotation and cleanup schedules
pub const DEFAULT_LOCATION: &str = "Asia/Shanghai";

/// Default number of stack frames skipped when capturing callers
pub const DEFAULT_CALL_SKIP: usize = 3;

/// Default interval of the periodic WAL flush task
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `file_path` was empty
    #[error("file_path cannot be empty")]
    EmptyFilePath,

    /// `location` is not a known IANA timezone
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    /// `threshold` must be positive
    #[error("rotation threshold must be greater than zero")]
    ZeroThreshold,

    /// `period` must cover at least one day
    #[error("retention period must be at least one day")]
    ZeroPeriod,

    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// Config document was not valid TOML
    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Configuration for one logger instance
///
/// All fields are recognized from TOML; missing fields take their defaults.
/// `file_path` is the only required field and is validated non-empty.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory for log files and the WAL
    pub file_path: PathBuf,

    /// Destination log basename
    pub filename: String,

    /// Minimum severity the facade admits
    pub level: Level,

    /// IANA timezone governing rotation and cleanup schedules
    pub location: String,

    /// Include caller file:line in rendered records
    pub enable_line: bool,

    /// Emit ANSI color prefixes for terminal sinks
    pub enable_color: bool,

    /// Stack frames to skip when capturing callers for error-and-above
    pub call_skip: usize,

    /// Per-file rotation size in bytes
    pub threshold: u64,

    /// Retention window for the cleanup sweep, in days
    pub period: u32,

    /// gzip retired files after rotation
    pub enable_compress: bool,

    /// gzip level used when `enable_compress` is set
    pub compression_level: CompressionLevel,

    /// Route non-critical records through the batched asynchronous path
    pub enable_async: bool,

    /// Interval of the periodic WAL flush task, in milliseconds
    #[serde(rename = "flush_interval_ms", with = "duration_ms")]
    pub flush_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file_path: PathBuf::new(),
            filename: DEFAULT_FILENAME.to_string(),
            level: Level::Info,
            location: DEFAULT_LOCATION.to_string(),
            enable_line: true,
            enable_color: false,
            call_skip: DEFAULT_CALL_SKIP,
            threshold: DEFAULT_THRESHOLD,
            period: DEFAULT_PERIOD_DAYS,
            enable_compress: false,
            compression_level: CompressionLevel::Default,
            enable_async: false,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl Config {
    /// Create a config rooted at `file_path` with every other field defaulted
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        contents.parse()
    }

    /// Set the destination log basename
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Set the minimum admitted severity
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the schedule timezone
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Toggle caller file:line capture
    #[must_use]
    pub fn with_line(mut self, enable: bool) -> Self {
        self.enable_line = enable;
        self
    }

    /// Enable ANSI color prefixes
    #[must_use]
    pub fn with_color(mut self) -> Self {
        self.enable_color = true;
        self
    }

    /// Set the caller-capture skip depth
    #[must_use]
    pub fn with_call_skip(mut self, skip: usize) -> Self {
        self.call_skip = skip;
        self
    }

    /// Set the per-file rotation size in bytes
    #[must_use]
    pub fn with_threshold(mut self, bytes: u64) -> Self {
        self.threshold = bytes;
        self
    }

    /// Set the retention window in days
    #[must_use]
    pub fn with_period(mut self, days: u32) -> Self {
        self.period = days;
        self
    }

    /// Enable gzip of retired files at the given level
    #[must_use]
    pub fn with_compress(mut self, level: CompressionLevel) -> Self {
        self.enable_compress = true;
        self.compression_level = level;
        self
    }

    /// Route non-critical records through the asynchronous path
    #[must_use]
    pub fn with_async_writes(mut self) -> Self {
        self.enable_async = true;
        self
    }

    /// Set the periodic WAL flush interval
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Check the config for values the pipeline cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyFilePath);
        }
        if self.location.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::UnknownTimezone(self.location.clone()));
        }
        if self.threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.period == 0 {
            return Err(ConfigError::ZeroPeriod);
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
