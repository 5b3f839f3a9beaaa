//! Log severity levels
//!
//! Severity ordering is `Debug < Info < Warn < Error < Panic < Fatal`.
//! A record is admitted when its level is at or above the configured
//! minimum; `Error` and above are routed through the synchronous
//! (immediately durable) write path.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Log severity level
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Development diagnostics, switched off in production
    Debug = 1,
    /// Normal operation (default)
    #[default]
    Info,
    /// Something looks wrong but the system keeps running
    Warn,
    /// A definite failure that does not take the system down
    Error,
    /// A failure the host is expected to unwind on once the record is durable
    Panic,
    /// A failure the host is expected to terminate on once the record is durable
    Fatal,
}

impl Level {
    /// Whether a record at `record` severity passes this configured minimum.
    ///
    /// Admission is `record >= self`.
    #[inline]
    pub fn admits(self, record: Level) -> bool {
        record >= self
    }

    /// Whether this level takes the synchronous durable path.
    #[inline]
    pub fn is_critical(self) -> bool {
        self >= Level::Error
    }

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Panic => "panic",
            Level::Fatal => "fatal",
        }
    }

    /// Uppercase name, used in rendered record prefixes
    pub fn upper_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
            Level::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "panic" => Ok(Level::Panic),
            "fatal" => Ok(Level::Fatal),
            other => Err(format!("unknown level: {other}")),
        }
    }
}
