//! The public logger
//!
//! A [`Logger`] wires the pipeline together: rotation engine with its daily
//! schedules, the buffer writer over the WAL, and a file sink on the rotated
//! destination file. Severity decides the path: `Error` and above always go
//! through the synchronous durable write, lower levels take the batched
//! asynchronous path when `enable_async` is set.
//!
//! Log methods never fail and never panic; pipeline errors are reported
//! through `tracing` and the record is dropped, matching the contract that
//! a logging call must not take the host down.

use std::panic::Location;
use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use tokio::task::JoinHandle;

use timber_config::{Config, ConfigError, Level};
use timber_core::{BufferWriter, Sink, WriterConfig};
use timber_rotate::{RotationConfig, RotationEngine, SystemClock};
use timber_sinks::FileSink;

use crate::caller;
use crate::color;
use crate::error::TimberError;
use crate::field::Field;

/// Registry key of the destination-file sink every logger carries
pub const FILE_SINK_KEY: &str = "file";

/// Structured logger over the durable ingestion pipeline
pub struct Logger {
    cfg: Config,
    tz: Tz,
    writer: Arc<BufferWriter>,
    rotation: Arc<RotationEngine>,
    // Detached on drop; the tasks exit through the rotation cancel token.
    _schedules: Vec<JoinHandle<()>>,
}

impl Logger {
    /// Build a logger from a validated config.
    ///
    /// Must be called within a Tokio runtime; the rotation schedules, the
    /// WAL flusher, and the drain tasks are spawned here.
    pub fn new(cfg: Config) -> Result<Self, TimberError> {
        cfg.validate()?;
        let tz: Tz = cfg
            .location
            .parse()
            .map_err(|_| ConfigError::UnknownTimezone(cfg.location.clone()))?;

        let rotation = RotationEngine::new(RotationConfig::from(&cfg), Arc::new(SystemClock))?;
        let schedules = rotation.spawn_schedules();

        let writer = BufferWriter::new(
            &cfg.file_path,
            Arc::clone(&rotation),
            WriterConfig {
                flush_interval: cfg.flush_interval,
                ..Default::default()
            },
        )?;
        writer.add_sink(FILE_SINK_KEY, Arc::new(FileSink::new(Arc::clone(&rotation))));

        Ok(Self {
            cfg,
            tz,
            writer,
            rotation,
            _schedules: schedules,
        })
    }

    /// Development diagnostics
    #[track_caller]
    pub fn debug(&self, msg: &str) {
        self.log(Level::Debug, msg, &[]);
    }

    /// Normal operation
    #[track_caller]
    pub fn info(&self, msg: &str) {
        self.log(Level::Info, msg, &[]);
    }

    /// Something looks wrong
    #[track_caller]
    pub fn warn(&self, msg: &str) {
        self.log(Level::Warn, msg, &[]);
    }

    /// Definite failure; durable before this returns
    #[track_caller]
    pub fn error(&self, msg: &str) {
        self.log(Level::Error, msg, &[]);
    }

    /// Failure the host will unwind on; durable before this returns
    #[track_caller]
    pub fn panic(&self, msg: &str) {
        self.log(Level::Panic, msg, &[]);
    }

    /// Failure the host will terminate on; durable before this returns.
    /// Process exit is the host's call, never this library's.
    #[track_caller]
    pub fn fatal(&self, msg: &str) {
        self.log(Level::Fatal, msg, &[]);
    }

    /// [`debug`](Self::debug) with structured fields
    #[track_caller]
    pub fn debug_with(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Debug, msg, fields);
    }

    /// [`info`](Self::info) with structured fields
    #[track_caller]
    pub fn info_with(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Info, msg, fields);
    }

    /// [`warn`](Self::warn) with structured fields
    #[track_caller]
    pub fn warn_with(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Warn, msg, fields);
    }

    /// [`error`](Self::error) with structured fields
    #[track_caller]
    pub fn error_with(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Error, msg, fields);
    }

    /// [`panic`](Self::panic) with structured fields
    #[track_caller]
    pub fn panic_with(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Panic, msg, fields);
    }

    /// [`fatal`](Self::fatal) with structured fields
    #[track_caller]
    pub fn fatal_with(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Fatal, msg, fields);
    }

    /// Register an additional sink (terminal, network, custom)
    pub fn add_sink(&self, key: impl Into<String>, sink: Arc<dyn Sink>) {
        self.writer.add_sink(key, sink);
    }

    /// Remove a registered sink
    pub fn remove_sink(&self, key: &str) -> Option<Arc<dyn Sink>> {
        self.writer.remove_sink(key)
    }

    /// The underlying orchestrator
    pub fn writer(&self) -> &Arc<BufferWriter> {
        &self.writer
    }

    /// The rotation engine owning the destination file lineage
    pub fn rotation(&self) -> &Arc<RotationEngine> {
        &self.rotation
    }

    /// Shut the pipeline down: final flush, WAL close, rotation close.
    /// Records logged after this are dropped.
    pub async fn close(&self) {
        self.writer.close().await;
    }

    #[track_caller]
    fn log(&self, level: Level, msg: &str, fields: &[Field]) {
        if !self.cfg.level.admits(level) {
            return;
        }
        let record = self.render(level, msg, fields, Location::caller());

        let result = if level.is_critical() || !self.cfg.enable_async {
            self.writer.sync_write_leveled(level, record.as_bytes())
        } else {
            self.writer.async_write(record.as_bytes())
        };
        if let Err(e) = result {
            tracing::error!(level = %level, error = %e, "log record dropped");
        }
    }

    /// Render one record line:
    /// `[LEVEL] <timestamp> <file:line> <message> <key=value>...`
    /// plus trimmed stack frames on their own lines for error-and-above.
    fn render(&self, level: Level, msg: &str, fields: &[Field], caller: &Location<'_>) -> String {
        let mut out = String::with_capacity(64 + msg.len());
        out.push_str(&color::level_prefix(self.cfg.enable_color, level));

        let now = Utc::now().with_timezone(&self.tz);
        out.push_str(&now.format("%Y-%m-%d %H:%M:%S%.6f").to_string());

        if self.cfg.enable_line {
            out.push(' ');
            out.push_str(&caller::streamline(caller));
        }

        out.push(' ');
        out.push_str(msg);
        for field in fields {
            out.push(' ');
            out.push_str(&field.to_string());
        }
        out.push('\n');

        if level.is_critical() {
            for frame in caller::multi_frames(self.cfg.call_skip) {
                out.push('\t');
                out.push_str(&frame);
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "logger_test.rs"]
mod logger_test;
