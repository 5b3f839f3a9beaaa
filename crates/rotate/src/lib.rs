//! Destination-file lineage for the timber pipeline
//!
//! The rotation engine keeps one destination log file open per logger,
//! retires it on date change or size breach, optionally gzips what it
//! retires, and sweeps expired dated directories on a daily schedule. The
//! write-ahead log is a separate concern; this crate only manages the files
//! downstream sinks append to.

mod clock;
mod compress;
mod engine;
mod error;
mod schedule;
mod sequence;

pub use clock::{Clock, SystemClock};
pub use compress::gzip_file;
pub use engine::{RotationConfig, RotationEngine, RotationPhase, DATE_FORMAT};
pub use error::{Result, RotateError};
pub use schedule::spawn_daily;
pub use sequence::{SequenceFile, SEQUENCE_FILE};
