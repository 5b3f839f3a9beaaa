//! Record sinks
//!
//! Implementations of the [`Sink`](timber_core::Sink) contract the
//! orchestrator fans records out to:
//!
//! - [`FileSink`]: appends through the rotation engine, so records land in
//!   the current dated destination file
//! - [`TerminalSink`]: buffered stdout/stderr output with a severity gate
//! - [`NetworkSink`]: length-delimited TCP shipper with lazy connect and a
//!   single reconnect attempt per failed write

mod file;
mod network;
mod terminal;

pub use file::FileSink;
pub use network::NetworkSink;
pub use terminal::{TerminalSink, TerminalTarget};
