//! Caller capture
//!
//! Ordinary records carry the immediate call site (via `#[track_caller]`);
//! error-and-above records additionally carry a short slice of the call
//! stack. Paths are trimmed to their last four components so records stay
//! one line short of a full backtrace dump.

use std::backtrace::Backtrace;
use std::panic::Location;

/// Path components kept when trimming a source location
const PARTS: usize = 4;

/// Frames included for error-and-above records
const STACK_FRAMES: usize = 4;

/// Render a call site as `dir/file.rs:line`, trimmed to the last four
/// path components.
pub fn streamline(location: &Location<'_>) -> String {
    format!("{}:{}", trim_path(location.file()), location.line())
}

/// Capture up to four stack frames, skipping the innermost `skip`.
///
/// Frame file/line information depends on the build carrying symbols; when
/// it does not, the list simply comes back shorter.
pub fn multi_frames(skip: usize) -> Vec<String> {
    let backtrace = Backtrace::force_capture().to_string();
    backtrace
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            trimmed.strip_prefix("at ").map(|loc| {
                // Drop the trailing column, keep file:line.
                let loc = match loc.rfind(':') {
                    Some(idx) if loc[idx + 1..].chars().all(|c| c.is_ascii_digit()) => &loc[..idx],
                    _ => loc,
                };
                trim_path(loc)
            })
        })
        .skip(skip)
        .take(STACK_FRAMES)
        .collect()
}

fn trim_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() <= PARTS {
        return path.to_string();
    }
    parts[parts.len() - PARTS..].join("/")
}
