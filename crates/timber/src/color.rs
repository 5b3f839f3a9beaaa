//! ANSI level prefixes
//!
//! Terminal sinks get a bold color per severity; everything else gets the
//! plain `[LEVEL] ` prefix. Codes run 30 through 35 in level order.

use timber_config::Level;

/// ANSI SGR color code for a level
fn color_code(level: Level) -> u8 {
    match level {
        Level::Debug => 30,
        Level::Info => 31,
        Level::Warn => 32,
        Level::Error => 33,
        Level::Panic => 34,
        Level::Fatal => 35,
    }
}

/// Render the record prefix, colored when enabled
pub fn level_prefix(colored: bool, level: Level) -> String {
    if colored {
        format!("\x1b[1;{}m[{}] \x1b[0m", color_code(level), level.upper_str())
    } else {
        format!("[{}] ", level.upper_str())
    }
}
