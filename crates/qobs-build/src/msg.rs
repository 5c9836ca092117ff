//! Terminal messages
//!
//! Prefixed diagnostics (`warn:`, `info:`, `error:`) on stderr; build
//! progress lines (`CC`, `AR`, `LINK`) are printed by the scheduler on
//! stdout.

use colored::Colorize;

/// Print a warning
pub fn warn(message: impl AsRef<str>) {
    eprintln!("{}: {}", "warn".yellow(), message.as_ref());
}

/// Print an informational message
pub fn info(message: impl AsRef<str>) {
    eprintln!("{}: {}", "info".bright_green(), message.as_ref());
}

/// Print an error
pub fn error(message: impl AsRef<str>) {
    eprintln!("{}: {}", "error".bright_red(), message.as_ref());
}
