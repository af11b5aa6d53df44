//! Simple logging module.
//!
//! Leveled stderr logging for the front-end binaries. Messages carry the
//! time elapsed since [`init`] so runs are easy to correlate without a
//! wall-clock dependency. The interpreter core itself never logs; it
//! reports through `VmError` and the host callbacks.

use std::fmt::{self, Display};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

/// Log level for filtering messages.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Debug => write!(f, "DEBUG"),
            Level::Info => write!(f, "INFO"),
            Level::Warn => write!(f, "WARN"),
            Level::Error => write!(f, "ERROR"),
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
static STARTED: OnceLock<Instant> = OnceLock::new();

/// Initializes the logger with the given level and starts the clock.
pub fn init(level: Level) {
    STARTED.get_or_init(Instant::now);
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Returns true if the given level should be logged.
#[inline]
pub fn enabled(level: Level) -> bool {
    level as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

/// Writes one formatted record. Prefer the `info!`/`warn!`/`error!` macros.
pub fn write(level: Level, args: fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let elapsed = STARTED.get_or_init(Instant::now).elapsed();
    eprintln!("[{:>9.3}] [{:5}] {}", elapsed.as_secs_f64(), level, args);
}

/// Logs at debug level.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::utils::log::write($crate::utils::log::Level::Debug, format_args!($($arg)*))
    };
}

/// Logs at info level.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::utils::log::write($crate::utils::log::Level::Info, format_args!($($arg)*))
    };
}

/// Logs at warn level.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::utils::log::write($crate::utils::log::Level::Warn, format_args!($($arg)*))
    };
}

/// Logs at error level.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::utils::log::write($crate::utils::log::Level::Error, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn level_display() {
        assert_eq!(format!("{}", Level::Info), "INFO");
        assert_eq!(format!("{}", Level::Warn), "WARN");
        assert_eq!(format!("{}", Level::Error), "ERROR");
    }

    // The level filter is process-global; every assertion on it stays in
    // this one test.
    #[test]
    fn level_filtering() {
        init(Level::Warn);
        assert!(!enabled(Level::Info));
        assert!(enabled(Level::Warn));
        assert!(enabled(Level::Error));

        init(Level::Error);
        write(Level::Info, format_args!("dropped"));

        // Reset to the default.
        init(Level::Info);
        assert!(enabled(Level::Info));
    }
}
