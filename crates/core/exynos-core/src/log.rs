//! Tagged, leveled logging for the calibration pipeline.
//!
//! Every message carries a short subsystem tag (`"ect"`, `"vclk"`, `"fvmap"`,
//! ...) and a [`LogLevel`]. Messages go to a single registered [`LogFn`];
//! before [`set_log_fn`] is called, output is silently discarded.
//!
//! ```ignore
//! kinfo!(target: "ect", "parsed {} sections", n);
//! kerr!(target: "vclk", "{}: no LUT row for {} kHz", name, rate);
//! ```

use core::fmt;
use core::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

// ---------------------------------------------------------------------------
// Log levels, lower is more severe
// ---------------------------------------------------------------------------

/// Log severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Fatal: the pipeline cannot produce any usable table.
    Fatal = 0,
    /// Error: a domain or section failed but the rest continues.
    Error = 1,
    /// Warning: unexpected condition, not necessarily an error.
    Warn = 2,
    /// Informational: high-level progress messages.
    Info = 3,
    /// Debug: detailed diagnostic information.
    Debug = 4,
    /// Trace: per-register tracing.
    Trace = 5,
}

impl LogLevel {
    /// Returns the human-readable name (fixed-width for aligned output).
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN ",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    /// Converts a verbosity count (as from repeated `-v` flags) to a level.
    ///
    /// Zero maps to [`LogLevel::Warn`]; each step adds one level of detail.
    pub const fn from_verbosity(count: u8) -> Self {
        match count {
            0 => Self::Warn,
            1 => Self::Info,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

// ---------------------------------------------------------------------------
// Level filter
// ---------------------------------------------------------------------------

static MAX_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Trace as u8);

/// Sets the most verbose level that is forwarded to the log function.
pub fn set_max_level(level: LogLevel) {
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Returns `true` if a message at `level` would be forwarded.
#[inline]
#[must_use]
pub fn enabled(level: LogLevel) -> bool {
    level as u8 <= MAX_LEVEL.load(Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Leveled log function (klog! and convenience macros)
// ---------------------------------------------------------------------------

/// The signature of the global leveled log function.
///
/// The second argument is the subsystem tag (empty when none was given).
pub type LogFn = fn(LogLevel, &'static str, fmt::Arguments<'_>);

fn null_log(_level: LogLevel, _target: &'static str, _args: fmt::Arguments<'_>) {}

static LOG_FN: AtomicPtr<()> = AtomicPtr::new(null_log as *mut ());

/// Registers the global leveled log function.
///
/// # Safety
///
/// The provided function must be safe to call from any context, including
/// while a domain spin lock is held. May be called more than once.
/// Uses `Release` ordering so subsequent loads see the new function.
pub unsafe fn set_log_fn(f: LogFn) {
    LOG_FN.store(f as *mut (), Ordering::Release);
}

/// Loads the current log function from the atomic pointer.
#[inline]
fn load_log_fn() -> LogFn {
    let ptr = LOG_FN.load(Ordering::Acquire);
    // SAFETY: We only ever store valid `LogFn` function pointers into LOG_FN.
    unsafe { core::mem::transmute::<*mut (), LogFn>(ptr) }
}

/// Implementation detail for [`klog!`]. Not public API.
#[doc(hidden)]
pub fn _log(level: LogLevel, target: &'static str, args: fmt::Arguments<'_>) {
    if enabled(level) {
        load_log_fn()(level, target, args);
    }
}

/// Logs a message at the given level, optionally tagged with a subsystem.
#[macro_export]
macro_rules! klog {
    ($level:expr, target: $target:expr, $($arg:tt)*) => {
        $crate::log::_log($level, $target, format_args!($($arg)*))
    };
    ($level:expr, $($arg:tt)*) => {
        $crate::log::_log($level, "", format_args!($($arg)*))
    };
}

/// Logs a fatal-level message (level 0).
#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Fatal, $($arg)*) };
}

/// Logs an error-level message (level 1).
#[macro_export]
macro_rules! kerr {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Error, $($arg)*) };
}

/// Logs a warning-level message (level 2).
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Warn, $($arg)*) };
}

/// Logs an info-level message (level 3).
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Info, $($arg)*) };
}

/// Logs a debug-level message (level 4).
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Debug, $($arg)*) };
}

/// Logs a trace-level message (level 5).
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Trace, $($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static CAPTURED: Mutex<Vec<(LogLevel, &'static str, String)>> = Mutex::new(Vec::new());

    fn capture(level: LogLevel, target: &'static str, args: fmt::Arguments<'_>) {
        CAPTURED.lock().unwrap().push((level, target, args.to_string()));
    }

    #[test]
    fn level_names_are_fixed_width() {
        for level in [
            LogLevel::Fatal,
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert_eq!(level.name().len(), 5);
        }
    }

    #[test]
    fn verbosity_mapping() {
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Warn);
        assert_eq!(LogLevel::from_verbosity(2), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbosity(9), LogLevel::Trace);
    }

    // Single test touches the global sink and filter so ordering is stable.
    #[test]
    fn sink_and_filter() {
        // SAFETY: `capture` only locks a std mutex.
        unsafe { set_log_fn(capture) };

        crate::kinfo!(target: "ect", "parsed {} sections", 3);
        crate::kerr!("untagged");

        set_max_level(LogLevel::Warn);
        crate::kdebug!(target: "vclk", "filtered out");
        crate::kwarn!(target: "ra", "kept");
        set_max_level(LogLevel::Trace);

        let got = CAPTURED.lock().unwrap().clone();
        assert_eq!(
            got,
            [
                (LogLevel::Info, "ect", "parsed 3 sections".to_string()),
                (LogLevel::Error, "", "untagged".to_string()),
                (LogLevel::Warn, "ra", "kept".to_string()),
            ]
        );
    }
}
