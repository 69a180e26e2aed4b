//! Runtime configuration.
//!
//! The log threshold is set via the `PITHREAD_LOG` environment variable:
//! - `off`: nothing is written except fatal records.
//! - `error`, `warn` (default), `info`, `debug`, `trace`: records at or above
//!   that severity are written to the installed emitter (stderr by default).
//!
//! The variable is read once, on the first record, and cached. Tests and
//! embedding applications can override it with [`set_log_level`].

use std::sync::atomic::{AtomicU8, Ordering};

use crate::structured_log::LogLevel;

/// Log threshold selected by configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogThreshold {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogThreshold {
    /// Parse from string (case-insensitive). Unknown values select the default.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "0" | "false" => Self::Off,
            "error" => Self::Error,
            "warn" | "warning" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" | "all" => Self::Trace,
            _ => Self::Warn,
        }
    }

    /// Returns true when a record at `level` passes this threshold.
    #[must_use]
    pub const fn admits(self, level: LogLevel) -> bool {
        let rank = match level {
            LogLevel::Trace => 5,
            LogLevel::Debug => 4,
            LogLevel::Info => 3,
            LogLevel::Warn => 2,
            LogLevel::Error | LogLevel::Fatal => 1,
        };
        let limit = match self {
            Self::Off => 0,
            Self::Error => 1,
            Self::Warn => 2,
            Self::Info => 3,
            Self::Debug => 4,
            Self::Trace => 5,
        };
        rank <= limit
    }
}

// 0=unresolved, 1..=6 resolved thresholds, 255=resolving.
static CACHED_THRESHOLD: AtomicU8 = AtomicU8::new(0);

const UNRESOLVED: u8 = 0;
const RESOLVING: u8 = 255;

fn threshold_to_u8(t: LogThreshold) -> u8 {
    match t {
        LogThreshold::Off => 1,
        LogThreshold::Error => 2,
        LogThreshold::Warn => 3,
        LogThreshold::Info => 4,
        LogThreshold::Debug => 5,
        LogThreshold::Trace => 6,
    }
}

fn u8_to_threshold(v: u8) -> LogThreshold {
    match v {
        1 => LogThreshold::Off,
        2 => LogThreshold::Error,
        4 => LogThreshold::Info,
        5 => LogThreshold::Debug,
        6 => LogThreshold::Trace,
        _ => LogThreshold::Warn,
    }
}

/// Get the configured log threshold (reads `PITHREAD_LOG` on first call).
///
/// A concurrent caller that arrives while another thread is resolving the
/// variable sees the default instead of blocking.
#[must_use]
pub fn log_threshold() -> LogThreshold {
    let cached = CACHED_THRESHOLD.load(Ordering::Acquire);
    if cached != UNRESOLVED && cached != RESOLVING {
        return u8_to_threshold(cached);
    }
    if cached == RESOLVING {
        return LogThreshold::default();
    }
    if CACHED_THRESHOLD
        .compare_exchange(UNRESOLVED, RESOLVING, Ordering::SeqCst, Ordering::Relaxed)
        .is_err()
    {
        let v = CACHED_THRESHOLD.load(Ordering::Acquire);
        return if v != UNRESOLVED && v != RESOLVING {
            u8_to_threshold(v)
        } else {
            LogThreshold::default()
        };
    }

    let threshold = std::env::var("PITHREAD_LOG")
        .map(|v| LogThreshold::from_str_loose(&v))
        .unwrap_or_default();
    CACHED_THRESHOLD.store(threshold_to_u8(threshold), Ordering::Release);
    threshold
}

/// Override the log threshold, bypassing the environment.
pub fn set_log_level(threshold: LogThreshold) {
    CACHED_THRESHOLD.store(threshold_to_u8(threshold), Ordering::Release);
}
