//! Structured JSONL logging for thread lifecycle and scheduling events.
//!
//! Provides:
//! - [`LogEntry`]: one JSONL record with required + optional fields.
//! - [`LogEmitter`]: writes JSONL lines to stderr, a file, or any writer.
//! - [`emit`]: routes a record to the process-wide emitter, filtered by
//!   [`crate::config::log_threshold`].

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config;

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    /// OS call or library operation the event concerns (`pthread_create`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    /// Identity of the thread the event concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: String::new(),
            level,
            event: event.into(),
            op: None,
            errno: None,
            thread: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    #[must_use]
    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }

    #[must_use]
    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    /// Set free-form details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Writes log entries as JSONL.
pub struct LogEmitter {
    writer: Box<dyn Write + Send>,
    run_id: String,
}

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

impl LogEmitter {
    /// Create an emitter that writes to stderr.
    #[must_use]
    pub fn to_stderr() -> Self {
        Self::to_writer(Box::new(std::io::stderr()))
    }

    /// Create an emitter that writes to a file (truncating it).
    pub fn to_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::to_writer(Box::new(std::io::LineWriter::new(file))))
    }

    /// Create an emitter over an arbitrary writer.
    #[must_use]
    pub fn to_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer,
            run_id: format!("pithread-{}", std::process::id()),
        }
    }

    fn next_trace_id(&self) -> String {
        let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        format!("{}::{:06}", self.run_id, seq)
    }

    /// Emit a fully-populated log entry, filling in the trace id if empty.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

// ---------------------------------------------------------------------------
// Process-wide sink
// ---------------------------------------------------------------------------

static SINK: Mutex<Option<LogEmitter>> = Mutex::new(None);

/// Replace the process-wide emitter. Returns the previous one, if any.
pub fn install_emitter(emitter: LogEmitter) -> Option<LogEmitter> {
    SINK.lock().replace(emitter)
}

/// Route `entry` to the process-wide emitter if the configured threshold
/// admits its level. Write failures are dropped: logging never fails the
/// operation being logged.
pub fn emit(entry: LogEntry) {
    if !config::log_threshold().admits(entry.level) {
        return;
    }
    write_to_sink(entry);
}

/// Route `entry` to the process-wide emitter regardless of the threshold.
/// Used for fatal records, which must always be visible.
pub fn emit_unfiltered(entry: LogEntry) {
    write_to_sink(entry);
}

fn write_to_sink(entry: LogEntry) {
    let mut sink = SINK.lock();
    let emitter = sink.get_or_insert_with(LogEmitter::to_stderr);
    let _ = emitter.emit_entry(entry);
    let _ = emitter.flush();
}

fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let days = secs / 86_400;
    let (year, month, day) = civil_from_days(days as i64);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year,
        month,
        day,
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
        duration.subsec_millis(),
    )
}

// Days since 1970-01-01 to (year, month, day), proleptic Gregorian.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_serializes_required_fields() {
        let entry = LogEntry::new(LogLevel::Info, "thread_spawned");
        let json = entry.to_jsonl().unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["level"], "info");
        assert_eq!(v["event"], "thread_spawned");
        assert!(v.get("op").is_none());
        assert!(v.get("errno").is_none());
    }

    #[test]
    fn log_entry_optional_fields_roundtrip() {
        let entry = LogEntry::new(LogLevel::Error, "spawn_failed")
            .with_op("pthread_create")
            .with_errno(libc::EAGAIN)
            .with_thread("140245")
            .with_details(serde_json::json!({"policy": "fifo", "priority": 10}));
        let parsed: LogEntry = serde_json::from_str(&entry.to_jsonl().unwrap()).unwrap();
        assert_eq!(parsed.op.as_deref(), Some("pthread_create"));
        assert_eq!(parsed.errno, Some(libc::EAGAIN));
        assert_eq!(parsed.thread.as_deref(), Some("140245"));
        assert_eq!(parsed.details.unwrap()["priority"], 10);
    }

    #[test]
    fn emitter_assigns_trace_ids() {
        let emitter = LogEmitter::to_writer(Box::new(Vec::new()));
        let a = emitter.next_trace_id();
        let b = emitter.next_trace_id();
        assert_ne!(a, b);
        assert!(a.starts_with("pithread-"));
    }

    #[test]
    fn civil_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }
}
