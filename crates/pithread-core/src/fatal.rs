//! Fatal paths for ownership and lifetime violations.
//!
//! These conditions are logic defects, not transient failures. They are not
//! surfaced as [`crate::SchedError`]; the process writes one `fatal` record
//! and aborts. Aborting (rather than panicking) keeps the behavior identical
//! whether or not the violation happens during unwinding.

use crate::structured_log::{self, LogEntry, LogLevel};

/// Violation that terminates the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgrammingError {
    /// A joinable thread handle was dropped or overwritten without join/detach.
    JoinableThreadDropped,
    /// A panic escaped the closure of a spawned thread.
    ThreadClosurePanicked,
    /// The default thread attribute could not be queried.
    AttributeQueryFailed,
    /// The OS refused to initialize a mutex.
    MutexInitFailed,
    /// The OS reported an error on lock (e.g. self-deadlock detected).
    MutexLockFailed,
    /// The OS reported an error on unlock (e.g. caller does not own it).
    MutexUnlockFailed,
}

impl ProgrammingError {
    /// Stable event name used in the fatal log record.
    #[must_use]
    pub const fn event(self) -> &'static str {
        match self {
            Self::JoinableThreadDropped => "joinable_thread_dropped",
            Self::ThreadClosurePanicked => "thread_closure_panicked",
            Self::AttributeQueryFailed => "attribute_query_failed",
            Self::MutexInitFailed => "mutex_init_failed",
            Self::MutexLockFailed => "mutex_lock_failed",
            Self::MutexUnlockFailed => "mutex_unlock_failed",
        }
    }
}

/// Write a fatal record describing `violation` and abort the process.
pub fn abort_with(violation: ProgrammingError, details: Option<serde_json::Value>) -> ! {
    let mut entry = LogEntry::new(LogLevel::Fatal, violation.event());
    if let Some(details) = details {
        entry = entry.with_details(details);
    }
    structured_log::emit_unfiltered(entry);
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_distinct() {
        let all = [
            ProgrammingError::JoinableThreadDropped,
            ProgrammingError::ThreadClosurePanicked,
            ProgrammingError::AttributeQueryFailed,
            ProgrammingError::MutexInitFailed,
            ProgrammingError::MutexLockFailed,
            ProgrammingError::MutexUnlockFailed,
        ];
        let mut names: Vec<_> = all.iter().map(|v| v.event()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all.len());
    }
}
