//! Owned OS threads launched from a [`ThreadAttribute`].
//!
//! A [`Thread`] is either empty or owns exactly one joinable OS thread.
//! Ownership moves with the value (`take`, `swap`, plain moves); the OS
//! thread is released only by [`Thread::join`] or [`Thread::detach`].
//! Dropping a `Thread` that still owns a thread is a programming error and
//! aborts the process.

use std::fmt;

use serde_json::json;

use pithread_core::fatal::{self, ProgrammingError};
use pithread_core::structured_log::{self, LogEntry, LogLevel};
use pithread_core::{CpuSet, Result, SchedError, ThreadAttribute};

#[cfg(not(unix))]
mod generic;
#[cfg(unix)]
mod posix;

#[cfg(not(unix))]
use generic as imp;
#[cfg(unix)]
use posix as imp;

pub use imp::NativeHandle;

// ---------------------------------------------------------------------------
// Thread body
// ---------------------------------------------------------------------------

/// Body of a spawned thread, boxed once and consumed exactly once by the
/// thread it runs on.
pub trait ThreadFunc: Send {
    fn run(self: Box<Self>);
}

impl<F: FnOnce() + Send> ThreadFunc for F {
    fn run(self: Box<Self>) {
        (*self)()
    }
}

/// Run a thread body. A panic escaping it cannot be reported to anyone and
/// aborts the process.
pub(crate) fn run_body(func: Box<dyn ThreadFunc>) {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| func.run()));
    if let Err(payload) = outcome {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_default();
        fatal::abort_with(
            ProgrammingError::ThreadClosurePanicked,
            Some(json!({ "thread": current_id().to_string(), "panic": message })),
        );
    }
}

// ---------------------------------------------------------------------------
// Thread identity
// ---------------------------------------------------------------------------

/// Identity of a thread. The default value identifies no thread.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// True for the id of an empty [`Thread`].
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("no thread")
        } else {
            write!(f, "{:#x}", self.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Thread
// ---------------------------------------------------------------------------

/// Owner of at most one joinable OS thread.
#[derive(Default)]
pub struct Thread {
    handle: Option<imp::Handle>,
}

impl Thread {
    /// An empty, non-joinable value.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Launch `f` on a new thread with the OS default attributes.
    pub fn spawn<F>(f: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        Self::launch(None, Box::new(f))
    }

    /// Launch `f` on a new thread configured by `attr`.
    ///
    /// The attribute is validated before anything is allocated. Affinity and
    /// policies the creation API cannot carry are applied by the new thread
    /// to itself before `f` starts; if that fails, `f` is dropped without
    /// running and the error is returned here. A detached launch returns an
    /// empty `Thread`.
    pub fn spawn_with<F>(attr: &ThreadAttribute, f: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        attr.validate()?;
        Self::launch(Some(attr), Box::new(f))
    }

    fn launch(attr: Option<&ThreadAttribute>, func: Box<dyn ThreadFunc>) -> Result<Self> {
        let details =
            attr.map_or_else(|| json!({ "attr": "os-default" }), ThreadAttribute::describe);
        match imp::spawn(attr, func) {
            Ok(handle) => {
                let thread = Self { handle };
                structured_log::emit(
                    LogEntry::new(LogLevel::Debug, "thread_spawned")
                        .with_op(imp::SPAWN_OP)
                        .with_thread(thread.id().to_string())
                        .with_details(details),
                );
                Ok(thread)
            }
            Err(err) => {
                let mut entry = LogEntry::new(LogLevel::Error, "thread_spawn_failed")
                    .with_details(json!({ "attr": details, "error": err.to_string() }));
                if let SchedError::OsResource { op, errno } = &err {
                    entry = entry.with_op(*op).with_errno(*errno);
                }
                structured_log::emit(entry);
                Err(err)
            }
        }
    }

    /// True when this value owns a thread that must still be joined or
    /// detached.
    #[must_use]
    pub const fn joinable(&self) -> bool {
        self.handle.is_some()
    }

    /// Wait for the owned thread to finish. Afterwards the value is empty.
    ///
    /// On an empty value this fails with `EINVAL` without calling the OS.
    pub fn join(&mut self) -> Result<()> {
        let handle = self
            .handle
            .take()
            .ok_or(SchedError::os(imp::JOIN_OP, libc::EINVAL))?;
        let id = imp::handle_id(&handle);
        imp::join(handle)?;
        structured_log::emit(
            LogEntry::new(LogLevel::Trace, "thread_joined").with_thread(id.to_string()),
        );
        Ok(())
    }

    /// Let the owned thread run on unowned. Afterwards the value is empty.
    ///
    /// On an empty value this fails with `EINVAL` without calling the OS.
    pub fn detach(&mut self) -> Result<()> {
        let handle = self
            .handle
            .take()
            .ok_or(SchedError::os(imp::DETACH_OP, libc::EINVAL))?;
        imp::detach(handle)
    }

    /// Identity of the owned thread, or the "no thread" id when empty.
    #[must_use]
    pub fn id(&self) -> ThreadId {
        self.handle.as_ref().map(imp::handle_id).unwrap_or_default()
    }

    /// OS handle of the owned thread, if any.
    #[must_use]
    pub fn native_handle(&self) -> Option<NativeHandle> {
        self.handle.as_ref().map(imp::native)
    }

    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.handle, &mut other.handle);
    }

    /// Move ownership out, leaving this value empty.
    #[must_use]
    pub fn take(&mut self) -> Self {
        Self {
            handle: self.handle.take(),
        }
    }

    /// Number of processors available to run threads.
    #[must_use]
    pub fn hardware_concurrency() -> usize {
        CpuSet::num_processors()
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            fatal::abort_with(
                ProgrammingError::JoinableThreadDropped,
                Some(json!({ "thread": self.id().to_string() })),
            );
        }
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id())
            .field("joinable", &self.joinable())
            .finish()
    }
}

/// Identity of the calling thread.
pub(crate) fn current_id() -> ThreadId {
    imp::current_id()
}
