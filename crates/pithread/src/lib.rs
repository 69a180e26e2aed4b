//! # pithread
//!
//! Scheduling-aware threads and priority-inheritance mutexes.
//!
//! [`Thread`] launches an OS thread whose affinity, scheduling policy,
//! priority, stack size and detach state come from a
//! [`ThreadAttribute`]. A `Thread` owns its OS thread: it must be joined or
//! detached before it is dropped, otherwise the process aborts.
//!
//! [`PiMutex`] and [`RecursivePiMutex`] request priority inheritance from
//! the OS so that a low-priority holder is boosted while a high-priority
//! thread waits on it.
//!
//! The POSIX backend is used on every Unix target. Elsewhere a generic
//! backend built on `std::thread` and `parking_lot` provides the same API
//! without scheduling control.

pub mod mutex;
pub mod realtime;
#[cfg(unix)]
mod sched;
pub mod this_thread;
pub mod thread;

pub use mutex::{
    PiMutex, PiMutexGuard, RawLock, RawPiMutex, RawRecursivePiMutex, RecursivePiMutex,
    RecursivePiMutexGuard, UniqueLock,
};
pub use pithread_core::{
    ConfigError, CoreAffinity, CpuSet, ProgrammingError, Result, SchedError, SchedOptions,
    SchedPolicy, SchedulingPolicy, ThreadAttribute, ThreadConfig, ThreadPriority,
};
pub use realtime::configure_realtime_thread;
pub use thread::{NativeHandle, Thread, ThreadFunc, ThreadId};
