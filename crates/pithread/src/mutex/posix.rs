//! pthread mutexes with the `PTHREAD_PRIO_INHERIT` protocol.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use serde_json::json;

use pithread_core::error::check;
use pithread_core::fatal::{self, ProgrammingError};
use pithread_core::os::sys;
use pithread_core::structured_log::{self, LogEntry, LogLevel};
use pithread_core::{Result, SchedError};

use super::RawLock;

/// Heap-pinned pthread mutex. A `pthread_mutex_t` must not move once
/// initialized, so it lives in its own allocation.
struct PthreadMutex {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
    priority_inheriting: bool,
    kind: &'static str,
}

// SAFETY: pthread mutexes are designed to be shared between threads; the
// allocation never moves.
unsafe impl Send for PthreadMutex {}
// SAFETY: as above.
unsafe impl Sync for PthreadMutex {}

impl PthreadMutex {
    fn init(recursive: bool) -> Result<Self> {
        let kind = if recursive {
            "recursive_pi_mutex"
        } else {
            "pi_mutex"
        };
        let mut attr = MutexAttr::new()?;
        if recursive {
            attr.set_type(libc::PTHREAD_MUTEX_RECURSIVE)?;
        }
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
        let mut priority_inheriting = attr.set_protocol(sys::PTHREAD_PRIO_INHERIT).is_ok();
        // SAFETY: inner is a fresh, heap-pinned mutex; attr is initialized.
        let mut rc = unsafe { libc::pthread_mutex_init(inner.get(), &attr.0) };
        if rc != 0 && priority_inheriting {
            // The protocol was accepted by the attribute but refused at init
            // (no PI futex support); fall back to a plain mutex.
            priority_inheriting = false;
            attr.set_protocol(sys::PTHREAD_PRIO_NONE)?;
            // SAFETY: as above; the failed init left inner untouched.
            rc = unsafe { libc::pthread_mutex_init(inner.get(), &attr.0) };
        }
        check(rc, "pthread_mutex_init")?;
        if !priority_inheriting {
            structured_log::emit(
                LogEntry::new(LogLevel::Warn, "priority_inheritance_unavailable")
                    .with_op("pthread_mutexattr_setprotocol")
                    .with_details(json!({ "kind": kind })),
            );
        }
        Ok(Self {
            inner,
            priority_inheriting,
            kind,
        })
    }

    fn init_or_abort(recursive: bool) -> Self {
        match Self::init(recursive) {
            Ok(m) => m,
            Err(err) => fatal::abort_with(
                ProgrammingError::MutexInitFailed,
                Some(json!({ "recursive": recursive, "error": err.to_string() })),
            ),
        }
    }

    fn lock(&self) {
        // SAFETY: inner is an initialized, pinned mutex.
        let rc = unsafe { libc::pthread_mutex_lock(self.inner.get()) };
        if rc != 0 {
            self.misuse(ProgrammingError::MutexLockFailed, "pthread_mutex_lock", rc);
        }
    }

    fn try_lock(&self) -> bool {
        // SAFETY: as above.
        match unsafe { libc::pthread_mutex_trylock(self.inner.get()) } {
            0 => true,
            // EAGAIN: recursion count exhausted.
            libc::EBUSY | libc::EAGAIN => false,
            rc => self.misuse(ProgrammingError::MutexLockFailed, "pthread_mutex_trylock", rc),
        }
    }

    /// # Safety
    ///
    /// The calling thread must hold the mutex.
    unsafe fn unlock(&self) {
        // SAFETY: as above.
        let rc = unsafe { libc::pthread_mutex_unlock(self.inner.get()) };
        if rc != 0 {
            self.misuse(ProgrammingError::MutexUnlockFailed, "pthread_mutex_unlock", rc);
        }
    }

    fn misuse(&self, violation: ProgrammingError, op: &'static str, errno: i32) -> ! {
        fatal::abort_with(
            violation,
            Some(json!({
                "kind": self.kind,
                "op": op,
                "error": SchedError::os(op, errno).to_string(),
            })),
        )
    }
}

impl Drop for PthreadMutex {
    fn drop(&mut self) {
        // SAFETY: &mut self proves no guard is alive, so the mutex is
        // unlocked and destroyed exactly once.
        unsafe { libc::pthread_mutex_destroy(self.inner.get()) };
    }
}

struct MutexAttr(libc::pthread_mutexattr_t);

impl MutexAttr {
    fn new() -> Result<Self> {
        let mut raw = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        // SAFETY: pthread_mutexattr_init initializes the storage it is handed.
        check(
            unsafe { libc::pthread_mutexattr_init(raw.as_mut_ptr()) },
            "pthread_mutexattr_init",
        )?;
        // SAFETY: initialized above.
        Ok(Self(unsafe { raw.assume_init() }))
    }

    fn set_type(&mut self, kind: i32) -> Result<()> {
        // SAFETY: self.0 is initialized.
        check(
            unsafe { libc::pthread_mutexattr_settype(&mut self.0, kind) },
            "pthread_mutexattr_settype",
        )
    }

    fn set_protocol(&mut self, protocol: i32) -> Result<()> {
        // SAFETY: self.0 is initialized.
        check(
            unsafe { sys::pthread_mutexattr_setprotocol(&mut self.0, protocol) },
            "pthread_mutexattr_setprotocol",
        )
    }
}

impl Drop for MutexAttr {
    fn drop(&mut self) {
        // SAFETY: initialized in new, destroyed once.
        unsafe { libc::pthread_mutexattr_destroy(&mut self.0) };
    }
}

// ---------------------------------------------------------------------------
// Public raw locks
// ---------------------------------------------------------------------------

macro_rules! raw_pi_mutex {
    ($(#[$meta:meta])* $name:ident, recursive = $recursive:expr) => {
        $(#[$meta])*
        pub struct $name(PthreadMutex);

        impl $name {
            /// Build the mutex; if even a plain mutex cannot be created the
            /// process aborts.
            #[must_use]
            pub fn new() -> Self {
                Self(PthreadMutex::init_or_abort($recursive))
            }

            pub fn try_new() -> Result<Self> {
                PthreadMutex::init($recursive).map(Self)
            }

            pub fn lock(&self) {
                self.0.lock();
            }

            pub fn try_lock(&self) -> bool {
                self.0.try_lock()
            }

            /// # Safety
            ///
            /// The calling thread must hold the mutex.
            pub unsafe fn unlock(&self) {
                // SAFETY: forwarded caller contract.
                unsafe { self.0.unlock() }
            }

            /// True when the OS accepted the priority-inheritance protocol.
            #[must_use]
            pub fn is_priority_inheriting(&self) -> bool {
                self.0.priority_inheriting
            }

            /// Underlying `pthread_mutex_t`.
            #[must_use]
            pub fn native_handle(&self) -> *mut libc::pthread_mutex_t {
                self.0.inner.get()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl RawLock for $name {
            fn lock(&self) {
                self.0.lock();
            }

            fn try_lock(&self) -> bool {
                self.0.try_lock()
            }

            unsafe fn unlock(&self) {
                // SAFETY: forwarded caller contract.
                unsafe { self.0.unlock() }
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("priority_inheriting", &self.0.priority_inheriting)
                    .finish_non_exhaustive()
            }
        }
    };
}

raw_pi_mutex!(
    /// Non-recursive mutex using the priority-inheritance protocol.
    RawPiMutex,
    recursive = false
);

raw_pi_mutex!(
    /// Recursive mutex using the priority-inheritance protocol.
    RawRecursivePiMutex,
    recursive = true
);
