//! pthread backend.
//!
//! ## Launch sequence
//!
//! 1. The attribute is translated into a `pthread_attr_t` (stack size,
//!    detach state, explicit policy and priority, and affinity on glibc).
//! 2. The body and the deferred settings are boxed into one [`Startup`]
//!    record and handed to `pthread_create` as an opaque pointer.
//! 3. The new thread reclaims the record, applies the deferred settings
//!    (non-creation policies, affinity where the attribute cannot carry
//!    it), reports the outcome through the
//!    [`StartGate`] and waits for a verdict.
//! 4. The creator stores the handle, then answers `Go` (body runs) or
//!    `Abandon` (body dropped, thread exits and is joined if joinable).

use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use pithread_core::error::check;
use pithread_core::os::sys;
use pithread_core::{CpuSet, Result, SchedError, SchedPolicy, ThreadAttribute};

use super::{ThreadFunc, ThreadId, run_body};
use crate::sched;

pub type NativeHandle = libc::pthread_t;

pub(crate) const SPAWN_OP: &str = "pthread_create";
pub(crate) const JOIN_OP: &str = "pthread_join";
pub(crate) const DETACH_OP: &str = "pthread_detach";

pub(crate) struct Handle(libc::pthread_t);

// SAFETY: a pthread_t is an opaque identifier valid from any thread of the
// process.
unsafe impl Send for Handle {}
// SAFETY: as above; it is never dereferenced.
unsafe impl Sync for Handle {}

fn raw_id(thread: libc::pthread_t) -> ThreadId {
    ThreadId::from_raw(thread as usize as u64)
}

pub(crate) fn handle_id(handle: &Handle) -> ThreadId {
    raw_id(handle.0)
}

pub(crate) fn native(handle: &Handle) -> NativeHandle {
    handle.0
}

pub(crate) fn current_id() -> ThreadId {
    // SAFETY: pthread_self has no preconditions.
    raw_id(unsafe { libc::pthread_self() })
}

// ---------------------------------------------------------------------------
// Startup handshake
// ---------------------------------------------------------------------------

enum GateState {
    Configuring,
    Configured(Result<()>),
    Go,
    Abandon,
}

struct StartGate {
    state: Mutex<GateState>,
    ready: Condvar,
}

impl StartGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Configuring),
            ready: Condvar::new(),
        }
    }

    /// Child side: publish the self-configuration outcome and wait for the
    /// creator. Returns true when the body may run.
    fn report(&self, configured: Result<()>) -> bool {
        let mut state = self.state.lock();
        *state = GateState::Configured(configured);
        self.ready.notify_all();
        loop {
            let verdict = match *state {
                GateState::Go => Some(true),
                GateState::Abandon => Some(false),
                _ => None,
            };
            if let Some(go) = verdict {
                return go;
            }
            self.ready.wait(&mut state);
        }
    }

    /// Creator side: wait for the child's report.
    fn wait_for_startup(&self) -> Result<()> {
        let mut state = self.state.lock();
        loop {
            match std::mem::replace(&mut *state, GateState::Configuring) {
                GateState::Configured(outcome) => return outcome,
                other => {
                    *state = other;
                    self.ready.wait(&mut state);
                }
            }
        }
    }

    fn release(&self, go: bool) {
        *self.state.lock() = if go { GateState::Go } else { GateState::Abandon };
        self.ready.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Deferred settings
// ---------------------------------------------------------------------------

/// Whether `pthread_attr_t` carries affinity on this target.
const CREATION_AFFINITY: bool = cfg!(all(target_os = "linux", target_env = "gnu"));

/// Settings the new thread applies to itself before its body runs.
#[derive(Default)]
struct Deferred {
    affinity: Option<CpuSet>,
    policy: Option<SchedPolicy>,
}

impl Deferred {
    fn from_attr(attr: &ThreadAttribute) -> Self {
        let affinity = (!CREATION_AFFINITY && attr.affinity().count() > 0)
            .then(|| attr.affinity().clone());
        let policy = attr.sched_policy();
        let policy = (policy != SchedPolicy::Inherit && !policy.is_creation_settable())
            .then_some(policy);
        Self { affinity, policy }
    }

    fn apply(&self) -> Result<()> {
        if let Some(policy) = self.policy {
            let native = policy.to_native().ok_or_else(|| {
                SchedError::invalid(format!("scheduling policy {policy} is not available"))
            })?;
            // SAFETY: pthread_self has no preconditions.
            sched::set_thread_sched(unsafe { libc::pthread_self() }, native, 0)?;
        }
        if let Some(affinity) = &self.affinity {
            sched::set_self_affinity(affinity)?;
        }
        Ok(())
    }
}

struct Startup {
    func: Box<dyn ThreadFunc>,
    deferred: Deferred,
    gate: Arc<StartGate>,
}

extern "C" fn thread_main(arg: *mut c_void) -> *mut c_void {
    // SAFETY: arg is the Box<Startup> leaked by spawn, handed to exactly
    // this thread.
    let startup = unsafe { Box::from_raw(arg.cast::<Startup>()) };
    let Startup {
        func,
        deferred,
        gate,
    } = *startup;
    if gate.report(deferred.apply()) {
        drop(gate);
        run_body(func);
    }
    std::ptr::null_mut()
}

// ---------------------------------------------------------------------------
// Native attribute
// ---------------------------------------------------------------------------

struct NativeAttr(libc::pthread_attr_t);

impl NativeAttr {
    fn from_attr(attr: &ThreadAttribute) -> Result<Self> {
        let mut raw = MaybeUninit::<libc::pthread_attr_t>::uninit();
        // SAFETY: pthread_attr_init initializes the storage it is handed.
        check(
            unsafe { libc::pthread_attr_init(raw.as_mut_ptr()) },
            "pthread_attr_init",
        )?;
        // SAFETY: initialized above; destroyed by Drop from here on.
        let mut native = Self(unsafe { raw.assume_init() });
        native.configure(attr)?;
        Ok(native)
    }

    fn configure(&mut self, attr: &ThreadAttribute) -> Result<()> {
        let raw = &mut self.0;
        // SAFETY: raw is an initialized attribute for the duration of every
        // call below.
        unsafe {
            if attr.stack_size() != 0 {
                check(
                    libc::pthread_attr_setstacksize(raw, attr.stack_size()),
                    "pthread_attr_setstacksize",
                )?;
            }
            let detach = if attr.run_as_detached() {
                libc::PTHREAD_CREATE_DETACHED
            } else {
                libc::PTHREAD_CREATE_JOINABLE
            };
            check(
                libc::pthread_attr_setdetachstate(raw, detach),
                "pthread_attr_setdetachstate",
            )?;
            #[cfg(all(target_os = "linux", target_env = "gnu"))]
            if attr.affinity().count() > 0 {
                let words = attr.affinity().native_words();
                check(
                    sys::pthread_attr_setaffinity_np(
                        raw,
                        std::mem::size_of_val(words.as_slice()),
                        words.as_ptr().cast::<libc::cpu_set_t>(),
                    ),
                    "pthread_attr_setaffinity_np",
                )?;
            }
            let policy = attr.sched_policy();
            match policy.to_native() {
                Some(native) if policy.is_creation_settable() => {
                    check(
                        sys::pthread_attr_setinheritsched(raw, sys::PTHREAD_EXPLICIT_SCHED),
                        "pthread_attr_setinheritsched",
                    )?;
                    check(
                        sys::pthread_attr_setschedpolicy(raw, native),
                        "pthread_attr_setschedpolicy",
                    )?;
                    let mut param: libc::sched_param = std::mem::zeroed();
                    param.sched_priority = attr.effective_priority();
                    check(
                        sys::pthread_attr_setschedparam(raw, &param),
                        "pthread_attr_setschedparam",
                    )?;
                }
                _ => check(
                    sys::pthread_attr_setinheritsched(raw, sys::PTHREAD_INHERIT_SCHED),
                    "pthread_attr_setinheritsched",
                )?,
            }
        }
        Ok(())
    }
}

impl Drop for NativeAttr {
    fn drop(&mut self) {
        // SAFETY: self.0 was initialized by pthread_attr_init.
        unsafe { libc::pthread_attr_destroy(&mut self.0) };
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Launch a thread. Returns `None` for a detached launch.
pub(crate) fn spawn(
    attr: Option<&ThreadAttribute>,
    func: Box<dyn ThreadFunc>,
) -> Result<Option<Handle>> {
    let native_attr = attr.map(NativeAttr::from_attr).transpose()?;
    let detached = attr.is_some_and(ThreadAttribute::run_as_detached);
    let gate = Arc::new(StartGate::new());
    let startup = Box::into_raw(Box::new(Startup {
        func,
        deferred: attr.map(Deferred::from_attr).unwrap_or_default(),
        gate: Arc::clone(&gate),
    }));

    let mut thread = MaybeUninit::<libc::pthread_t>::uninit();
    let attr_ptr = native_attr
        .as_ref()
        .map_or(std::ptr::null(), |a| &a.0 as *const libc::pthread_attr_t);
    // SAFETY: thread is writable storage, attr_ptr is null or an
    // initialized attribute, and startup is a live leaked box whose
    // ownership passes to thread_main on success.
    let rc = unsafe {
        libc::pthread_create(
            thread.as_mut_ptr(),
            attr_ptr,
            thread_main,
            startup.cast::<c_void>(),
        )
    };
    if rc != 0 {
        // SAFETY: the thread was not created, so the box is still ours.
        drop(unsafe { Box::from_raw(startup) });
        return Err(SchedError::os(SPAWN_OP, rc));
    }
    // SAFETY: written by the successful pthread_create.
    let thread = unsafe { thread.assume_init() };

    match gate.wait_for_startup() {
        Ok(()) => {
            gate.release(true);
            Ok((!detached).then_some(Handle(thread)))
        }
        Err(err) => {
            gate.release(false);
            if !detached {
                // SAFETY: thread is joinable and joined exactly once.
                unsafe { libc::pthread_join(thread, std::ptr::null_mut()) };
            }
            Err(err)
        }
    }
}

pub(crate) fn join(handle: Handle) -> Result<()> {
    // SAFETY: handle owns a joinable thread; consuming it prevents a second
    // join.
    check(
        unsafe { libc::pthread_join(handle.0, std::ptr::null_mut()) },
        JOIN_OP,
    )
}

pub(crate) fn detach(handle: Handle) -> Result<()> {
    // SAFETY: as above.
    check(unsafe { libc::pthread_detach(handle.0) }, DETACH_OP)
}
