//! `std::thread` backend for targets without pthreads.
//!
//! Stack size and detach state are honored; affinity and explicit
//! scheduling policies are reported as unsupported.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use pithread_core::{Result, SchedError, SchedPolicy, ThreadAttribute};

use super::{ThreadFunc, ThreadId, run_body};

pub type NativeHandle = ThreadId;

pub(crate) const SPAWN_OP: &str = "std::thread::spawn";
pub(crate) const JOIN_OP: &str = "std::thread::join";
pub(crate) const DETACH_OP: &str = "std::thread::detach";

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static SELF_ID: Cell<u64> = const { Cell::new(0) };
}

fn fresh_thread_id() -> u64 {
    NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) struct Handle {
    id: ThreadId,
    inner: std::thread::JoinHandle<()>,
}

pub(crate) fn handle_id(handle: &Handle) -> ThreadId {
    handle.id
}

pub(crate) fn native(handle: &Handle) -> NativeHandle {
    handle.id
}

pub(crate) fn current_id() -> ThreadId {
    SELF_ID.with(|slot| {
        if slot.get() == 0 {
            slot.set(fresh_thread_id());
        }
        ThreadId::from_raw(slot.get())
    })
}

pub(crate) fn spawn(
    attr: Option<&ThreadAttribute>,
    func: Box<dyn ThreadFunc>,
) -> Result<Option<Handle>> {
    let mut builder = std::thread::Builder::new();
    let mut detached = false;
    if let Some(attr) = attr {
        if attr.affinity().count() > 0 {
            return Err(SchedError::Unsupported("thread affinity"));
        }
        if attr.sched_policy() != SchedPolicy::Inherit {
            return Err(SchedError::Unsupported("explicit scheduling policy"));
        }
        if attr.stack_size() != 0 {
            builder = builder.stack_size(attr.stack_size());
        }
        detached = attr.run_as_detached();
    }
    let raw = fresh_thread_id();
    let inner = builder
        .spawn(move || {
            SELF_ID.with(|slot| slot.set(raw));
            run_body(func);
        })
        .map_err(|err| SchedError::os(SPAWN_OP, err.raw_os_error().unwrap_or(libc::EAGAIN)))?;
    let handle = Handle {
        id: ThreadId::from_raw(raw),
        inner,
    };
    if detached {
        drop(handle.inner);
        return Ok(None);
    }
    Ok(Some(handle))
}

pub(crate) fn join(handle: Handle) -> Result<()> {
    handle
        .inner
        .join()
        .map_err(|_| SchedError::os(JOIN_OP, libc::EINVAL))
}

pub(crate) fn detach(handle: Handle) -> Result<()> {
    drop(handle.inner);
    Ok(())
}
