//! Read-only OS queries backing the data model.
//!
//! Everything here either reads a property of the running system or
//! declares a POSIX entry point the `libc` crate does not bind uniformly
//! across targets ([`sys`]). No function defined here changes thread or
//! process state.

use crate::error::{Result, SchedError};
use crate::sched_policy::SchedPolicy;

/// OS default thread-creation attributes, as reported by a freshly
/// initialized `pthread_attr_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultAttr {
    pub sched_policy: SchedPolicy,
    pub priority: i32,
    pub stack_size: usize,
    pub detached: bool,
}

/// Logical processors currently online. Never 0.
#[must_use]
pub fn online_processors() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions.
        let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if n > 0 {
            return n as usize;
        }
    }
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Smallest stack size the OS accepts for a new thread.
#[must_use]
pub const fn min_stack_size() -> usize {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        libc::PTHREAD_STACK_MIN
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        16 * 1024
    }
}

/// Inclusive `(min, max)` priority range of `policy`.
///
/// `Inherit` and unavailable policies are an `InvalidArgument`.
#[cfg(unix)]
pub fn priority_range(policy: SchedPolicy) -> Result<(i32, i32)> {
    let native = policy
        .to_native()
        .ok_or_else(|| SchedError::invalid(format!("no priority range for policy {policy}")))?;
    // SAFETY: both calls take a plain integer and have no preconditions.
    let (min, max) = unsafe {
        (
            libc::sched_get_priority_min(native),
            libc::sched_get_priority_max(native),
        )
    };
    if min == -1 {
        return Err(SchedError::last_os("sched_get_priority_min"));
    }
    if max == -1 {
        return Err(SchedError::last_os("sched_get_priority_max"));
    }
    Ok((min, max))
}

#[cfg(not(unix))]
pub fn priority_range(_policy: SchedPolicy) -> Result<(i32, i32)> {
    Err(SchedError::Unsupported("scheduling priority ranges"))
}

/// Query the OS default thread attributes.
///
/// The policy is reported as `Inherit` unless the default attribute asks for
/// explicit scheduling.
#[cfg(unix)]
pub fn default_thread_attr() -> Result<DefaultAttr> {
    let mut attr = std::mem::MaybeUninit::<libc::pthread_attr_t>::uninit();
    // SAFETY: pthread_attr_init initializes the storage it is handed.
    crate::error::check(
        unsafe { libc::pthread_attr_init(attr.as_mut_ptr()) },
        "pthread_attr_init",
    )?;
    // SAFETY: initialized by the successful call above.
    let mut attr = unsafe { attr.assume_init() };
    let result = read_attr(&attr);
    // SAFETY: attr was initialized and is destroyed exactly once.
    unsafe { libc::pthread_attr_destroy(&mut attr) };
    result
}

#[cfg(unix)]
fn read_attr(attr: &libc::pthread_attr_t) -> Result<DefaultAttr> {
    use crate::error::check;

    let mut inherit = 0;
    let mut policy = 0;
    let mut detach = 0;
    let mut stack_size: libc::size_t = 0;
    // SAFETY: sched_param is plain data; all-zero is a valid value.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    // SAFETY: attr is initialized; every out-pointer is a live local.
    unsafe {
        check(
            sys::pthread_attr_getinheritsched(attr, &mut inherit),
            "pthread_attr_getinheritsched",
        )?;
        check(
            sys::pthread_attr_getschedpolicy(attr, &mut policy),
            "pthread_attr_getschedpolicy",
        )?;
        check(
            sys::pthread_attr_getschedparam(attr, &mut param),
            "pthread_attr_getschedparam",
        )?;
        check(
            libc::pthread_attr_getstacksize(attr, &mut stack_size),
            "pthread_attr_getstacksize",
        )?;
        check(
            sys::pthread_attr_getdetachstate(attr, &mut detach),
            "pthread_attr_getdetachstate",
        )?;
    }
    let sched_policy = if inherit == sys::PTHREAD_EXPLICIT_SCHED {
        SchedPolicy::from_native(policy).unwrap_or_default()
    } else {
        SchedPolicy::Inherit
    };
    Ok(DefaultAttr {
        sched_policy,
        priority: param.sched_priority,
        stack_size,
        detached: detach == libc::PTHREAD_CREATE_DETACHED,
    })
}

#[cfg(not(unix))]
pub fn default_thread_attr() -> Result<DefaultAttr> {
    Ok(DefaultAttr {
        sched_policy: SchedPolicy::Inherit,
        priority: 0,
        stack_size: 0,
        detached: false,
    })
}

/// POSIX scheduling-attribute entry points and constants.
///
/// Linux takes them from `libc`. The remaining Unix targets declare the
/// ones `libc` does not bind for them.
#[cfg(unix)]
pub mod sys {
    #[cfg(target_os = "linux")]
    pub use libc::{
        PTHREAD_EXPLICIT_SCHED, PTHREAD_INHERIT_SCHED, PTHREAD_PRIO_INHERIT, PTHREAD_PRIO_NONE,
        pthread_attr_getinheritsched, pthread_attr_getschedparam, pthread_attr_getschedpolicy,
        pthread_attr_setinheritsched, pthread_attr_setschedparam, pthread_attr_setschedpolicy,
        pthread_mutexattr_setprotocol,
    };

    #[cfg(target_os = "android")]
    pub use libc::{PTHREAD_EXPLICIT_SCHED, PTHREAD_INHERIT_SCHED};

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub const PTHREAD_INHERIT_SCHED: libc::c_int = 1;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub const PTHREAD_EXPLICIT_SCHED: libc::c_int = 2;

    #[cfg(not(target_os = "linux"))]
    pub const PTHREAD_PRIO_NONE: libc::c_int = 0;
    #[cfg(not(target_os = "linux"))]
    pub const PTHREAD_PRIO_INHERIT: libc::c_int = 1;

    /// Creation-time affinity; glibc only.
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    pub use libc::pthread_attr_setaffinity_np;

    pub use self::ffi::*;

    #[cfg(target_os = "linux")]
    mod ffi {
        use libc::{c_int, pthread_attr_t};

        unsafe extern "C" {
            pub fn pthread_attr_getdetachstate(
                attr: *const pthread_attr_t,
                out: *mut c_int,
            ) -> c_int;
        }
    }

    #[cfg(not(target_os = "linux"))]
    mod ffi {
        use libc::{c_int, pthread_attr_t, sched_param};

        unsafe extern "C" {
            pub fn pthread_mutexattr_setprotocol(
                attr: *mut libc::pthread_mutexattr_t,
                protocol: c_int,
            ) -> c_int;
            pub fn pthread_attr_getinheritsched(
                attr: *const pthread_attr_t,
                out: *mut c_int,
            ) -> c_int;
            pub fn pthread_attr_setinheritsched(attr: *mut pthread_attr_t, inherit: c_int)
            -> c_int;
            pub fn pthread_attr_getschedpolicy(
                attr: *const pthread_attr_t,
                out: *mut c_int,
            ) -> c_int;
            pub fn pthread_attr_setschedpolicy(attr: *mut pthread_attr_t, policy: c_int) -> c_int;
            pub fn pthread_attr_getschedparam(
                attr: *const pthread_attr_t,
                out: *mut sched_param,
            ) -> c_int;
            pub fn pthread_attr_setschedparam(
                attr: *mut pthread_attr_t,
                param: *const sched_param,
            ) -> c_int;
            pub fn pthread_attr_getdetachstate(
                attr: *const pthread_attr_t,
                out: *mut c_int,
            ) -> c_int;
        }
    }
}
