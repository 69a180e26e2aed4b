//! POSIX scheduling and affinity calls shared by thread launch, the
//! calling-thread helpers and the realtime helper.

use pithread_core::cpu_set::CpuMaskWord;
use pithread_core::error::check;
use pithread_core::{CpuSet, Result, SchedError};

/// Set `thread`'s policy and priority.
pub(crate) fn set_thread_sched(thread: libc::pthread_t, native: i32, priority: i32) -> Result<()> {
    // SAFETY: sched_param is plain data; all-zero is a valid value.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = priority;
    // SAFETY: thread is a live handle owned by the caller; param outlives the call.
    check(
        unsafe { libc::pthread_setschedparam(thread, native, &param) },
        "pthread_setschedparam",
    )
}

/// Native policy and priority of `thread`.
pub(crate) fn thread_sched(thread: libc::pthread_t) -> Result<(i32, i32)> {
    let mut native = 0;
    // SAFETY: as above.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    // SAFETY: thread is live; both out-pointers are locals.
    check(
        unsafe { libc::pthread_getschedparam(thread, &mut native, &mut param) },
        "pthread_getschedparam",
    )?;
    Ok((native, param.sched_priority))
}

fn require_cpus(set: &CpuSet) -> Result<Vec<CpuMaskWord>> {
    if set.count() == 0 {
        return Err(SchedError::invalid("affinity set selects no processor"));
    }
    Ok(set.native_words())
}

/// Restrict the calling thread to `set`.
#[cfg(target_os = "linux")]
pub(crate) fn set_self_affinity(set: &CpuSet) -> Result<()> {
    let words = require_cpus(set)?;
    // SAFETY: words is a live buffer of exactly the size passed; the
    // kernel reads no more than that many bytes.
    pithread_core::error::check_errno(
        unsafe {
            libc::sched_setaffinity(
                0,
                std::mem::size_of_val(words.as_slice()),
                words.as_ptr().cast::<libc::cpu_set_t>(),
            )
        },
        "sched_setaffinity",
    )
}

/// Restrict another thread to `set`.
#[cfg(target_os = "linux")]
pub(crate) fn set_thread_affinity(thread: libc::pthread_t, set: &CpuSet) -> Result<()> {
    let words = require_cpus(set)?;
    // SAFETY: thread is live; words is a live buffer of the size passed.
    check(
        unsafe {
            libc::pthread_setaffinity_np(
                thread,
                std::mem::size_of_val(words.as_slice()),
                words.as_ptr().cast::<libc::cpu_set_t>(),
            )
        },
        "pthread_setaffinity_np",
    )
}

/// Affinity of the calling thread.
///
/// Processors at or beyond the online count are not representable in a
/// [`CpuSet`] and are left out.
#[cfg(target_os = "linux")]
pub(crate) fn self_affinity() -> Result<CpuSet> {
    use pithread_core::cpu_set::WORD_BITS;

    // The kernel refuses buffers narrower than its own mask; start at the
    // size of cpu_set_t and widen until it fits.
    let mut words: Vec<CpuMaskWord> =
        vec![0; std::mem::size_of::<libc::cpu_set_t>() / std::mem::size_of::<CpuMaskWord>()];
    loop {
        // SAFETY: words is a live, writable buffer of the size passed.
        let rc = unsafe {
            libc::sched_getaffinity(
                0,
                std::mem::size_of_val(words.as_slice()),
                words.as_mut_ptr().cast::<libc::cpu_set_t>(),
            )
        };
        if rc == 0 {
            break;
        }
        let err = SchedError::last_os("sched_getaffinity");
        if err.errno() != Some(libc::EINVAL) || words.len() >= 1 << 16 {
            return Err(err);
        }
        words.resize(words.len() * 2, 0);
    }
    let num_proc = CpuSet::num_processors();
    let mut set = CpuSet::new();
    for (wi, &word) in words.iter().enumerate() {
        for bit in 0..WORD_BITS {
            let cpu = wi * WORD_BITS + bit;
            if word & (1 << bit) != 0 && cpu < num_proc {
                set.set(cpu)?;
            }
        }
    }
    Ok(set)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_self_affinity(set: &CpuSet) -> Result<()> {
    require_cpus(set)?;
    Err(SchedError::Unsupported("thread affinity"))
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_thread_affinity(_thread: libc::pthread_t, set: &CpuSet) -> Result<()> {
    require_cpus(set)?;
    Err(SchedError::Unsupported("thread affinity"))
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn self_affinity() -> Result<CpuSet> {
    Err(SchedError::Unsupported("thread affinity"))
}
