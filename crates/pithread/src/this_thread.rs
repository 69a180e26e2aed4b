//! Operations on the calling thread.

use pithread_core::structured_log::{self, LogEntry, LogLevel};
use pithread_core::{CpuSet, Result, SchedError, SchedOptions, SchedPolicy};

use crate::thread::{self, ThreadId};

/// Offer the processor to another runnable thread.
pub fn yield_now() {
    #[cfg(unix)]
    {
        // SAFETY: sched_yield has no preconditions.
        unsafe { libc::sched_yield() };
    }
    #[cfg(not(unix))]
    std::thread::yield_now();
}

/// Identity of the calling thread.
#[must_use]
pub fn get_id() -> ThreadId {
    thread::current_id()
}

/// Change the calling thread's scheduling.
///
/// - A policy (other than `Inherit`) is applied together with the given
///   priority, or with the current priority when none is given. Priorities
///   are forced to 0 for policies without a priority range.
/// - A priority alone is applied under the current policy.
/// - An affinity restricts the calling thread to the selected processors;
///   an unrestricted set allows every online processor.
///
/// Each aspect is applied in that order; a failure leaves earlier aspects
/// applied.
pub fn apply_sched_options(options: &SchedOptions) -> Result<()> {
    let outcome = apply(options);
    let mut entry = LogEntry::new(
        if outcome.is_ok() {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        },
        "sched_options_applied",
    )
    .with_thread(get_id().to_string())
    .with_details(options.describe());
    if let Err(SchedError::OsResource { op, errno }) = &outcome {
        entry = entry.with_op(*op).with_errno(*errno);
    }
    structured_log::emit(entry);
    outcome
}

#[cfg(unix)]
fn apply(options: &SchedOptions) -> Result<()> {
    use crate::sched;

    // SAFETY: pthread_self has no preconditions.
    let me = unsafe { libc::pthread_self() };
    if let Some(policy) = options.requested_policy() {
        let native = policy.to_native().ok_or_else(|| {
            SchedError::invalid(format!(
                "scheduling policy {policy} is not available on this platform"
            ))
        })?;
        let priority = if policy.is_realtime() {
            let priority = match options.priority {
                Some(p) => p,
                None => sched::thread_sched(me)?.1,
            };
            let (min, max) = pithread_core::os::priority_range(policy)?;
            if !(min..=max).contains(&priority) {
                return Err(SchedError::invalid(format!(
                    "priority {priority} outside [{min}, {max}] for policy {policy}"
                )));
            }
            priority
        } else {
            0
        };
        sched::set_thread_sched(me, native, priority)?;
    } else if let Some(priority) = options.priority {
        let (native, _) = sched::thread_sched(me)?;
        sched::set_thread_sched(me, native, priority)?;
    }
    if let Some(affinity) = &options.core_affinity {
        if affinity.is_unrestricted() {
            let all = CpuSet::from_cpus(0..CpuSet::num_processors())?;
            sched::set_self_affinity(&all)?;
        } else {
            sched::set_self_affinity(affinity)?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply(options: &SchedOptions) -> Result<()> {
    if options.is_empty() {
        return Ok(());
    }
    if let Some(affinity) = &options.core_affinity {
        if !affinity.is_unrestricted() && affinity.count() == 0 {
            return Err(SchedError::invalid("affinity set selects no processor"));
        }
    }
    Err(SchedError::Unsupported("runtime scheduling changes"))
}

/// Effective scheduling policy and priority of the calling thread.
#[cfg(unix)]
pub fn sched_params() -> Result<(SchedPolicy, i32)> {
    // SAFETY: pthread_self has no preconditions.
    let (native, priority) = crate::sched::thread_sched(unsafe { libc::pthread_self() })?;
    let policy = SchedPolicy::from_native(native)
        .ok_or(SchedError::Unsupported("reported scheduling policy"))?;
    Ok((policy, priority))
}

#[cfg(not(unix))]
pub fn sched_params() -> Result<(SchedPolicy, i32)> {
    Err(SchedError::Unsupported("scheduling policy query"))
}

/// Processors the calling thread may run on.
#[cfg(unix)]
pub fn affinity() -> Result<CpuSet> {
    crate::sched::self_affinity()
}

#[cfg(not(unix))]
pub fn affinity() -> Result<CpuSet> {
    Err(SchedError::Unsupported("thread affinity"))
}
