//! One-call real-time setup for an already running thread.

use serde_json::json;

use pithread_core::structured_log::{self, LogEntry, LogLevel};
use pithread_core::{CpuSet, Result, SchedError, ThreadPriority};

use crate::thread::Thread;

/// Switch `thread` to `SCHED_FIFO` at the OS priority of `priority` and,
/// when `cpu_bitmask` is non-zero, pin it to the processors whose bits are
/// set (bit `i` selects processor `i`). Bits past the online processors are
/// ignored; a mask naming none of them is an invalid argument.
///
/// Usually needs `CAP_SYS_NICE` or an `RLIMIT_RTPRIO` allowance; without it
/// the OS refuses with `EPERM`.
pub fn configure_realtime_thread(
    thread: &Thread,
    priority: ThreadPriority,
    cpu_bitmask: u32,
) -> Result<()> {
    let affinity = mask_to_cpu_set(cpu_bitmask)?;
    let outcome = apply(thread, priority, affinity.as_ref());
    let level = if outcome.is_ok() {
        LogLevel::Info
    } else {
        LogLevel::Warn
    };
    let mut entry = LogEntry::new(level, "realtime_configured")
        .with_thread(thread.id().to_string())
        .with_details(json!({
            "priority": priority,
            "cpu_bitmask": format!("{cpu_bitmask:#x}"),
        }));
    if let Err(SchedError::OsResource { op, errno }) = &outcome {
        entry = entry.with_op(*op).with_errno(*errno);
    }
    structured_log::emit(entry);
    outcome
}

/// Bits for processors that are not online are ignored, so `u32::MAX`
/// means "every processor".
fn mask_to_cpu_set(cpu_bitmask: u32) -> Result<Option<CpuSet>> {
    if cpu_bitmask == 0 {
        return Ok(None);
    }
    let online = CpuSet::num_processors().min(u32::BITS as usize);
    let set = CpuSet::from_cpus((0..online).filter(|&i| cpu_bitmask & (1 << i) != 0))?;
    if set.count() == 0 {
        return Err(SchedError::invalid(format!(
            "cpu mask {cpu_bitmask:#x} selects no online processor"
        )));
    }
    Ok(Some(set))
}

#[cfg(unix)]
fn apply(thread: &Thread, priority: ThreadPriority, affinity: Option<&CpuSet>) -> Result<()> {
    let handle = thread
        .native_handle()
        .ok_or_else(|| SchedError::invalid("thread is not running"))?;
    let os_priority = priority
        .os_priority()
        .ok_or(SchedError::Unsupported("SCHED_FIFO priorities"))?;
    crate::sched::set_thread_sched(handle, libc::SCHED_FIFO, os_priority)?;
    if let Some(set) = affinity {
        crate::sched::set_thread_affinity(handle, set)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply(thread: &Thread, _priority: ThreadPriority, _affinity: Option<&CpuSet>) -> Result<()> {
    if !thread.joinable() {
        return Err(SchedError::invalid("thread is not running"));
    }
    Err(SchedError::Unsupported("real-time scheduling"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_mask_means_no_affinity_change() {
        assert_eq!(mask_to_cpu_set(0).unwrap(), None);
    }

    #[test]
    fn mask_bits_select_processors() {
        let set = mask_to_cpu_set(0b1).unwrap().unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn full_mask_selects_every_online_processor() {
        let set = mask_to_cpu_set(u32::MAX).unwrap().unwrap();
        assert_eq!(set.count(), CpuSet::num_processors().min(32));
    }

    #[test]
    fn offline_bits_are_ignored() {
        let set = mask_to_cpu_set(0b1 | 1 << 31).unwrap().unwrap();
        assert!(set.is_set(0).unwrap());
        assert_eq!(set.count(), if CpuSet::num_processors() >= 32 { 2 } else { 1 });
    }

    #[test]
    fn mask_with_only_offline_bits_is_invalid() {
        if CpuSet::num_processors() >= 32 {
            return;
        }
        assert!(mask_to_cpu_set(1 << 31).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn empty_thread_is_rejected() {
        let err = configure_realtime_thread(&Thread::new(), ThreadPriority::Low, 0).unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
