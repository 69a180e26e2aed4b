//! Portable scheduling policies and their native translation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchedError;
use crate::thread_config::SchedulingPolicy;

/// Scheduling policy requested for a thread.
///
/// `Inherit` means "do not touch scheduling": the new thread keeps whatever
/// the OS gives it by default (inheritance from the creator on POSIX).
/// Every other variant is an explicit request; which of them exist depends
/// on the platform, see [`SchedPolicy::to_native`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedPolicy {
    #[default]
    Inherit,
    Other,
    Fifo,
    Rr,
    Idle,
    Batch,
    Sporadic,
}

impl SchedPolicy {
    pub const ALL: [SchedPolicy; 7] = [
        Self::Inherit,
        Self::Other,
        Self::Fifo,
        Self::Rr,
        Self::Idle,
        Self::Batch,
        Self::Sporadic,
    ];

    /// Native scheduler constant, or `None` for `Inherit` and for policies
    /// this platform does not provide.
    #[must_use]
    pub fn to_native(self) -> Option<i32> {
        match self {
            Self::Inherit => None,
            #[cfg(unix)]
            Self::Other => Some(libc::SCHED_OTHER),
            #[cfg(unix)]
            Self::Fifo => Some(libc::SCHED_FIFO),
            #[cfg(unix)]
            Self::Rr => Some(libc::SCHED_RR),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Self::Idle => Some(libc::SCHED_IDLE),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Self::Batch => Some(libc::SCHED_BATCH),
            _ => None,
        }
    }

    /// Inverse of [`SchedPolicy::to_native`].
    #[must_use]
    pub fn from_native(native: i32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.to_native() == Some(native))
    }

    /// True when this platform can honor the policy.
    #[must_use]
    pub fn is_available(self) -> bool {
        self == Self::Inherit || self.to_native().is_some()
    }

    /// Fixed-priority real-time policies, the only ones where the priority
    /// value has a defined meaning.
    #[must_use]
    pub const fn is_realtime(self) -> bool {
        matches!(self, Self::Fifo | Self::Rr)
    }

    /// Policies the thread-creation attribute can carry. The others must be
    /// applied by the new thread to itself.
    #[must_use]
    pub const fn is_creation_settable(self) -> bool {
        matches!(self, Self::Other | Self::Fifo | Self::Rr)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Inherit => "inherit",
            Self::Other => "other",
            Self::Fifo => "fifo",
            Self::Rr => "rr",
            Self::Idle => "idle",
            Self::Batch => "batch",
            Self::Sporadic => "sporadic",
        }
    }
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SchedPolicy {
    type Err = SchedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.name() == lower)
            .ok_or_else(|| SchedError::invalid(format!("unknown scheduling policy '{s}'")))
    }
}

impl TryFrom<SchedulingPolicy> for SchedPolicy {
    type Error = SchedError;

    fn try_from(policy: SchedulingPolicy) -> Result<Self, Self::Error> {
        let mapped = match policy {
            SchedulingPolicy::Other => Self::Other,
            SchedulingPolicy::Fifo => Self::Fifo,
            SchedulingPolicy::Rr => Self::Rr,
            SchedulingPolicy::Idle => Self::Idle,
            SchedulingPolicy::Batch => Self::Batch,
            SchedulingPolicy::Sporadic => Self::Sporadic,
            // deadline needs runtime/period parameters the descriptor lacks
            SchedulingPolicy::Unknown | SchedulingPolicy::Deadline => {
                return Err(SchedError::invalid(format!(
                    "invalid scheduling policy {policy:?}"
                )));
            }
        };
        if !mapped.is_available() {
            return Err(SchedError::invalid(format!(
                "scheduling policy {mapped} is not available on this platform"
            )));
        }
        Ok(mapped)
    }
}
