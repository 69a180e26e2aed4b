//! Launch-time thread attributes.

use serde_json::json;

use crate::cpu_set::CpuSet;
use crate::error::{Result, SchedError};
use crate::fatal::{self, ProgrammingError};
use crate::os;
use crate::sched_policy::SchedPolicy;
use crate::thread_config::ThreadConfig;

/// How a new thread should be launched: where it may run, how it is
/// scheduled, how large its stack is and whether it starts detached.
///
/// [`Default`] is the inherit marker: unrestricted affinity, inherited
/// scheduling, OS default stack, joinable. It does not consult the OS.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ThreadAttribute {
    affinity: CpuSet,
    sched_policy: SchedPolicy,
    stack_size: usize,
    priority: i32,
    detached: bool,
}

impl ThreadAttribute {
    /// Attribute populated from the OS default thread attributes.
    pub fn try_new() -> Result<Self> {
        let defaults = os::default_thread_attr()?;
        Ok(Self {
            affinity: CpuSet::new(),
            sched_policy: defaults.sched_policy,
            stack_size: defaults.stack_size,
            priority: defaults.priority,
            detached: defaults.detached,
        })
    }

    /// Like [`ThreadAttribute::try_new`], but a failed OS query aborts the
    /// process.
    #[must_use]
    pub fn new() -> Self {
        match Self::try_new() {
            Ok(attr) => attr,
            Err(err) => fatal::abort_with(
                ProgrammingError::AttributeQueryFailed,
                Some(json!({ "error": err.to_string() })),
            ),
        }
    }

    /// Attribute for this machine built from a thread-config descriptor.
    /// Stack size and detach state come from the OS defaults.
    pub fn from_config(config: &ThreadConfig) -> Result<Self> {
        let mut attr = Self::try_new()?;
        attr.set_thread_config(config)?;
        Ok(attr)
    }

    /// Take affinity, policy and priority from `config`. On error the
    /// attribute is unchanged.
    pub fn set_thread_config(&mut self, config: &ThreadConfig) -> Result<()> {
        let affinity = CpuSet::from_core_affinity(&config.core_affinity)?;
        let policy = SchedPolicy::try_from(config.scheduling_policy)?;
        self.affinity = affinity;
        self.sched_policy = policy;
        self.priority = config.priority;
        Ok(())
    }

    pub fn set_affinity(&mut self, affinity: CpuSet) -> &mut Self {
        self.affinity = affinity;
        self
    }

    pub fn set_sched_policy(&mut self, policy: SchedPolicy) -> &mut Self {
        self.sched_policy = policy;
        self
    }

    /// `0` selects the OS default stack size.
    pub fn set_stack_size(&mut self, stack_size: usize) -> &mut Self {
        self.stack_size = stack_size;
        self
    }

    pub fn set_priority(&mut self, priority: i32) -> &mut Self {
        self.priority = priority;
        self
    }

    pub fn set_run_as_detached(&mut self, detached: bool) -> &mut Self {
        self.detached = detached;
        self
    }

    #[must_use]
    pub fn affinity(&self) -> &CpuSet {
        &self.affinity
    }

    #[must_use]
    pub const fn sched_policy(&self) -> SchedPolicy {
        self.sched_policy
    }

    #[must_use]
    pub const fn stack_size(&self) -> usize {
        self.stack_size
    }

    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    #[must_use]
    pub const fn run_as_detached(&self) -> bool {
        self.detached
    }

    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Priority that will actually be requested from the OS: the configured
    /// one for real-time policies, 0 for every other policy.
    #[must_use]
    pub const fn effective_priority(&self) -> i32 {
        if self.sched_policy.is_realtime() {
            self.priority
        } else {
            0
        }
    }

    /// Reject attributes the OS would refuse or silently misread.
    pub fn validate(&self) -> Result<()> {
        if !self.sched_policy.is_available() {
            return Err(SchedError::invalid(format!(
                "scheduling policy {} is not available on this platform",
                self.sched_policy
            )));
        }
        if self.sched_policy.is_realtime() {
            let (min, max) = os::priority_range(self.sched_policy)?;
            if !(min..=max).contains(&self.priority) {
                return Err(SchedError::invalid(format!(
                    "priority {} outside [{min}, {max}] for policy {}",
                    self.priority, self.sched_policy
                )));
            }
        }
        let min_stack = os::min_stack_size();
        if self.stack_size != 0 && self.stack_size < min_stack {
            return Err(SchedError::invalid(format!(
                "stack size {} below minimum {min_stack}",
                self.stack_size
            )));
        }
        Ok(())
    }

    /// Log-friendly summary.
    #[must_use]
    pub fn describe(&self) -> serde_json::Value {
        json!({
            "policy": self.sched_policy.name(),
            "priority": self.priority,
            "stack_size": self.stack_size,
            "detached": self.detached,
            "affinity": if self.affinity.is_unrestricted() {
                serde_json::Value::Null
            } else {
                json!(self.affinity.iter().collect::<Vec<_>>())
            },
        })
    }
}
