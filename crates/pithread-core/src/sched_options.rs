//! Scheduling changes applied to an already running thread.

use serde_json::json;

use crate::cpu_set::CpuSet;
use crate::sched_policy::SchedPolicy;

/// Requested runtime scheduling change. Every field is optional: an absent
/// field leaves that aspect of the thread untouched.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedOptions {
    pub priority: Option<i32>,
    pub policy: Option<SchedPolicy>,
    pub core_affinity: Option<CpuSet>,
}

impl SchedOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SchedPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn with_core_affinity(mut self, affinity: CpuSet) -> Self {
        self.core_affinity = Some(affinity);
        self
    }

    /// True when applying these options would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.priority.is_none()
            && matches!(self.policy, None | Some(SchedPolicy::Inherit))
            && self.core_affinity.is_none()
    }

    /// Policy the options actually ask for. `Some(Inherit)` counts as no
    /// request.
    #[must_use]
    pub fn requested_policy(&self) -> Option<SchedPolicy> {
        self.policy.filter(|p| *p != SchedPolicy::Inherit)
    }

    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Log-friendly summary.
    #[must_use]
    pub fn describe(&self) -> serde_json::Value {
        json!({
            "priority": self.priority,
            "policy": self.policy.map(|p| p.name()),
            "core_affinity": self
                .core_affinity
                .as_ref()
                .map(|set| set.iter().collect::<Vec<_>>()),
        })
    }
}
