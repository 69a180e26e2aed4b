//! Platform-neutral thread configuration descriptor.
//!
//! A [`ThreadConfig`] says how a thread should run (core affinity,
//! scheduling policy, priority) in a form that can be serialized, shipped
//! between processes and generated on a machine with a different core
//! count. [`crate::ThreadAttribute::from_config`] turns it into a launch
//! attribute for this machine.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::os;
use crate::sched_policy::SchedPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("core mask has {mask_bytes} bytes, {core_count} cores need {needed}")]
    MaskTooShort {
        core_count: usize,
        mask_bytes: usize,
        needed: usize,
    },
}

// ---------------------------------------------------------------------------
// Core affinity
// ---------------------------------------------------------------------------

/// Byte bitmask over `core_count` addressable cores: core `i` is bit
/// `i % 8` of byte `i / 8`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreAffinity {
    core_count: usize,
    mask: Vec<u8>,
}

impl CoreAffinity {
    /// All-clear mask addressing `core_count` cores.
    #[must_use]
    pub fn new(core_count: usize) -> Self {
        Self {
            core_count,
            mask: vec![0; core_count.div_ceil(8)],
        }
    }

    /// Wrap an existing mask. The mask must cover `core_count` bits.
    pub fn from_mask(core_count: usize, mask: Vec<u8>) -> Result<Self, ConfigError> {
        let needed = core_count.div_ceil(8);
        if mask.len() < needed {
            return Err(ConfigError::MaskTooShort {
                core_count,
                mask_bytes: mask.len(),
                needed,
            });
        }
        Ok(Self { core_count, mask })
    }

    #[must_use]
    pub const fn core_count(&self) -> usize {
        self.core_count
    }

    #[must_use]
    pub fn mask(&self) -> &[u8] {
        &self.mask
    }

    /// Select core `i`, widening the descriptor if needed.
    pub fn set(&mut self, i: usize) {
        if i >= self.core_count {
            self.core_count = i + 1;
        }
        let needed = self.core_count.div_ceil(8);
        if self.mask.len() < needed {
            self.mask.resize(needed, 0);
        }
        self.mask[i / 8] |= 1 << (i % 8);
    }

    pub fn unset(&mut self, i: usize) {
        if let Some(byte) = self.mask.get_mut(i / 8) {
            *byte &= !(1 << (i % 8));
        }
    }

    #[must_use]
    pub fn is_set(&self, i: usize) -> bool {
        i < self.core_count && self.mask.get(i / 8).is_some_and(|b| b & (1 << (i % 8)) != 0)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        (0..self.core_count).filter(|&i| self.is_set(i)).count()
    }

    /// Selected cores, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.core_count).filter(|&i| self.is_set(i))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let needed = self.core_count.div_ceil(8);
        if self.mask.len() < needed {
            return Err(ConfigError::MaskTooShort {
                core_count: self.core_count,
                mask_bytes: self.mask.len(),
                needed,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Scheduling policy as carried by the descriptor. Wider than
/// [`SchedPolicy`]: it can name policies no platform here supports.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingPolicy {
    #[default]
    Unknown,
    Fifo,
    Rr,
    Sporadic,
    Other,
    Idle,
    Batch,
    Deadline,
}

impl From<SchedPolicy> for SchedulingPolicy {
    fn from(policy: SchedPolicy) -> Self {
        match policy {
            SchedPolicy::Inherit => Self::Unknown,
            SchedPolicy::Other => Self::Other,
            SchedPolicy::Fifo => Self::Fifo,
            SchedPolicy::Rr => Self::Rr,
            SchedPolicy::Idle => Self::Idle,
            SchedPolicy::Batch => Self::Batch,
            SchedPolicy::Sporadic => Self::Sporadic,
        }
    }
}

/// How one thread should run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadConfig {
    #[serde(default)]
    pub core_affinity: CoreAffinity,
    pub scheduling_policy: SchedulingPolicy,
    #[serde(default)]
    pub priority: i32,
    /// Free-form label identifying the thread this entry is for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl ThreadConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.core_affinity.validate()?;
        Ok(config)
    }

    /// Load a single descriptor from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Load a list of descriptors (one per tagged thread) from a JSON file.
    pub fn load_all(path: &Path) -> Result<Vec<Self>, ConfigError> {
        let configs: Vec<Self> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        for config in &configs {
            config.core_affinity.validate()?;
        }
        Ok(configs)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ---------------------------------------------------------------------------
// Coarse real-time priority classes
// ---------------------------------------------------------------------------

/// Simple three-level priority classes for real-time threads, mapped onto
/// the `SCHED_FIFO` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadPriority {
    Low,
    Medium,
    High,
}

impl ThreadPriority {
    /// OS priority for this class under `SCHED_FIFO`, or `None` where the
    /// platform has no FIFO scheduler.
    ///
    /// `Medium` sits one below the midpoint (49 on stock Linux), just under
    /// the default priority of threaded interrupt handlers.
    #[must_use]
    pub fn os_priority(self) -> Option<i32> {
        let (min, max) = os::priority_range(SchedPolicy::Fifo).ok()?;
        Some(Self::from_range(self, min, max))
    }

    #[must_use]
    pub const fn from_range(self, min: i32, max: i32) -> i32 {
        match self {
            Self::Low => min,
            Self::Medium => (min + max) / 2 - 1,
            Self::High => max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_affinity_bits() {
        let mut a = CoreAffinity::new(10);
        assert_eq!(a.mask().len(), 2);
        a.set(0);
        a.set(9);
        assert!(a.is_set(0));
        assert!(a.is_set(9));
        assert!(!a.is_set(5));
        assert_eq!(a.count(), 2);
        a.unset(9);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn core_affinity_set_widens() {
        let mut a = CoreAffinity::default();
        a.set(17);
        assert_eq!(a.core_count(), 18);
        assert_eq!(a.mask().len(), 3);
        assert!(a.is_set(17));
    }

    #[test]
    fn short_mask_rejected() {
        let err = CoreAffinity::from_mask(17, vec![0xff, 0xff]).unwrap_err();
        assert!(matches!(err, ConfigError::MaskTooShort { needed: 3, .. }));
    }

    #[test]
    fn descriptor_json_roundtrip() {
        let mut config = ThreadConfig {
            scheduling_policy: SchedulingPolicy::Fifo,
            priority: 42,
            tag: Some("control-loop".into()),
            ..ThreadConfig::default()
        };
        config.core_affinity.set(1);
        let json = config.to_json().unwrap();
        assert_eq!(ThreadConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn descriptor_defaults_from_sparse_json() {
        let config = ThreadConfig::from_json(r#"{"scheduling_policy":"batch"}"#).unwrap();
        assert_eq!(config.scheduling_policy, SchedulingPolicy::Batch);
        assert_eq!(config.priority, 0);
        assert_eq!(config.core_affinity.core_count(), 0);
        assert!(config.tag.is_none());
    }

    #[test]
    fn descriptor_rejects_inconsistent_mask() {
        let json = r#"{"core_affinity":{"core_count":16,"mask":[1]},"scheduling_policy":"rr"}"#;
        assert!(matches!(
            ThreadConfig::from_json(json),
            Err(ConfigError::MaskTooShort { .. })
        ));
    }

    #[test]
    fn priority_classes_from_linux_fifo_range() {
        assert_eq!(ThreadPriority::Low.from_range(1, 99), 1);
        assert_eq!(ThreadPriority::Medium.from_range(1, 99), 49);
        assert_eq!(ThreadPriority::High.from_range(1, 99), 99);
    }
}
