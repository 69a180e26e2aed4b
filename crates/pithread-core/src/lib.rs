//! # pithread-core
//!
//! Platform-neutral data model for scheduling-aware threads.
//!
//! This crate holds the value types a caller builds before launching a
//! thread (affinity sets, scheduling policies, thread attributes, runtime
//! scheduling options), the external thread-config descriptor, and the
//! ambient plumbing shared with the `pithread` crate (errors, runtime
//! configuration, structured logging, fatal paths).
//!
//! Only the [`os`] module talks to the operating system, and only to read:
//! processor counts, default thread attributes and priority ranges.

#![deny(unsafe_code)]

pub mod config;
pub mod cpu_set;
pub mod error;
pub mod fatal;
pub mod mutex_contract;
#[allow(unsafe_code)]
pub mod os;
pub mod sched_options;
pub mod sched_policy;
pub mod structured_log;
pub mod thread_attr;
pub mod thread_config;

pub use cpu_set::CpuSet;
pub use error::{Result, SchedError};
pub use fatal::ProgrammingError;
pub use sched_options::SchedOptions;
pub use sched_policy::SchedPolicy;
pub use thread_attr::ThreadAttribute;
pub use thread_config::{
    ConfigError, CoreAffinity, SchedulingPolicy, ThreadConfig, ThreadPriority,
};
