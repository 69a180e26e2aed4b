//! Recoverable error conditions.
//!
//! Ownership violations are not represented here: they are fatal and go
//! through [`crate::fatal`].

use thiserror::Error;

/// Recoverable failure of a scheduling or threading operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedError {
    /// Malformed input fully under the caller's control.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The underlying OS call refused the request.
    #[error("{op} failed: {} (errno {errno})", describe_errno(.errno))]
    OsResource { op: &'static str, errno: i32 },
    /// The capability does not exist on this platform.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

/// Result alias used across pithread.
pub type Result<T> = core::result::Result<T, SchedError>;

impl SchedError {
    /// Build an [`SchedError::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Build an [`SchedError::OsResource`] from a pthread-style return code
    /// or a captured `errno`.
    #[must_use]
    pub const fn os(op: &'static str, errno: i32) -> Self {
        Self::OsResource { op, errno }
    }

    /// Build an [`SchedError::OsResource`] from the calling thread's `errno`.
    #[must_use]
    pub fn last_os(op: &'static str) -> Self {
        let errno = std::io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(libc::EIO);
        Self::OsResource { op, errno }
    }

    /// The OS error number, if this error came from the OS.
    #[must_use]
    pub const fn errno(&self) -> Option<i32> {
        match self {
            Self::OsResource { errno, .. } => Some(*errno),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// True when the OS refused for lack of privilege (real-time scheduling
    /// without `CAP_SYS_NICE`, for instance).
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            Self::OsResource { errno, .. } if *errno == libc::EPERM || *errno == libc::EACCES
        )
    }
}

/// Map a pthread-style return code (0 on success, errno otherwise).
pub fn check(rc: i32, op: &'static str) -> Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(SchedError::os(op, rc))
    }
}

/// Map a syscall-style return code (-1 and `errno` on failure).
pub fn check_errno(rc: i32, op: &'static str) -> Result<()> {
    if rc == -1 {
        Err(SchedError::last_os(op))
    } else {
        Ok(())
    }
}

fn describe_errno(errno: &i32) -> String {
    std::io::Error::from_raw_os_error(*errno).to_string()
}
