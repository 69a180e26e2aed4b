//! `parking_lot` locks for targets without pthreads. They never inherit
//! priority.

use parking_lot::lock_api::{self, RawMutex as _};

use pithread_core::Result;

use super::RawLock;

type Reentrant = lock_api::RawReentrantMutex<parking_lot::RawMutex, parking_lot::RawThreadId>;

/// Non-recursive mutex; plain `parking_lot` lock on this target.
pub struct RawPiMutex(parking_lot::RawMutex);

impl RawPiMutex {
    #[must_use]
    pub fn new() -> Self {
        Self(parking_lot::RawMutex::INIT)
    }

    pub fn try_new() -> Result<Self> {
        Ok(Self::new())
    }

    pub fn lock(&self) {
        self.0.lock();
    }

    pub fn try_lock(&self) -> bool {
        self.0.try_lock()
    }

    /// # Safety
    ///
    /// The calling thread must hold the mutex.
    pub unsafe fn unlock(&self) {
        // SAFETY: forwarded caller contract.
        unsafe { self.0.unlock() }
    }

    #[must_use]
    pub fn is_priority_inheriting(&self) -> bool {
        false
    }
}

/// Recursive mutex; `lock_api` reentrant lock on this target.
pub struct RawRecursivePiMutex(Reentrant);

impl RawRecursivePiMutex {
    #[must_use]
    pub fn new() -> Self {
        Self(Reentrant::INIT)
    }

    pub fn try_new() -> Result<Self> {
        Ok(Self::new())
    }

    pub fn lock(&self) {
        self.0.lock();
    }

    pub fn try_lock(&self) -> bool {
        self.0.try_lock()
    }

    /// # Safety
    ///
    /// The calling thread must hold the mutex.
    pub unsafe fn unlock(&self) {
        // SAFETY: forwarded caller contract.
        unsafe { self.0.unlock() }
    }

    #[must_use]
    pub fn is_priority_inheriting(&self) -> bool {
        false
    }
}

macro_rules! forward_raw_lock {
    ($($name:ident),*) => {$(
        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl RawLock for $name {
            fn lock(&self) {
                $name::lock(self);
            }

            fn try_lock(&self) -> bool {
                $name::try_lock(self)
            }

            unsafe fn unlock(&self) {
                // SAFETY: forwarded caller contract.
                unsafe { $name::unlock(self) }
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("priority_inheriting", &false)
                    .finish_non_exhaustive()
            }
        }
    )*};
}

forward_raw_lock!(RawPiMutex, RawRecursivePiMutex);
