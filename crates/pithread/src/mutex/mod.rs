//! Priority-inheritance mutexes.
//!
//! [`RawPiMutex`] and [`RawRecursivePiMutex`] are the bare locks;
//! [`PiMutex`] and [`RecursivePiMutex`] wrap them around the data they
//! protect and hand out RAII guards. [`UniqueLock`] is a scoped lock over any
//! [`RawLock`] that can be released and re-acquired within its scope.
//!
//! Misuse reported by the OS (unlocking a mutex the caller does not hold, a
//! detected self-deadlock) aborts the process.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use pithread_core::{Result, SchedError};

#[cfg(not(unix))]
mod generic;
#[cfg(unix)]
mod posix;

#[cfg(not(unix))]
pub use generic::{RawPiMutex, RawRecursivePiMutex};
#[cfg(unix)]
pub use posix::{RawPiMutex, RawRecursivePiMutex};

// ---------------------------------------------------------------------------
// Raw lock protocol
// ---------------------------------------------------------------------------

/// Minimal lock protocol shared by every raw lock in this crate.
pub trait RawLock {
    /// Block until the lock is held by the calling thread.
    fn lock(&self);

    /// Take the lock if it is free (or, for recursive locks, already held
    /// by the caller). Never blocks.
    fn try_lock(&self) -> bool;

    /// Release one level of ownership.
    ///
    /// # Safety
    ///
    /// The calling thread must hold the lock.
    unsafe fn unlock(&self);
}

impl RawLock for parking_lot::RawMutex {
    fn lock(&self) {
        parking_lot::lock_api::RawMutex::lock(self);
    }

    fn try_lock(&self) -> bool {
        parking_lot::lock_api::RawMutex::try_lock(self)
    }

    unsafe fn unlock(&self) {
        // SAFETY: forwarded caller contract.
        unsafe { parking_lot::lock_api::RawMutex::unlock(self) }
    }
}

// ---------------------------------------------------------------------------
// Scoped lock
// ---------------------------------------------------------------------------

/// Scoped ownership of a [`RawLock`] that may be released and re-acquired
/// before the scope ends. Whatever is held at drop is released.
pub struct UniqueLock<'a, L: RawLock> {
    lock: &'a L,
    owned: bool,
    // Ownership is per-thread: the guard must stay on the locking thread.
    _not_send: PhantomData<*const ()>,
}

impl<'a, L: RawLock> UniqueLock<'a, L> {
    /// Acquire `lock`, blocking.
    pub fn new(lock: &'a L) -> Self {
        lock.lock();
        Self {
            lock,
            owned: true,
            _not_send: PhantomData,
        }
    }

    /// Acquire `lock` if free.
    pub fn try_new(lock: &'a L) -> Option<Self> {
        if !lock.try_lock() {
            return None;
        }
        Some(Self {
            lock,
            owned: true,
            _not_send: PhantomData,
        })
    }

    /// Associate with `lock` without acquiring it.
    pub fn deferred(lock: &'a L) -> Self {
        Self {
            lock,
            owned: false,
            _not_send: PhantomData,
        }
    }

    #[must_use]
    pub fn owns_lock(&self) -> bool {
        self.owned
    }

    /// Release early. Fails with `EPERM` when not held.
    pub fn unlock(&mut self) -> Result<()> {
        if !self.owned {
            return Err(SchedError::os("unlock", libc::EPERM));
        }
        // SAFETY: owned means this guard acquired the lock on this thread.
        unsafe { self.lock.unlock() };
        self.owned = false;
        Ok(())
    }

    /// Re-acquire after [`UniqueLock::unlock`]. Fails with `EDEADLK` when
    /// already held.
    pub fn relock(&mut self) -> Result<()> {
        if self.owned {
            return Err(SchedError::os("lock", libc::EDEADLK));
        }
        self.lock.lock();
        self.owned = true;
        Ok(())
    }

    /// Non-blocking [`UniqueLock::relock`].
    pub fn try_relock(&mut self) -> Result<bool> {
        if self.owned {
            return Err(SchedError::os("lock", libc::EDEADLK));
        }
        self.owned = self.lock.try_lock();
        Ok(self.owned)
    }
}

impl<L: RawLock> Drop for UniqueLock<'_, L> {
    fn drop(&mut self) {
        if self.owned {
            // SAFETY: as in unlock.
            unsafe { self.lock.unlock() };
        }
    }
}

// ---------------------------------------------------------------------------
// Data-carrying mutexes
// ---------------------------------------------------------------------------

/// Priority-inheritance mutex protecting a `T`.
pub struct PiMutex<T: ?Sized> {
    raw: RawPiMutex,
    data: UnsafeCell<T>,
}

// SAFETY: the raw mutex serializes all access to data.
unsafe impl<T: ?Sized + Send> Send for PiMutex<T> {}
// SAFETY: as above; only one thread at a time reaches &mut T.
unsafe impl<T: ?Sized + Send> Sync for PiMutex<T> {}

impl<T> PiMutex<T> {
    /// Build the mutex; an OS refusal aborts the process.
    pub fn new(value: T) -> Self {
        Self {
            raw: RawPiMutex::new(),
            data: UnsafeCell::new(value),
        }
    }

    pub fn try_new(value: T) -> Result<Self> {
        Ok(Self {
            raw: RawPiMutex::try_new()?,
            data: UnsafeCell::new(value),
        })
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> PiMutex<T> {
    pub fn lock(&self) -> PiMutexGuard<'_, T> {
        self.raw.lock();
        PiMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_lock(&self) -> Option<PiMutexGuard<'_, T>> {
        if !self.raw.try_lock() {
            return None;
        }
        Some(PiMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        })
    }

    /// Exclusive access without locking; the borrow checker proves no one
    /// else can hold the lock.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    #[must_use]
    pub fn is_priority_inheriting(&self) -> bool {
        self.raw.is_priority_inheriting()
    }

    #[must_use]
    pub fn raw(&self) -> &RawPiMutex {
        &self.raw
    }
}

impl<T: Default> Default for PiMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for PiMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("PiMutex");
        match self.try_lock() {
            Some(guard) => d.field("data", &&*guard),
            None => d.field("data", &format_args!("<locked>")),
        };
        d.finish_non_exhaustive()
    }
}

/// Exclusive access to the data of a locked [`PiMutex`].
#[must_use = "dropping the guard unlocks the mutex immediately"]
pub struct PiMutexGuard<'a, T: ?Sized> {
    mutex: &'a PiMutex<T>,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: sharing the guard only shares &T.
unsafe impl<T: ?Sized + Sync> Sync for PiMutexGuard<'_, T> {}

impl<T: ?Sized> Deref for PiMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the lock is held.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for PiMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves exclusive ownership of the lock.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for PiMutexGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: the guard was created by a successful lock on this thread.
        unsafe { self.mutex.raw.unlock() };
    }
}

/// Recursive priority-inheritance mutex protecting a `T`.
///
/// The owning thread may lock again while holding it, so guards give
/// shared access only; use interior mutability for updates.
pub struct RecursivePiMutex<T: ?Sized> {
    raw: RawRecursivePiMutex,
    data: UnsafeCell<T>,
}

// SAFETY: the raw mutex confines access to one thread at a time.
unsafe impl<T: ?Sized + Send> Send for RecursivePiMutex<T> {}
// SAFETY: as above; guards only hand out &T, on the owning thread.
unsafe impl<T: ?Sized + Send> Sync for RecursivePiMutex<T> {}

impl<T> RecursivePiMutex<T> {
    /// Build the mutex; an OS refusal aborts the process.
    pub fn new(value: T) -> Self {
        Self {
            raw: RawRecursivePiMutex::new(),
            data: UnsafeCell::new(value),
        }
    }

    pub fn try_new(value: T) -> Result<Self> {
        Ok(Self {
            raw: RawRecursivePiMutex::try_new()?,
            data: UnsafeCell::new(value),
        })
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> RecursivePiMutex<T> {
    pub fn lock(&self) -> RecursivePiMutexGuard<'_, T> {
        self.raw.lock();
        RecursivePiMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_lock(&self) -> Option<RecursivePiMutexGuard<'_, T>> {
        if !self.raw.try_lock() {
            return None;
        }
        Some(RecursivePiMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        })
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    #[must_use]
    pub fn is_priority_inheriting(&self) -> bool {
        self.raw.is_priority_inheriting()
    }

    #[must_use]
    pub fn raw(&self) -> &RawRecursivePiMutex {
        &self.raw
    }
}

impl<T: Default> Default for RecursivePiMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RecursivePiMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RecursivePiMutex");
        match self.try_lock() {
            Some(guard) => d.field("data", &&*guard),
            None => d.field("data", &format_args!("<locked>")),
        };
        d.finish_non_exhaustive()
    }
}

/// Shared access to the data of a locked [`RecursivePiMutex`].
#[must_use = "dropping the guard unlocks the mutex immediately"]
pub struct RecursivePiMutexGuard<'a, T: ?Sized> {
    mutex: &'a RecursivePiMutex<T>,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: sharing the guard only shares &T.
unsafe impl<T: ?Sized + Sync> Sync for RecursivePiMutexGuard<'_, T> {}

impl<T: ?Sized> Deref for RecursivePiMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the lock is held by this thread; no &mut T exists while any
        // guard is alive.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for RecursivePiMutexGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: one level of ownership taken by this guard on this thread.
        unsafe { self.mutex.raw.unlock() };
    }
}
