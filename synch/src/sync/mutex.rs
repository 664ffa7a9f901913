//! # Mutex.
//!
//! A [`Mutex`] is a [`Lock`] that owns the data it protects. The data can only
//! be reached through the [`MutexGuard`] returned by [`Mutex::lock`] or
//! [`Mutex::try_lock`], so it is never touched without holding the lock.
//!
//! The guard releases the lock when dropped, or explicitly with
//! [`MutexGuard::unlock`]. Waiting for a mutex donates priority exactly like
//! waiting for a [`Lock`].
use super::{WouldBlock, lock::Lock};
use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

/// A mutual exclusion primitive useful for protecting shared data.
///
/// ```ignore
/// let counter = Arc::new(Mutex::new(0));
/// for _ in 0..N {
///     let counter = counter.clone();
///     ThreadBuilder::new("work").spawn(move || {
///         let mut count = counter.lock();
///         *count += 1;
///         count.unlock();
///     });
/// }
/// ```
pub struct Mutex<T> {
    lock: Lock,
    data: UnsafeCell<T>,
}

// SAFETY: the data is only reachable through a `MutexGuard`, and at most one
// guard exists at a time because it owns the lock.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new mutex in an unlocked state ready for use.
    pub fn new(t: T) -> Self {
        Self {
            lock: Lock::new(),
            data: UnsafeCell::new(t),
        }
    }

    /// Acquires the mutex, sleeping until it is available.
    ///
    /// Panics if the caller already holds it.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.lock.acquire();
        MutexGuard::new(self)
    }

    /// Attempts to acquire the mutex without sleeping.
    ///
    /// # Errors
    ///
    /// Returns [`WouldBlock`] if another thread holds the mutex.
    pub fn try_lock(&self) -> Result<MutexGuard<'_, T>, WouldBlock> {
        if self.lock.try_acquire() {
            Ok(MutexGuard::new(self))
        } else {
            Err(WouldBlock)
        }
    }

    /// Consumes this mutex, returning the underlying data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    /// The [`Lock`] underneath, for use with a [`ConditionVariable`].
    ///
    /// [`ConditionVariable`]: crate::sync::ConditionVariable
    pub fn raw(&self) -> &Lock {
        &self.lock
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// An RAII implementation of a "scoped lock" of a mutex.
///
/// The lock is released when this structure is dropped or passed to
/// [`MutexGuard::unlock`]. The protected data is reached through its
/// [`Deref`] and [`DerefMut`] implementations.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    // The lock belongs to the thread that acquired it.
    _not_send: PhantomData<*const ()>,
}

impl<'a, T> MutexGuard<'a, T> {
    fn new(mutex: &'a Mutex<T>) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }

    /// Releases the lock.
    pub fn unlock(self) {}

    /// The [`Lock`] this guard holds.
    pub fn raw(&self) -> &'a Lock {
        &self.mutex.lock
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard owns the lock.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard owns the lock, and `&mut self` is unique.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.lock.release();
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::uniproc;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    assert_impl_all!(Mutex<u64>: Send, Sync);
    assert_not_impl_any!(MutexGuard<'static, u64>: Send);

    #[test]
    fn guard_gives_access() {
        uniproc::run(|| {
            let mutex = Mutex::new(1);
            {
                let mut guard = mutex.lock();
                *guard += 1;
                assert!(guard.raw().held_by_current());
                guard.unlock();
            }
            assert!(!mutex.raw().held_by_current());
            *mutex.try_lock().unwrap() += 1;
            assert_eq!(mutex.into_inner(), 3);
        });
    }
}
