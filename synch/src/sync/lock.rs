//! # Lock.
//!
//! A [`Lock`] is a semaphore with one permit and an owner. Only the thread
//! that acquired a lock may release it, and a thread may not acquire a lock
//! it already owns.
//!
//! Owning a lock makes a thread a target of **priority donation**. When a
//! thread must wait for a lock, it first lends its priority to the owner
//! (see [`donation`]), so the owner runs at least as urgently as anybody
//! waiting on it. Releasing the lock takes back exactly the part of the
//! owner's priority that waiters of this lock lent.
//!
//! [`donation`]: super::donation
use super::{donation, semaphore::Semaphore};
use crate::{
    interrupt::{GuardedCell, InterruptGuard},
    thread::{Priority, Tid, scheduler::scheduler},
};
use alloc::sync::Arc;

/// The longest chain of lock owners a single donation walks.
///
/// Owners further along the chain keep their priority. Any cycle in the chain
/// is cut off at this length too.
pub const MAX_DONATION_DEPTH: usize = 8;

/// A non-reentrant lock with priority donation.
///
/// Unlike [`Mutex`], a `Lock` does not own data and does not release itself:
/// every [`acquire`] must be paired with a [`release`] by the same thread.
///
/// [`Mutex`]: crate::sync::Mutex
/// [`acquire`]: Lock::acquire
/// [`release`]: Lock::release
pub struct Lock {
    inner: Arc<LockInner>,
}

/// Shared state of a [`Lock`]; also the handle threads keep in
/// `locks_held` and `waiting_for_lock`.
pub(crate) struct LockInner {
    owner: GuardedCell<Option<Tid>>,
    sema: Semaphore,
}

impl LockInner {
    pub(crate) fn holder(&self, guard: &InterruptGuard) -> Option<Tid> {
        self.owner.with(guard, |owner| *owner)
    }

    /// Priority of the thread that would get the lock next.
    pub(crate) fn max_waiter_priority(&self, guard: &InterruptGuard) -> Option<Priority> {
        let front = self.sema.inner().front(guard)?;
        Some(scheduler().priority(front))
    }

    fn check(&self, guard: &InterruptGuard) {
        debug_assert_eq!(
            self.holder(guard).is_none(),
            self.sema.inner().value(guard) == 1,
            "Lock: owner and permit disagree."
        );
    }
}

impl Lock {
    /// Creates a new, unowned lock.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LockInner {
                owner: GuardedCell::new(None),
                sema: Semaphore::new(1),
            }),
        }
    }

    /// Acquires the lock, sleeping until it is available.
    ///
    /// Before sleeping, the caller donates its priority along the chain of
    /// owners it waits behind. Panics if the caller already owns the lock or
    /// is in a context that cannot sleep.
    pub fn acquire(&self) {
        let sched = scheduler();
        assert!(
            !sched.in_restricted_context(),
            "Lock::acquire: called from a context that cannot sleep."
        );
        let guard = InterruptGuard::new();
        let me = sched.current();
        assert!(
            self.inner.holder(&guard) != Some(me),
            "Lock::acquire: lock is already held by the current thread."
        );

        donation::donate(&guard, me, &self.inner);
        sched.with_thread(me, |th| th.waiting_for_lock = Some(self.inner.clone()));
        self.inner.sema.down();
        self.take(&guard, me);
    }

    /// Acquires the lock only if it is free now. Never donates.
    ///
    /// Returns whether the lock was acquired. Panics if the caller already
    /// owns the lock.
    pub fn try_acquire(&self) -> bool {
        let sched = scheduler();
        let guard = InterruptGuard::new();
        let me = sched.current();
        assert!(
            self.inner.holder(&guard) != Some(me),
            "Lock::try_acquire: lock is already held by the current thread."
        );
        let acquired = self.inner.sema.try_down();
        if acquired {
            self.take(&guard, me);
        }
        acquired
    }

    /// Releases the lock and wakes the highest-priority waiter.
    ///
    /// The caller's priority drops back to the highest donation that its
    /// remaining locks still justify, or to its base priority. Panics if the
    /// caller does not own the lock.
    pub fn release(&self) {
        let sched = scheduler();
        let guard = InterruptGuard::new();
        let me = sched.current();
        assert!(
            self.inner.holder(&guard) == Some(me),
            "Lock::release: lock is not held by the current thread."
        );
        sched.with_thread(me, |th| {
            th.locks_held.retain(|l| !Arc::ptr_eq(l, &self.inner))
        });
        self.inner.owner.with(&guard, |owner| *owner = None);
        donation::recompute(&guard, me);
        // The permit goes back before preemption is restored, so a tick never
        // finds the lock free with its permit still taken.
        self.inner.sema.up();
        self.inner.check(&guard);
    }

    /// Returns true if the current thread owns this lock.
    ///
    /// Only the answer about the caller itself is reliable: whether some
    /// other thread owns the lock may change as soon as this returns.
    pub fn held_by_current(&self) -> bool {
        let guard = InterruptGuard::new();
        self.inner.holder(&guard) == Some(scheduler().current())
    }

    fn take(&self, guard: &InterruptGuard, me: Tid) {
        self.inner.owner.with(guard, |owner| *owner = Some(me));
        scheduler().with_thread(me, |th| {
            th.waiting_for_lock = None;
            th.locks_held.push(self.inner.clone());
        });
        self.inner.check(guard);
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::{
        thread::{Current, get_priority_by_tid},
        uniproc::{self, ThreadBuilder},
    };

    #[test]
    fn acquire_and_release() {
        uniproc::run(|| {
            let lock = Lock::new();
            assert!(!lock.held_by_current());
            lock.acquire();
            assert!(lock.held_by_current());
            lock.release();
            assert!(lock.try_acquire());
            assert!(lock.held_by_current());
            lock.release();
            assert!(!lock.held_by_current());
        });
    }

    #[test]
    fn try_acquire_fails_while_owned() {
        uniproc::run(|| {
            let lock = Arc::new(Lock::new());
            lock.acquire();
            let other = {
                let lock = lock.clone();
                ThreadBuilder::new("other")
                    .priority(40)
                    .spawn(move || assert!(!lock.try_acquire()))
            };
            other.join();
            // `try_acquire` never donates.
            assert_eq!(Current::priority(), 31);
            lock.release();
        });
    }

    #[test]
    fn donation_is_returned_on_release() {
        uniproc::run(|| {
            let lock = Arc::new(Lock::new());
            let me = Current::get_tid();
            lock.acquire();
            let waiter = {
                let lock = lock.clone();
                ThreadBuilder::new("waiter").priority(50).spawn(move || {
                    lock.acquire();
                    lock.release();
                })
            };
            assert_eq!(get_priority_by_tid(me), 50);
            assert_eq!(Current::base_priority(), Some(31));
            lock.release();
            assert_eq!(Current::priority(), 31);
            assert_eq!(Current::base_priority(), None);
            waiter.join();
        });
    }

    #[test]
    #[should_panic(expected = "Lock::release: lock is not held by the current thread.")]
    fn release_requires_ownership() {
        uniproc::run(|| Lock::new().release());
    }
}
