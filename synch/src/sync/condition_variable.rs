//! # Condition Variable.
//!
//! A **condition variable** lets a thread sleep until some state guarded by a
//! [`Lock`] changes. The waiter releases the lock while it sleeps and holds
//! it again when [`ConditionVariable::wait`] returns; another thread changes
//! the state under the same lock and calls [`ConditionVariable::signal`] or
//! [`ConditionVariable::broadcast`].
//!
//! KeOS condition variables are **Mesa-style**. A signal only makes the
//! waiter runnable; by the time it has reacquired the lock, another thread
//! may have changed the state again. Always wait in a loop that rechecks the
//! condition, or use [`ConditionVariable::wait_while`], which does that for
//! you:
//!
//! ```ignore
//! let guard = condvar.wait_while(&mutex, |queue| queue.is_empty());
//! ```
//!
//! Each waiter sleeps on a private semaphore, and waiters are woken by the
//! priority they had when they started waiting, highest first. That priority
//! is a snapshot: donations received while asleep do not reorder the list.
use super::{
    lock::Lock,
    mutex::{Mutex, MutexGuard},
    priority::PriorityList,
    semaphore::Semaphore,
};
use crate::{
    interrupt::{GuardedCell, InterruptGuard},
    thread::{Priority, scheduler::scheduler},
};

struct Waiter {
    sema: Semaphore,
    priority: Priority,
}

/// A Condition Variable
///
/// All calls must be made while holding the lock associated with the
/// condition variable. Using one condition variable with several locks is a
/// logic error that this type does not detect.
#[derive(Default)]
pub struct ConditionVariable {
    waiters: GuardedCell<PriorityList<Waiter>>,
}

impl ConditionVariable {
    /// Creates a new condition variable with no waiters.
    pub const fn new() -> Self {
        Self {
            waiters: GuardedCell::new(PriorityList::new()),
        }
    }

    /// Releases `lock`, sleeps until signaled, and reacquires `lock`.
    ///
    /// Panics if the caller does not own `lock` or cannot sleep.
    pub fn wait(&self, lock: &Lock) {
        let sched = scheduler();
        assert!(
            !sched.in_restricted_context(),
            "ConditionVariable::wait: called from a context that cannot sleep."
        );
        assert!(
            lock.held_by_current(),
            "ConditionVariable::wait: lock is not held by the current thread."
        );

        let sema = Semaphore::new(0);
        {
            let guard = InterruptGuard::new();
            let priority = sched.priority(sched.current());
            self.waiters.with(&guard, |waiters| {
                waiters.insert(
                    Waiter {
                        sema: sema.share(),
                        priority,
                    },
                    |w| w.priority,
                )
            });
        }
        lock.release();
        sema.down();
        lock.acquire();
    }

    /// Blocks the current thread while `predicate` returns `true`.
    ///
    /// Locks `mutex`, then waits on this condition variable for as long as
    /// `predicate` holds on the protected data. Returns the guard with the
    /// predicate false. There is no need to check the predicate before
    /// calling `wait_while`.
    pub fn wait_while<'a, T>(
        &self,
        mutex: &'a Mutex<T>,
        mut predicate: impl FnMut(&mut T) -> bool,
    ) -> MutexGuard<'a, T> {
        let mut guard = mutex.lock();
        while predicate(&mut guard) {
            self.wait(mutex.raw());
        }
        guard
    }

    /// Wakes the waiter with the highest priority, if any.
    ///
    /// Signals are not remembered: without a waiter this does nothing.
    /// Panics if the caller does not own `lock`.
    pub fn signal(&self, lock: &Lock) {
        assert!(
            lock.held_by_current(),
            "ConditionVariable::signal: lock is not held by the current thread."
        );
        self.wake_one();
    }

    /// Wakes every waiter, highest priority first.
    ///
    /// Panics if the caller does not own `lock`.
    pub fn broadcast(&self, lock: &Lock) {
        assert!(
            lock.held_by_current(),
            "ConditionVariable::broadcast: lock is not held by the current thread."
        );
        while self.wake_one() {}
    }

    /// Number of threads waiting now.
    pub fn waiters(&self) -> usize {
        let guard = InterruptGuard::new();
        self.waiters.with(&guard, |waiters| waiters.len())
    }

    fn wake_one(&self) -> bool {
        let waiter = {
            let guard = InterruptGuard::new();
            self.waiters.with(&guard, |waiters| waiters.pop_front())
        };
        match waiter {
            Some(waiter) => {
                waiter.sema.up();
                true
            }
            None => false,
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::uniproc::{self, ThreadBuilder};
    use alloc::sync::Arc;
    use static_assertions::assert_impl_all;

    assert_impl_all!(ConditionVariable: Send, Sync);

    #[test]
    fn signal_without_waiters_is_forgotten() {
        uniproc::run(|| {
            let lock = Lock::new();
            let cv = ConditionVariable::new();
            lock.acquire();
            cv.signal(&lock);
            cv.broadcast(&lock);
            assert_eq!(cv.waiters(), 0);
            lock.release();
        });
    }

    #[test]
    fn waiter_reacquires_lock() {
        uniproc::run(|| {
            let shared = Arc::new((Lock::new(), ConditionVariable::new()));
            let waiter = {
                let shared = shared.clone();
                ThreadBuilder::new("waiter").priority(40).spawn(move || {
                    let (lock, cv) = &*shared;
                    lock.acquire();
                    cv.wait(lock);
                    assert!(lock.held_by_current());
                    lock.release();
                })
            };
            let (lock, cv) = &*shared;
            assert_eq!(cv.waiters(), 1);
            lock.acquire();
            cv.signal(lock);
            assert_eq!(cv.waiters(), 0);
            lock.release();
            waiter.join();
        });
    }
}
