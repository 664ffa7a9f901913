//! # Semaphore.
//!
//! A **semaphore** is a non-negative count of permits together with the list
//! of threads waiting for one. It is the only primitive of KeOS that puts a
//! thread to sleep: [`Lock`] and [`ConditionVariable`] block through it.
//!
//! - [`Semaphore::down`] takes a permit, sleeping until one is available.
//! - [`Semaphore::try_down`] takes a permit only if one is available now.
//! - [`Semaphore::up`] returns a permit and wakes the highest-priority waiter.
//!
//! A semaphore created with zero permits is a signal: one thread downs it to
//! wait for an event and another ups it when the event happens.
//!
//! ## Wake-up semantics
//!
//! [`Semaphore::up`] does not hand its permit to the waiter it wakes. The
//! waiter only becomes runnable and takes the permit once it runs again. If a
//! thread of higher priority takes the permit in the meantime, the waiter
//! finds the count at zero, queues again at its priority, and sleeps. The
//! count therefore never goes below zero, and a waiter is never released
//! without a matching `up`.
//!
//! [`Lock`]: crate::sync::Lock
//! [`ConditionVariable`]: crate::sync::ConditionVariable
use super::priority::PriorityList;
use crate::{
    interrupt::{GuardedCell, InterruptGuard},
    thread::{Tid, scheduler::scheduler},
};
use alloc::sync::Arc;

/// Counting semaphore.
///
/// Waiters are woken strictly by priority, FIFO among equal priorities. The
/// order follows priority changes of queued threads.
pub struct Semaphore {
    inner: Arc<SemaphoreInner>,
}

/// Shared state of a [`Semaphore`]; also the handle threads keep in
/// `blocking_on` while they wait.
pub(crate) struct SemaphoreInner {
    state: GuardedCell<SemaState>,
}

struct SemaState {
    value: usize,
    waiters: PriorityList<Tid>,
}

impl SemaphoreInner {
    /// Moves `tid` to the place its current priority dictates.
    pub(crate) fn reposition(&self, guard: &InterruptGuard, tid: Tid) {
        let sched = scheduler();
        self.state.with(guard, |st| {
            st.waiters.reposition(|t| *t == tid, |t| sched.priority(*t));
            debug_assert!(st.waiters.is_ordered(|t| sched.priority(*t)));
        });
    }

    /// The thread that would be woken next.
    pub(crate) fn front(&self, guard: &InterruptGuard) -> Option<Tid> {
        self.state.with(guard, |st| st.waiters.front().copied())
    }

    pub(crate) fn value(&self, guard: &InterruptGuard) -> usize {
        self.state.with(guard, |st| st.value)
    }
}

impl Semaphore {
    /// Creates a new semaphore holding `value` permits.
    pub fn new(value: usize) -> Self {
        Self {
            inner: Arc::new(SemaphoreInner {
                state: GuardedCell::new(SemaState {
                    value,
                    waiters: PriorityList::new(),
                }),
            }),
        }
    }

    /// Takes a permit, sleeping until one is available.
    ///
    /// While asleep the caller sits on the wait list, ordered by its current
    /// priority. Panics if called from a context that cannot sleep, such as
    /// an interrupt handler.
    pub fn down(&self) {
        let sched = scheduler();
        assert!(
            !sched.in_restricted_context(),
            "Semaphore::down: called from a context that cannot sleep."
        );
        let guard = InterruptGuard::new();
        let me = sched.current();
        loop {
            let taken = self.inner.state.with(&guard, |st| {
                if st.value > 0 {
                    st.value -= 1;
                    true
                } else {
                    st.waiters.insert(me, |t| sched.priority(*t));
                    debug_assert!(st.waiters.is_ordered(|t| sched.priority(*t)));
                    false
                }
            });
            if taken {
                return;
            }
            sched.with_thread(me, |th| th.blocking_on = Some(self.inner.clone()));
            sched.suspend_current();
        }
    }

    /// Takes a permit if one is available, without sleeping.
    ///
    /// Returns whether a permit was taken. Callable from any context.
    pub fn try_down(&self) -> bool {
        let guard = InterruptGuard::new();
        self.inner.state.with(&guard, |st| {
            if st.value > 0 {
                st.value -= 1;
                true
            } else {
                false
            }
        })
    }

    /// Returns a permit and wakes the highest-priority waiter, if any.
    ///
    /// Never sleeps. If the woken thread outranks the caller, the caller
    /// yields to it; inside an interrupt handler the yield waits until the
    /// handler returns.
    pub fn up(&self) {
        let sched = scheduler();
        {
            let guard = InterruptGuard::new();
            let woken = self.inner.state.with(&guard, |st| {
                st.value += 1;
                st.waiters.pop_front()
            });
            if let Some(tid) = woken {
                sched.with_thread(tid, |th| th.blocking_on = None);
                sched.make_runnable(tid);
            }
        }
        sched.maybe_preempt();
    }

    /// Number of permits available now.
    pub fn value(&self) -> usize {
        let guard = InterruptGuard::new();
        self.inner.value(&guard)
    }

    /// Number of threads waiting now.
    pub fn waiters(&self) -> usize {
        let guard = InterruptGuard::new();
        self.inner.state.with(&guard, |st| st.waiters.len())
    }

    /// Another handle to the same semaphore.
    pub(crate) fn share(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<SemaphoreInner> {
        &self.inner
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::uniproc::{self, ThreadBuilder};
    use static_assertions::assert_impl_all;

    assert_impl_all!(Semaphore: Send, Sync);

    #[test]
    fn counts_permits() {
        uniproc::run(|| {
            let sema = Semaphore::new(2);
            sema.down();
            assert!(sema.try_down());
            assert!(!sema.try_down());
            assert_eq!(sema.value(), 0);
            sema.up();
            sema.up();
            assert_eq!(sema.value(), 2);
            assert_eq!(sema.waiters(), 0);
        });
    }

    #[test]
    fn waiter_sleeps_until_up() {
        uniproc::run(|| {
            let sema = Arc::new(Semaphore::new(0));
            let handle = {
                let sema = sema.clone();
                ThreadBuilder::new("waiter").spawn(move || sema.down())
            };
            // The waiter has the same priority and runs only when we block.
            uniproc::timer_tick();
            assert_eq!(sema.waiters(), 1);
            sema.up();
            handle.join();
            assert_eq!(sema.value(), 0);
            assert_eq!(sema.waiters(), 0);
        });
    }
}
