//! Thread scheduler interface.

use super::{Priority, ThreadState, ThreadSync, Tid};
use crate::interrupt::InterruptState;

/// A trait for a thread scheduler.
///
/// The [`Scheduler`] trait is everything the synchronization core needs from
/// the thread subsystem. The core never switches contexts by itself: it parks
/// and unparks threads, changes their priorities, and asks the scheduler to
/// keep its ready list consistent.
///
/// Implementations must keep the ready list ordered by
/// [`ThreadSync::priority`], highest first and FIFO among equals, and must
/// dispatch the head of that list whenever the running thread gives up the
/// CPU.
pub trait Scheduler: Sync {
    /// Identity of the calling thread.
    fn current(&self) -> Tid;

    /// State of the thread `tid`.
    ///
    /// Panics if no such thread exists.
    fn state(&self, tid: Tid) -> ThreadState;

    /// Run `f` on the synchronization record of the thread `tid`.
    ///
    /// `f` only touches the record; it never calls back into the scheduler.
    /// Panics if no such thread exists.
    fn with_sync(&self, tid: Tid, f: &mut dyn FnMut(&mut ThreadSync));

    /// Deschedule the current thread.
    ///
    /// The caller has suspended preemption and has already put itself on a
    /// wait list. Returns only after some other thread has passed it to
    /// [`Scheduler::make_runnable`] and it has been dispatched again.
    fn suspend_current(&self);

    /// Mark a parked thread eligible to run again.
    ///
    /// This never switches away from the caller.
    fn make_runnable(&self, tid: Tid);

    /// Yield if a runnable thread now outranks the current one.
    ///
    /// In a context that cannot yield (an interrupt handler) the yield is
    /// deferred until the handler returns.
    fn maybe_preempt(&self);

    /// Reposition `tid` in the ready list after its priority changed.
    ///
    /// Does nothing if the thread is not in the ready list.
    fn reorder_ready(&self, tid: Tid);

    /// Suspend preemption and return the previous state.
    fn disable_preemption(&self) -> InterruptState;

    /// Restore a state previously returned by
    /// [`Scheduler::disable_preemption`].
    fn restore_preemption(&self, state: InterruptState);

    /// True if the caller must not block, e.g. inside an interrupt handler.
    fn in_restricted_context(&self) -> bool;
}

static SCHEDULER: spin::Once<&'static dyn Scheduler> = spin::Once::new();

/// Error returned when a scheduler is installed twice.
#[derive(Debug, PartialEq, Eq)]
pub struct AlreadyInstalled;

impl core::fmt::Display for AlreadyInstalled {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "a scheduler is already installed")
    }
}

/// Set the scheduler of the kernel.
///
/// The scheduler can be installed only once.
pub fn set_scheduler(sched: &'static dyn Scheduler) -> Result<(), AlreadyInstalled> {
    let mut installed = false;
    SCHEDULER.call_once(|| {
        installed = true;
        sched
    });
    if installed {
        Ok(())
    } else {
        Err(AlreadyInstalled)
    }
}

/// Get the reference of the kernel scheduler.
///
/// Without an installed scheduler, the host uniprocessor is used when the
/// `std` feature is on.
pub fn scheduler() -> &'static dyn Scheduler {
    match SCHEDULER.get() {
        Some(sched) => *sched,
        None => fallback(),
    }
}

#[cfg(feature = "std")]
fn fallback() -> &'static dyn Scheduler {
    &crate::uniproc::HOST
}

#[cfg(not(feature = "std"))]
fn fallback() -> &'static dyn Scheduler {
    panic!("No scheduler is installed.")
}

impl dyn Scheduler {
    /// Run `f` on the synchronization record of `tid` and return its result.
    pub fn with_thread<R>(&self, tid: Tid, f: impl FnOnce(&mut ThreadSync) -> R) -> R {
        let mut f = Some(f);
        let mut out = None;
        self.with_sync(tid, &mut |th| {
            if let Some(f) = f.take() {
                out = Some(f(th));
            }
        });
        match out {
            Some(out) => out,
            None => panic!("Scheduler did not visit thread {tid}."),
        }
    }

    /// Effective priority of `tid`.
    pub fn priority(&self, tid: Tid) -> Priority {
        self.with_thread(tid, |th| th.priority)
    }
}
