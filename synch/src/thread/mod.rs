//! Thread abstraction, as seen by the synchronization core.
//!
//! Threads are owned by the thread subsystem. The core never holds a thread;
//! it names one by its [`Tid`] and reaches the few fields it maintains, the
//! [`ThreadSync`] record, through the [`Scheduler`].
//!
//! [`Scheduler`]: scheduler::Scheduler
pub mod scheduler;

use crate::{
    interrupt::InterruptGuard,
    sync::{lock::LockInner, semaphore::SemaphoreInner},
};
use alloc::{sync::Arc, vec::Vec};
use scheduler::scheduler;

/// Thread identifier.
pub type Tid = u64;

/// Scheduling priority. Larger is more urgent.
pub type Priority = u8;

/// Lowest priority.
pub const PRI_MIN: Priority = 0;
/// Default priority of a new thread.
pub const PRI_DEFAULT: Priority = 31;
/// Highest priority.
pub const PRI_MAX: Priority = 63;

/// A possible state of the thread.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ThreadState {
    /// Thread is runnable.
    Runnable,
    /// Thread is running.
    Running,
    /// Thread is parked on a wait list.
    Parked,
    /// Thread is exited.
    Exited,
}

/// Per-thread fields maintained by the synchronization core.
///
/// The scheduler stores one of these with each thread and hands it out via
/// [`Scheduler::with_sync`]. Wait lists are ordered by [`priority`], so a
/// scheduler must keep its ready list ordered by it as well.
///
/// [`Scheduler::with_sync`]: scheduler::Scheduler::with_sync
/// [`priority`]: ThreadSync::priority
pub struct ThreadSync {
    /// Effective priority, including any donation.
    pub(crate) priority: Priority,
    /// Priority to return to once every donation is gone. `None` while no
    /// donation is in effect.
    pub(crate) base_priority: Option<Priority>,
    /// The semaphore whose wait list currently holds this thread.
    pub(crate) blocking_on: Option<Arc<SemaphoreInner>>,
    /// The lock this thread is trying to acquire.
    pub(crate) waiting_for_lock: Option<Arc<LockInner>>,
    /// Locks currently owned by this thread.
    pub(crate) locks_held: Vec<Arc<LockInner>>,
}

impl ThreadSync {
    /// Creates the record of a fresh thread running at `priority`.
    pub fn new(priority: Priority) -> Self {
        assert!(
            priority <= PRI_MAX,
            "ThreadSync::new: priority {priority} is above PRI_MAX."
        );
        Self {
            priority,
            base_priority: None,
            blocking_on: None,
            waiting_for_lock: None,
            locks_held: Vec::new(),
        }
    }

    /// Effective priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Priority without donation, if a donation is in effect.
    pub fn base_priority(&self) -> Option<Priority> {
        self.base_priority
    }

    /// Whether the thread sits on some semaphore's wait list.
    pub fn is_waiting(&self) -> bool {
        self.blocking_on.is_some()
    }

    /// Number of locks the thread owns.
    pub fn locks_held(&self) -> usize {
        self.locks_held.len()
    }
}

impl core::fmt::Debug for ThreadSync {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadSync")
            .field("priority", &self.priority)
            .field("base_priority", &self.base_priority)
            .field("waiting", &self.blocking_on.is_some())
            .field("waiting_for_lock", &self.waiting_for_lock.is_some())
            .field("locks_held", &self.locks_held.len())
            .finish()
    }
}

/// The opaque structure indicating the running thread.
pub struct Current {
    _p: (),
}

impl Current {
    /// Get the current thread's id.
    pub fn get_tid() -> Tid {
        scheduler().current()
    }

    /// Get the current thread's effective priority.
    pub fn priority() -> Priority {
        get_priority_by_tid(Self::get_tid())
    }

    /// Get the current thread's priority without donation, if a donation is in
    /// effect.
    pub fn base_priority() -> Option<Priority> {
        let _guard = InterruptGuard::new();
        let sched = scheduler();
        sched.with_thread(sched.current(), |t| t.base_priority)
    }
}

/// Get specified thread's [`ThreadState`] by TID (Thread ID).
pub fn get_state_by_tid(tid: Tid) -> ThreadState {
    let _guard = InterruptGuard::new();
    scheduler().state(tid)
}

/// Get specified thread's effective priority by TID (Thread ID).
pub fn get_priority_by_tid(tid: Tid) -> Priority {
    let _guard = InterruptGuard::new();
    scheduler().priority(tid)
}
