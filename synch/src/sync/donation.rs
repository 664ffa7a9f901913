//! # Priority donation.
//!
//! A thread that waits for a lock can do nothing until the owner releases
//! it. If the owner has a lower priority, threads of medium priority would
//! run ahead of the owner, and so ahead of the waiter: a *priority
//! inversion*. KeOS prevents this by letting the waiter lend its priority to
//! the owner for as long as it waits.
//!
//! Donation is **nested**. If the owner is itself asleep waiting for another
//! lock, the priority is passed on to that lock's owner, and so on, for at
//! most [`MAX_DONATION_DEPTH`] owners.
//!
//! A thread remembers the priority it had before its first donation as its
//! base priority. When it releases a lock, [`recompute`] lowers it again to
//! the highest priority still waiting on one of the locks it keeps, or to
//! the base priority if no waiter of those locks outranks it.
use super::{
    lock::{LockInner, MAX_DONATION_DEPTH},
    priority::outranks,
};
use crate::{
    interrupt::InterruptGuard,
    thread::{ThreadState, Tid, scheduler::scheduler},
};
use alloc::sync::Arc;

/// Lend the priority of `donor` along the chain of owners behind `lock`.
pub(crate) fn donate(guard: &InterruptGuard, donor: Tid, lock: &Arc<LockInner>) {
    let sched = scheduler();
    let priority = sched.priority(donor);
    let mut lock = lock.clone();

    for depth in 0..MAX_DONATION_DEPTH {
        let Some(holder) = lock.holder(guard) else {
            return;
        };
        let raised = sched.with_thread(holder, |th| {
            if th.priority >= priority {
                return false;
            }
            if th.base_priority.is_none() {
                th.base_priority = Some(th.priority);
            }
            th.priority = priority;
            true
        });
        if !raised {
            return;
        }
        log::trace!("donation: thread {donor} lends {priority} to thread {holder} (depth {depth})");

        match sched.state(holder) {
            ThreadState::Running | ThreadState::Runnable => {
                sched.reorder_ready(holder);
                sched.maybe_preempt();
                return;
            }
            ThreadState::Parked => {
                let (blocking_on, next) = sched.with_thread(holder, |th| {
                    (th.blocking_on.clone(), th.waiting_for_lock.clone())
                });
                if let Some(sema) = blocking_on {
                    sema.reposition(guard, holder);
                }
                match next {
                    Some(next) => lock = next,
                    None => return,
                }
            }
            ThreadState::Exited => return,
        }
    }
    log::debug!(
        "donation: chain from thread {donor} cut off after {MAX_DONATION_DEPTH} owners"
    );
}

/// Take back the donations that no longer apply to `tid`.
pub(crate) fn recompute(guard: &InterruptGuard, tid: Tid) {
    let sched = scheduler();
    let (base, held) = sched.with_thread(tid, |th| (th.base_priority, th.locks_held.clone()));
    let Some(base) = base else {
        return;
    };

    let donated = held
        .iter()
        .filter_map(|lock| lock.max_waiter_priority(guard))
        .max();
    let (priority, base) = match donated {
        Some(donated) if outranks(donated, base) => (donated, Some(base)),
        _ => (base, None),
    };
    log::trace!("donation: thread {tid} returns to priority {priority}");
    sched.with_thread(tid, |th| {
        th.priority = priority;
        th.base_priority = base;
    });
}
