//! # Host uniprocessor.
//!
//! A [`Scheduler`] that runs KeOS threads as OS threads of the host, one at a
//! time. It gives the synchronization primitives the machine they are
//! written for (a single CPU, strict priority scheduling, interrupts that
//! can be held off) without booting a kernel.
//!
//! [`run`] boots a fresh machine whose first thread, `main`, runs the given
//! closure, and returns once every thread of the machine has exited. Threads
//! are created with [`ThreadBuilder`]. The ready list is a
//! [`PriorityList`]: the running thread is always one of the highest
//! priority, and it keeps the CPU until it sleeps, exits, is outranked, or
//! receives a [`timer_tick`].
//!
//! Machines are independent, so tests may run them in parallel. Calling the
//! kernel thread API outside of a machine panics.
//!
//! ```ignore
//! uniproc::run(|| {
//!     let sema = Arc::new(Semaphore::new(0));
//!     let waker = {
//!         let sema = sema.clone();
//!         ThreadBuilder::new("waker").spawn(move || sema.up())
//!     };
//!     sema.down();
//!     waker.join();
//! });
//! ```
//!
//! [`Scheduler`]: crate::thread::scheduler::Scheduler
//! [`PriorityList`]: crate::sync::priority::PriorityList
mod machine;
mod thread;

pub(crate) use machine::HOST;
pub use thread::{JoinHandle, ThreadBuilder};

use crate::{
    sync::Semaphore,
    thread::{PRI_DEFAULT, Priority},
};
use alloc::{boxed::Box, string::String, sync::Arc, vec::Vec};
use core::any::Any;
use machine::{Context, Machine, with_context};

/// Why a machine stopped before all of its threads exited.
pub enum Failure {
    /// No thread could run while the named threads were asleep.
    Deadlock(Vec<String>),
    /// A thread panicked. Holds the panic payload.
    Panic(Box<dyn Any + Send + 'static>),
}

impl Failure {
    /// The panic message, if this is a panic with a textual payload.
    pub fn message(&self) -> Option<&str> {
        match self {
            Failure::Panic(payload) => payload
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str)),
            Failure::Deadlock(_) => None,
        }
    }
}

impl core::fmt::Debug for Failure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Failure::Deadlock(blocked) => f.debug_tuple("Deadlock").field(blocked).finish(),
            Failure::Panic(_) => f.debug_tuple("Panic").field(&self.message()).finish(),
        }
    }
}

impl core::fmt::Display for Failure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Failure::Deadlock(blocked) => {
                write!(f, "deadlock: no runnable thread, blocked: {blocked:?}")
            }
            Failure::Panic(_) => match self.message() {
                Some(msg) => write!(f, "thread panicked: {msg}"),
                None => write!(f, "thread panicked"),
            },
        }
    }
}

impl std::error::Error for Failure {}

/// Run `f` as the `main` thread of a fresh machine, at [`PRI_DEFAULT`].
///
/// Returns when every thread has exited. A panic of any thread is resumed on
/// the caller; a deadlock panics.
pub fn run<F: FnOnce() + Send + 'static>(f: F) {
    run_at(PRI_DEFAULT, f)
}

/// Like [`run`], with `main` at `priority`.
pub fn run_at<F: FnOnce() + Send + 'static>(priority: Priority, f: F) {
    match try_run_at(priority, f) {
        Ok(()) => (),
        Err(Failure::Panic(payload)) => std::panic::resume_unwind(payload),
        Err(deadlock) => panic!("{deadlock}"),
    }
}

/// Like [`run_at`], returning the reason the machine stopped instead of
/// panicking.
///
/// On failure, threads that had not exited stay asleep forever: their OS
/// threads are not reclaimed until the process ends. Exited threads keep
/// their table entry for the life of the machine, so a lock owner that
/// exited is still seen as exited.
pub fn try_run_at<F: FnOnce() + Send + 'static>(priority: Priority, f: F) -> Result<(), Failure> {
    let machine = Machine::new();
    ThreadBuilder::new("main")
        .priority(priority)
        .launch(&machine, f);
    machine.boot();
    machine.wait_outcome()
}

/// Run `f` as an interrupt handler on the current thread.
///
/// The handler runs with preemption off and may not sleep. A yield it asks
/// for, such as waking a thread that outranks the interrupted one, happens
/// when the handler returns.
pub fn interrupt<R>(f: impl FnOnce() -> R) -> R {
    let saved = with_context(Context::enter_interrupt);
    let out = f();
    with_context(|ctx| ctx.leave_interrupt(saved));
    out
}

/// Deliver a timer interrupt to the current thread.
///
/// The thread yields if a ready thread has the same or a higher priority.
/// While preemption is off, the yield waits until it is turned back on.
pub fn timer_tick() {
    with_context(Context::tick)
}

/// Ping-pong between two threads over a pair of semaphores.
///
/// Must be called from a thread of a machine.
pub fn sema_self_test() {
    log::info!("Testing semaphores...");
    let pair = Arc::new([Semaphore::new(0), Semaphore::new(0)]);
    let partner = {
        let pair = pair.clone();
        ThreadBuilder::new("sema-test").spawn(move || {
            for _ in 0..10 {
                pair[0].down();
                pair[1].up();
            }
        })
    };
    for _ in 0..10 {
        pair[0].up();
        pair[1].down();
    }
    partner.join();
    log::info!("Testing semaphores...done.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        interrupt::InterruptGuard,
        thread::{Current, ThreadState, get_state_by_tid},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn higher_priority_spawn_runs_first() {
        run(|| {
            let order = Arc::new(AtomicUsize::new(0));
            let child = {
                let order = order.clone();
                ThreadBuilder::new("child")
                    .priority(40)
                    .spawn(move || assert_eq!(order.fetch_add(1, Ordering::SeqCst), 0))
            };
            assert_eq!(order.fetch_add(1, Ordering::SeqCst), 1);
            assert_eq!(get_state_by_tid(child.tid), ThreadState::Exited);
            child.join();
        });
    }

    #[test]
    fn timer_rotates_equal_priorities() {
        run(|| {
            let ran = Arc::new(AtomicUsize::new(0));
            let peer = {
                let ran = ran.clone();
                ThreadBuilder::new("peer").spawn(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
            };
            assert_eq!(ran.load(Ordering::SeqCst), 0);
            {
                let _guard = InterruptGuard::new();
                timer_tick();
                assert_eq!(ran.load(Ordering::SeqCst), 0);
            }
            assert_eq!(ran.load(Ordering::SeqCst), 1);
            peer.join();
        });
    }

    #[test]
    fn interrupt_is_restricted() {
        run(|| {
            let sched = crate::thread::scheduler::scheduler();
            let sema = Semaphore::new(0);
            assert!(!sched.in_restricted_context());
            assert!(interrupt(|| sched.in_restricted_context()));
            interrupt(|| {
                assert!(!sema.try_down());
                sema.up();
            });
            sema.down();
            assert_eq!(Current::priority(), PRI_DEFAULT);
        });
    }

    #[test]
    fn deadlock_is_reported() {
        let failure = try_run_at(PRI_DEFAULT, || Semaphore::new(0).down());
        match failure {
            Err(Failure::Deadlock(blocked)) => assert_eq!(blocked, ["main"]),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn panic_is_reported() {
        let failure = try_run_at(PRI_DEFAULT, || panic!("boom"));
        match failure {
            Err(failure) => assert_eq!(failure.message(), Some("boom")),
            Ok(()) => panic!("panic was not reported"),
        }
    }

    #[test]
    fn self_test_completes() {
        run(sema_self_test);
    }
}
