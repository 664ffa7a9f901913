use keos_synch::{
    ConditionVariable, Lock, Semaphore,
    uniproc::{self, Failure, ThreadBuilder},
};
use std::sync::Arc;
use synch_grader::{condition_variable, donation, lock, preemption, semaphore};

macro_rules! grade {
    ($($module:ident::$scenario:ident),* $(,)?) => {
        $(
            #[test]
            fn $scenario() {
                uniproc::run($module::$scenario);
            }
        )*
    };
}

mod sema {
    use super::*;
    grade!(
        semaphore::sema_0,
        semaphore::wake_order,
        semaphore::n_permits,
        semaphore::random_sequences,
        semaphore::self_test,
        semaphore::up_in_interrupt,
    );
}

mod locks {
    use super::*;
    grade!(
        lock::smoke,
        lock::parking,
        lock::try_acquire,
        lock::held_by_current,
        lock::release_hands_over,
        lock::nonblocking_in_interrupt,
    );
}

mod donate {
    use super::*;
    grade!(
        donation::basic,
        donation::multiple_locks,
        donation::three_ascending_waiters,
        donation::nested,
        donation::depth_limit,
        donation::ready_owner,
        donation::requeued_waiter,
    );
}

mod condvar {
    use super::*;
    grade!(
        condition_variable::signal_order,
        condition_variable::broadcast,
        condition_variable::snapshot_priority,
        condition_variable::bounded_buffer,
    );
}

mod preempt {
    use super::*;
    grade!(
        preemption::timer_round_robin,
        preemption::timer_deferred,
        preemption::sleep_with_preemption_off,
    );
}

#[test]
#[should_panic(expected = "Lock::release: lock is not held by the current thread.")]
fn release_without_ownership() {
    uniproc::run(|| {
        let lock = Arc::new(Lock::new());
        lock.acquire();
        let other = {
            let lock = lock.clone();
            ThreadBuilder::new("other").priority(40).spawn(move || lock.release())
        };
        other.join();
    });
}

#[test]
#[should_panic(expected = "Lock::acquire: lock is already held by the current thread.")]
fn reentrant_acquire() {
    uniproc::run(|| {
        let lock = Lock::new();
        lock.acquire();
        lock.acquire();
    });
}

#[test]
#[should_panic(expected = "Semaphore::down: called from a context that cannot sleep.")]
fn down_in_interrupt() {
    uniproc::run(|| {
        let sema = Semaphore::new(1);
        uniproc::interrupt(|| sema.down());
    });
}

#[test]
#[should_panic(expected = "Lock::acquire: called from a context that cannot sleep.")]
fn acquire_in_interrupt() {
    uniproc::run(|| {
        let lock = Lock::new();
        uniproc::interrupt(|| lock.acquire());
    });
}

#[test]
#[should_panic(expected = "ConditionVariable::signal: lock is not held by the current thread.")]
fn signal_without_lock() {
    uniproc::run(|| ConditionVariable::new().signal(&Lock::new()));
}

#[test]
#[should_panic(expected = "ConditionVariable::wait: lock is not held by the current thread.")]
fn wait_without_lock() {
    uniproc::run(|| ConditionVariable::new().wait(&Lock::new()));
}

#[test]
fn deadlock_is_detected() {
    let failure = uniproc::try_run_at(keos_synch::PRI_DEFAULT, || {
        let (a, b) = (Arc::new(Lock::new()), Arc::new(Lock::new()));
        a.acquire();
        let other = {
            let (a, b) = (a.clone(), b.clone());
            ThreadBuilder::new("other").priority(40).spawn(move || {
                b.acquire();
                a.acquire();
            })
        };
        b.acquire();
        other.join();
    });
    match failure {
        Err(Failure::Deadlock(mut blocked)) => {
            blocked.sort();
            assert_eq!(blocked, ["main", "other"]);
        }
        other => panic!("expected a deadlock, got {other:?}"),
    }
}
