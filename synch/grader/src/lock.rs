use crate::Events;
use keos_synch::{
    ConditionVariable, Lock, Mutex, PRI_DEFAULT, ThreadState, WouldBlock,
    thread::{Current, get_state_by_tid},
    uniproc::{ThreadBuilder, interrupt, timer_tick},
};
use std::sync::Arc;

/// Threads of equal priority take turns on a mutex without losing updates.
pub fn smoke() {
    const LENGTH: usize = 16;
    let output = Arc::new(Mutex::new(Vec::new()));

    let handles = (0..LENGTH)
        .map(|i| {
            let output = output.clone();
            ThreadBuilder::new("smoker").spawn(move || {
                let mut d = output.lock();
                // Give everybody else a chance to run into the held mutex.
                timer_tick();
                d.push(i);
                d.unlock();
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join();
    }

    let mut output = output.lock();
    output.sort();
    assert_eq!(&*output, &(0..LENGTH).collect::<Vec<_>>());
    output.unlock();
}

/// A thread that finds the mutex taken sleeps until it is unlocked.
pub fn parking() {
    let mutex = Arc::new(Mutex::new(()));
    let guard = mutex.lock();

    let be_parked = {
        let mutex = mutex.clone();
        ThreadBuilder::new("blockee").priority(40).spawn(move || {
            let guard = mutex.lock();
            guard.unlock();
        })
    };

    assert_eq!(
        get_state_by_tid(be_parked.tid),
        ThreadState::Parked,
        "Blocked thread by Mutex should be in Parked state"
    );

    guard.unlock();
    assert_eq!(get_state_by_tid(be_parked.tid), ThreadState::Exited);
    be_parked.join();
}

/// `try_acquire` succeeds only on a free lock and never waits.
pub fn try_acquire() {
    let lock = Arc::new(Lock::new());
    let events = Arc::new(Events::new());
    lock.acquire();

    let contender = {
        let (lock, events) = (lock.clone(), events.clone());
        ThreadBuilder::new("contender").priority(40).spawn(move || {
            events.record(lock.try_acquire());
        })
    };
    contender.join();
    lock.release();

    let contender = {
        let (lock, events) = (lock.clone(), events.clone());
        ThreadBuilder::new("contender").priority(40).spawn(move || {
            let acquired = lock.try_acquire();
            if acquired {
                lock.release();
            }
            events.record(acquired);
        })
    };
    contender.join();
    assert_eq!(events.take(), [false, true]);

    let mutex = Arc::new(Mutex::new(0));
    let guard = mutex.lock();
    let contender = {
        let mutex = mutex.clone();
        ThreadBuilder::new("contender").priority(40).spawn(move || {
            assert!(matches!(mutex.try_lock(), Err(WouldBlock)));
        })
    };
    contender.join();
    guard.unlock();
    assert!(mutex.try_lock().is_ok());
}

/// Ownership is per thread: only the owner sees the lock as held.
pub fn held_by_current() {
    let lock = Arc::new(Lock::new());
    lock.acquire();
    assert!(lock.held_by_current());

    let other = {
        let lock = lock.clone();
        ThreadBuilder::new("other")
            .priority(40)
            .spawn(move || assert!(!lock.held_by_current()))
    };
    other.join();
    lock.release();
    assert!(!lock.held_by_current());
}

/// Releasing hands the lock straight to the waiter that donated to us: a
/// thread ranked between the two does not get the CPU first.
pub fn release_hands_over() {
    let lock = Arc::new(Lock::new());
    let events = Arc::new(Events::new());
    lock.acquire();

    let waiter = {
        let (lock, events) = (lock.clone(), events.clone());
        ThreadBuilder::new("waiter").priority(50).spawn(move || {
            lock.acquire();
            events.record("waiter");
            lock.release();
        })
    };
    // Below our donated priority, so it only waits in the ready list.
    let bystander = {
        let events = events.clone();
        ThreadBuilder::new("bystander")
            .priority(40)
            .spawn(move || events.record("bystander"))
    };
    assert_eq!(Current::priority(), 50);
    assert!(events.take().is_empty());

    lock.release();
    timer_tick();
    assert_eq!(events.take(), ["waiter", "bystander"]);
    assert_eq!(Current::priority(), PRI_DEFAULT);
    assert!(lock.try_acquire());
    lock.release();
    waiter.join();
    bystander.join();
}

/// An interrupt handler may try a lock and signal a condition variable; the
/// woken waiter runs once we block.
pub fn nonblocking_in_interrupt() {
    let (lock, spare) = (Arc::new(Lock::new()), Lock::new());
    let cond = Arc::new(ConditionVariable::new());
    let events = Arc::new(Events::new());

    let waiter = {
        let (lock, cond, events) = (lock.clone(), cond.clone(), events.clone());
        ThreadBuilder::new("waiter").spawn(move || {
            lock.acquire();
            cond.wait(&lock);
            events.record("waiter");
            lock.release();
        })
    };
    // Equal priority: the waiter gets to `wait` on the next tick.
    timer_tick();
    assert_eq!(cond.waiters(), 1);

    lock.acquire();
    interrupt(|| {
        assert!(spare.try_acquire());
        cond.signal(&lock);
        cond.broadcast(&lock);
    });
    assert_eq!(cond.waiters(), 0);
    assert!(spare.held_by_current());
    assert!(events.take().is_empty());
    spare.release();
    lock.release();

    waiter.join();
    assert_eq!(events.take(), ["waiter"]);
}
