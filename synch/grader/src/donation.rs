use crate::Events;
use keos_synch::{
    Lock, PRI_DEFAULT, Semaphore,
    sync::lock::MAX_DONATION_DEPTH,
    thread::{Current, get_priority_by_tid},
    uniproc::{JoinHandle, ThreadBuilder},
};
use std::sync::Arc;

/// A waiter lends its priority to the owner until the owner releases.
pub fn basic() {
    let lock = Arc::new(Lock::new());
    let events = Arc::new(Events::new());
    lock.acquire();

    let waiter = {
        let (lock, events) = (lock.clone(), events.clone());
        ThreadBuilder::new("waiter").priority(40).spawn(move || {
            lock.acquire();
            events.record("waiter");
            lock.release();
        })
    };
    assert_eq!(Current::priority(), 40);
    assert_eq!(Current::base_priority(), Some(PRI_DEFAULT));

    lock.release();
    events.record("main");
    assert_eq!(Current::priority(), PRI_DEFAULT);
    assert_eq!(Current::base_priority(), None);
    waiter.join();
    assert_eq!(events.take(), ["waiter", "main"]);
}

/// Releasing one lock keeps the donation that another held lock still
/// justifies.
pub fn multiple_locks() {
    let (a, b) = (Arc::new(Lock::new()), Arc::new(Lock::new()));
    let events = Arc::new(Events::new());
    a.acquire();
    b.acquire();

    let on_a = {
        let (a, events) = (a.clone(), events.clone());
        ThreadBuilder::new("on_a").priority(40).spawn(move || {
            a.acquire();
            events.record("on_a");
            a.release();
        })
    };
    assert_eq!(Current::priority(), 40);

    let on_b = {
        let (b, events) = (b.clone(), events.clone());
        ThreadBuilder::new("on_b").priority(50).spawn(move || {
            b.acquire();
            events.record("on_b");
            b.release();
        })
    };
    assert_eq!(Current::priority(), 50);

    b.release();
    assert_eq!(events.take(), ["on_b"]);
    assert_eq!(Current::priority(), 40);
    assert_eq!(Current::base_priority(), Some(PRI_DEFAULT));

    a.release();
    assert_eq!(events.take(), ["on_a"]);
    assert_eq!(Current::priority(), PRI_DEFAULT);
    assert_eq!(Current::base_priority(), None);

    on_a.join();
    on_b.join();
}

/// Three waiters arrive in increasing priority. The owner is raised at every
/// arrival, and the lock goes to the highest waiter first.
pub fn three_ascending_waiters() {
    let lock = Arc::new(Lock::new());
    let events = Arc::new(Events::new());
    lock.acquire();

    let handles = [32, 33, 34].map(|priority| {
        let (lock, events) = (lock.clone(), events.clone());
        let handle = ThreadBuilder::new(format!("pri_{priority}"))
            .priority(priority)
            .spawn(move || {
                lock.acquire();
                events.record(priority);
                lock.release();
            });
        assert_eq!(Current::priority(), priority);
        handle
    });

    lock.release();
    assert_eq!(events.take(), [34, 33, 32]);
    assert_eq!(Current::priority(), PRI_DEFAULT);
    for handle in handles {
        handle.join();
    }
}

/// A waits for a lock of B, B waits for a lock of main: A's priority reaches
/// both B and main.
pub fn nested() {
    let (outer, inner) = (Arc::new(Lock::new()), Arc::new(Lock::new()));
    let events = Arc::new(Events::new());
    inner.acquire();

    let b = {
        let (outer, inner, events) = (outer.clone(), inner.clone(), events.clone());
        ThreadBuilder::new("b").priority(40).spawn(move || {
            outer.acquire();
            inner.acquire();
            events.record("b");
            inner.release();
            assert_eq!(Current::priority(), 50);
            outer.release();
            assert_eq!(Current::priority(), 40);
        })
    };
    assert_eq!(Current::priority(), 40);

    let a = {
        let (outer, events) = (outer.clone(), events.clone());
        ThreadBuilder::new("a").priority(50).spawn(move || {
            outer.acquire();
            events.record("a");
            outer.release();
        })
    };
    assert_eq!(Current::priority(), 50);
    assert_eq!(get_priority_by_tid(b.tid), 50);

    inner.release();
    assert_eq!(Current::priority(), PRI_DEFAULT);
    assert_eq!(events.take(), ["b", "a"]);
    a.join();
    b.join();
}

/// A donation walks at most [`MAX_DONATION_DEPTH`] owners; the rest of the
/// chain keeps its priority.
pub fn depth_limit() {
    const CHAIN: usize = MAX_DONATION_DEPTH + 1;
    const LOW: u8 = 32;
    const HIGH: u8 = 50;

    let locks: Arc<Vec<Lock>> = Arc::new((0..CHAIN).map(|_| Lock::new()).collect());
    let gate = Arc::new(Semaphore::new(0));
    let mut chain: Vec<JoinHandle> = Vec::new();

    // Link 0 owns lock 0 and sleeps on the gate. Link i owns lock i and
    // waits for lock i - 1.
    chain.push({
        let (locks, gate) = (locks.clone(), gate.clone());
        ThreadBuilder::new("link_0").priority(LOW).spawn(move || {
            locks[0].acquire();
            gate.down();
            locks[0].release();
        })
    });
    for i in 1..CHAIN {
        let locks = locks.clone();
        chain.push(
            ThreadBuilder::new(format!("link_{i}"))
                .priority(LOW)
                .spawn(move || {
                    locks[i].acquire();
                    locks[i - 1].acquire();
                    locks[i - 1].release();
                    locks[i].release();
                }),
        );
    }

    let donor = {
        let locks = locks.clone();
        ThreadBuilder::new("donor").priority(HIGH).spawn(move || {
            locks[CHAIN - 1].acquire();
            locks[CHAIN - 1].release();
        })
    };

    let priorities = chain
        .iter()
        .map(|link| get_priority_by_tid(link.tid))
        .collect::<Vec<_>>();
    let mut expected = vec![HIGH; CHAIN];
    expected[0] = LOW;
    assert_eq!(priorities, expected);

    gate.up();
    for link in chain.iter().skip(1) {
        assert_eq!(get_priority_by_tid(link.tid), LOW);
    }
    donor.join();
    for link in chain {
        link.join();
    }
}

/// A donation to a ready owner moves it ahead in the ready list.
pub fn ready_owner() {
    let lock = Arc::new(Lock::new());
    let go = Arc::new(Semaphore::new(0));
    let events = Arc::new(Events::new());

    let owner = {
        let (lock, go, events) = (lock.clone(), go.clone(), events.clone());
        ThreadBuilder::new("owner").priority(20).spawn(move || {
            lock.acquire();
            go.up();
            events.record("owner");
            lock.release();
        })
    };
    // The owner only runs while we sleep, and it outranks nobody.
    go.down();
    assert_eq!(get_priority_by_tid(owner.tid), 20);

    let donor = {
        let (lock, events) = (lock.clone(), events.clone());
        ThreadBuilder::new("donor").priority(40).spawn(move || {
            lock.acquire();
            events.record("donor");
            lock.release();
        })
    };
    // Without the donation, we would be ahead of the owner.
    assert_eq!(events.take(), ["owner", "donor"]);
    assert_eq!(get_priority_by_tid(owner.tid), 20);
    donor.join();
    owner.join();
}

/// A donation to a thread that is already queued on a lock moves it ahead of
/// the waiters it now outranks.
pub fn requeued_waiter() {
    let (first, second) = (Arc::new(Lock::new()), Arc::new(Lock::new()));
    let events = Arc::new(Events::new());
    second.acquire();

    // b owns `first` and queues on `second` at 36.
    let b = {
        let (first, second, events) = (first.clone(), second.clone(), events.clone());
        ThreadBuilder::new("b").priority(36).spawn(move || {
            first.acquire();
            second.acquire();
            events.record("b");
            second.release();
            first.release();
        })
    };
    // c queues on `second` at 37, ahead of b.
    let c = {
        let (second, events) = (second.clone(), events.clone());
        ThreadBuilder::new("c").priority(37).spawn(move || {
            second.acquire();
            events.record("c");
            second.release();
        })
    };
    assert_eq!(Current::priority(), 37);

    // a waits for `first` and lifts b above c.
    let a = {
        let (first, events) = (first.clone(), events.clone());
        ThreadBuilder::new("a").priority(40).spawn(move || {
            first.acquire();
            events.record("a");
            first.release();
        })
    };
    assert_eq!(get_priority_by_tid(b.tid), 40);
    assert_eq!(get_priority_by_tid(c.tid), 37);
    assert_eq!(Current::priority(), 40);

    second.release();
    assert_eq!(events.take(), ["b", "a", "c"]);
    assert_eq!(Current::priority(), PRI_DEFAULT);
    for handle in [a, b, c] {
        handle.join();
    }
}
