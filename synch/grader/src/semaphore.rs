use crate::Events;
use keos_synch::{
    Semaphore, ThreadState,
    thread::{Current, get_state_by_tid},
    uniproc::{self, ThreadBuilder},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::sync::Arc;

/// X downs a zero semaphore and sleeps; the up of Y makes it runnable, and
/// once it runs the count is zero again.
pub fn sema_0() {
    let sema = Arc::new(Semaphore::new(0));
    let events = Arc::new(Events::new());

    let x = {
        let (sema, events) = (sema.clone(), events.clone());
        ThreadBuilder::new("x").priority(40).spawn(move || {
            events.record("x sleeps");
            sema.down();
            assert_eq!(sema.value(), 0, "the permit of `up` was not consumed");
            events.record("x woken");
        })
    };

    assert_eq!(get_state_by_tid(x.tid), ThreadState::Parked);
    assert_eq!(sema.waiters(), 1);
    events.record("y ups");
    sema.up();
    x.join();

    assert_eq!(events.take(), ["x sleeps", "y ups", "x woken"]);
}

/// Waiters leave by priority, highest first, FIFO among equal priorities.
pub fn wake_order() {
    const WAITERS: [(&str, u8); 6] = [
        ("a", 40),
        ("b", 60),
        ("c", 50),
        ("d", 60),
        ("e", 50),
        ("f", 40),
    ];
    let sema = Arc::new(Semaphore::new(0));
    let events = Arc::new(Events::new());

    let handles = WAITERS.map(|(name, priority)| {
        let (sema, events) = (sema.clone(), events.clone());
        ThreadBuilder::new(name)
            .priority(priority)
            .spawn(move || {
                sema.down();
                events.record(name);
            })
    });
    assert_eq!(sema.waiters(), WAITERS.len());

    for _ in WAITERS {
        sema.up();
    }
    for handle in handles {
        handle.join();
    }
    assert_eq!(events.take(), ["b", "d", "c", "e", "a", "f"]);
    assert_eq!(sema.value(), 0);
}

/// A semaphore initialized with several permits lets exactly that many
/// threads through.
pub fn n_permits() {
    const COUNT: usize = 5;
    const PERMITS: usize = 3;

    let sema = Arc::new(Semaphore::new(PERMITS));
    let events = Arc::new(Events::new());
    let handles = (0..COUNT)
        .map(|i| {
            let (sema, events) = (sema.clone(), events.clone());
            ThreadBuilder::new(format!("support_{i}"))
                .priority(40)
                .spawn(move || {
                    sema.down();
                    events.record(i);
                })
        })
        .collect::<Vec<_>>();

    assert_eq!(events.take(), [0, 1, 2]);
    assert_eq!(sema.value(), 0);
    assert_eq!(sema.waiters(), COUNT - PERMITS);

    for _ in PERMITS..COUNT {
        sema.up();
    }
    assert_eq!(events.take(), [3, 4]);
    for handle in handles {
        handle.join();
    }
}

/// Random mixes of `down`, `try_down` and `up` never drive the count below
/// zero, and a `down` only returns with a permit.
pub fn random_sequences() {
    const ROUNDS: usize = 8;
    const STEPS: usize = 48;

    let mut rng = StdRng::seed_from_u64(0x6b65_6f73);
    for _ in 0..ROUNDS {
        let initial = rng.gen_range(0..4);
        let sema = Arc::new(Semaphore::new(initial));
        let passed = Arc::new(Events::new());
        let (mut available, mut blocked) = (initial, 0);
        let (mut through, mut seen) = (0, 0);
        let mut handles = Vec::new();

        for _ in 0..STEPS {
            match rng.gen_range(0..3) {
                // A fresh thread outranks us and runs its `down` at once.
                0 => {
                    let (sema, passed) = (sema.clone(), passed.clone());
                    handles.push(ThreadBuilder::new("downer").priority(40).spawn(move || {
                        sema.down();
                        passed.record(());
                    }));
                    if available > 0 {
                        available -= 1;
                        through += 1;
                    } else {
                        blocked += 1;
                    }
                }
                1 => {
                    assert_eq!(sema.try_down(), available > 0);
                    available = available.saturating_sub(1);
                }
                _ => {
                    sema.up();
                    if blocked > 0 {
                        blocked -= 1;
                        through += 1;
                    } else {
                        available += 1;
                    }
                }
            }
            assert_eq!(sema.value(), available);
            assert_eq!(sema.waiters(), blocked);
            seen += passed.take().len();
            assert_eq!(seen, through);
        }

        for _ in 0..blocked {
            sema.up();
        }
        for handle in handles {
            handle.join();
        }
        assert_eq!(sema.waiters(), 0);
    }
}

/// Two threads alternate ten times over a pair of semaphores.
pub fn self_test() {
    uniproc::sema_self_test();
    assert_eq!(Current::base_priority(), None);
}

/// An interrupt handler may `try_down` and `up` but the thread it wakes only
/// runs after the handler returns.
pub fn up_in_interrupt() {
    let sema = Arc::new(Semaphore::new(0));
    let events = Arc::new(Events::new());

    let waiter = {
        let (sema, events) = (sema.clone(), events.clone());
        ThreadBuilder::new("waiter").priority(40).spawn(move || {
            sema.down();
            events.record("waiter");
        })
    };

    uniproc::interrupt(|| {
        assert!(!sema.try_down());
        sema.up();
        events.record("handler");
    });
    events.record("main");
    waiter.join();

    assert_eq!(events.take(), ["handler", "waiter", "main"]);
}
