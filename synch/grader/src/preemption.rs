use crate::Events;
use keos_synch::{
    Semaphore,
    interrupt::{InterruptGuard, InterruptState},
    uniproc::{ThreadBuilder, timer_tick},
};
use std::sync::Arc;

/// The timer rotates threads of equal priority, and never hands the CPU to a
/// lower one.
pub fn timer_round_robin() {
    let events = Arc::new(Events::new());
    let (peer, low) = {
        let (e1, e2) = (events.clone(), events.clone());
        (
            ThreadBuilder::new("peer").spawn(move || e1.record("peer")),
            ThreadBuilder::new("low")
                .priority(10)
                .spawn(move || e2.record("low")),
        )
    };
    assert!(events.take().is_empty());

    timer_tick();
    assert_eq!(events.take(), ["peer"]);
    timer_tick();
    assert!(events.take().is_empty());

    peer.join();
    low.join();
    assert_eq!(events.take(), ["low"]);
}

/// A tick that arrives while preemption is off takes effect when it is
/// turned back on.
pub fn timer_deferred() {
    let events = Arc::new(Events::new());
    let peer = {
        let events = events.clone();
        ThreadBuilder::new("peer").spawn(move || events.record("peer"))
    };

    {
        let _guard = InterruptGuard::new();
        timer_tick();
        events.record("guarded");
    }
    events.record("main");
    peer.join();
    assert_eq!(events.take(), ["guarded", "peer", "main"]);
}

/// A down inside a region with preemption off still lets other threads run
/// while the caller sleeps.
pub fn sleep_with_preemption_off() {
    let sema = Arc::new(Semaphore::new(0));
    let waker = {
        let sema = sema.clone();
        ThreadBuilder::new("waker").spawn(move || sema.up())
    };
    {
        let guard = InterruptGuard::new();
        sema.down();
        assert_eq!(guard.saved_state(), InterruptState::On);
    }
    waker.join();
}
