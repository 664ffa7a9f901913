use crate::Events;
use keos_synch::{
    ConditionVariable, Lock, Mutex,
    thread::get_priority_by_tid,
    uniproc::{JoinHandle, ThreadBuilder},
};
use std::sync::Arc;

struct Monitor {
    lock: Lock,
    cond: ConditionVariable,
}

const WAITERS: [(&str, u8); 4] = [("a", 40), ("b", 60), ("c", 50), ("d", 60)];

fn spawn_waiters(monitor: &Arc<Monitor>, events: &Arc<Events<&'static str>>) -> Vec<JoinHandle> {
    WAITERS
        .iter()
        .map(|&(name, priority)| {
            let (monitor, events) = (monitor.clone(), events.clone());
            ThreadBuilder::new(name)
                .priority(priority)
                .spawn(move || {
                    monitor.lock.acquire();
                    monitor.cond.wait(&monitor.lock);
                    assert!(monitor.lock.held_by_current());
                    events.record(name);
                    monitor.lock.release();
                })
        })
        .collect()
}

/// `signal` wakes one waiter at a time, the highest first.
pub fn signal_order() {
    let monitor = Arc::new(Monitor {
        lock: Lock::new(),
        cond: ConditionVariable::new(),
    });
    let events = Arc::new(Events::new());
    let handles = spawn_waiters(&monitor, &events);
    assert_eq!(monitor.cond.waiters(), WAITERS.len());

    let mut woken = Vec::new();
    for left in (0..WAITERS.len()).rev() {
        monitor.lock.acquire();
        monitor.cond.signal(&monitor.lock);
        assert_eq!(monitor.cond.waiters(), left);
        monitor.lock.release();
        woken.extend(events.take());
        assert_eq!(woken.len(), WAITERS.len() - left);
    }
    assert_eq!(woken, ["b", "d", "c", "a"]);
    for handle in handles {
        handle.join();
    }
}

/// `broadcast` empties the waiters; every waiter holds the lock again when
/// its `wait` returns.
pub fn broadcast() {
    let monitor = Arc::new(Monitor {
        lock: Lock::new(),
        cond: ConditionVariable::new(),
    });
    let events = Arc::new(Events::new());
    let handles = spawn_waiters(&monitor, &events);

    monitor.lock.acquire();
    monitor.cond.broadcast(&monitor.lock);
    assert_eq!(monitor.cond.waiters(), 0);
    // Nobody gets past `wait` while we hold the lock.
    assert!(events.take().is_empty());
    monitor.lock.release();

    assert_eq!(events.take(), ["b", "d", "c", "a"]);
    for handle in handles {
        handle.join();
    }
}

/// Waiters keep the place their priority gave them when they started
/// waiting, even if a donation raises them while they sleep.
pub fn snapshot_priority() {
    let monitor = Arc::new(Monitor {
        lock: Lock::new(),
        cond: ConditionVariable::new(),
    });
    let held = Arc::new(Lock::new());
    let events = Arc::new(Events::new());

    // a waits at 40 while holding `held`; b waits at 45.
    let a = {
        let (monitor, held, events) = (monitor.clone(), held.clone(), events.clone());
        ThreadBuilder::new("a").priority(40).spawn(move || {
            held.acquire();
            monitor.lock.acquire();
            monitor.cond.wait(&monitor.lock);
            events.record("a");
            monitor.lock.release();
            held.release();
        })
    };
    let b = {
        let (monitor, events) = (monitor.clone(), events.clone());
        ThreadBuilder::new("b").priority(45).spawn(move || {
            monitor.lock.acquire();
            monitor.cond.wait(&monitor.lock);
            events.record("b");
            monitor.lock.release();
        })
    };
    // The donor lifts a to 50 while a sleeps in `wait`.
    let donor = {
        let (held, events) = (held.clone(), events.clone());
        ThreadBuilder::new("donor").priority(50).spawn(move || {
            held.acquire();
            events.record("donor");
            held.release();
        })
    };
    assert_eq!(get_priority_by_tid(a.tid), 50);
    assert_eq!(monitor.cond.waiters(), 2);

    monitor.lock.acquire();
    monitor.cond.signal(&monitor.lock);
    monitor.lock.release();
    assert_eq!(events.take(), ["b"]);

    monitor.lock.acquire();
    monitor.cond.signal(&monitor.lock);
    monitor.lock.release();
    assert_eq!(events.take(), ["a", "donor"]);

    for handle in [a, b, donor] {
        handle.join();
    }
}

const MAX: usize = 2;
struct BufferInner {
    item: [usize; MAX],
    front: usize,
    tail: usize,
}
impl BufferInner {
    fn is_full(&self) -> bool {
        self.tail.overflowing_sub(self.front).0 % MAX == MAX - 1
    }
    fn is_empty(&self) -> bool {
        self.front == self.tail
    }
}
struct Buffer {
    inner: Mutex<BufferInner>,
    full: ConditionVariable,
    empty: ConditionVariable,
}

impl Buffer {
    fn put(&self, val: usize) {
        let mut guard = self.full.wait_while(&self.inner, |b| b.is_full());
        let tail = (guard.tail + 1) % MAX;
        guard.tail = tail;
        guard.item[tail] = val;
        self.empty.signal(guard.raw());
        guard.unlock();
    }

    fn get(&self) -> usize {
        let mut guard = self.empty.wait_while(&self.inner, |b| b.is_empty());
        let front = (guard.front + 1) % MAX;
        let item = guard.item[front];
        guard.front = front;
        self.full.signal(guard.raw());
        guard.unlock();
        item
    }
}

/// Producer and consumers meet over a one-slot buffer.
pub fn bounded_buffer() {
    const ITEMS: usize = 6;
    let buffer = Arc::new(Buffer {
        inner: Mutex::new(BufferInner {
            item: [0; MAX],
            front: 0,
            tail: 0,
        }),
        full: ConditionVariable::new(),
        empty: ConditionVariable::new(),
    });
    let output = Arc::new(Mutex::new(Vec::new()));

    let consumers = [0; ITEMS].map(|_| {
        let (buffer, output) = (buffer.clone(), output.clone());
        ThreadBuilder::new("consumer").spawn(move || {
            let d = buffer.get();
            let mut guard = output.lock();
            guard.push(d);
            guard.unlock();
        })
    });
    let producer = {
        let buffer = buffer.clone();
        ThreadBuilder::new("producer").spawn(move || {
            for i in 0..ITEMS {
                buffer.put(i);
            }
        })
    };

    for consumer in consumers {
        consumer.join();
    }
    producer.join();

    let mut output = output.lock();
    output.sort();
    assert_eq!(&*output, &(0..ITEMS).collect::<Vec<_>>());
    output.unlock();
}
