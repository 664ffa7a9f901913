//! Grading scenarios for the KeOS synchronization core.
//!
//! Every scenario is a plain `fn()` that runs as the `main` thread of a host
//! uniprocessor at [`PRI_DEFAULT`]. Scenarios order their threads with
//! priorities and blocking, never with busy waiting: on a uniprocessor a
//! spinning thread never lets anybody else run.
//!
//! The scenarios are run by the `synch-grader` binary through
//! [`TestDriver`], and one by one as `#[test]`s in `tests/grade.rs`.
use crossbeam_queue::SegQueue;
use keos_synch::{PRI_DEFAULT, uniproc};
use std::collections::BTreeSet;

pub mod condition_variable;
pub mod donation;
pub mod lock;
pub mod preemption;
pub mod semaphore;

/// The order in which threads reached their checkpoints.
pub struct Events<T> {
    queue: SegQueue<T>,
}

impl<T> Events<T> {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
        }
    }

    /// Record that `event` happened now.
    pub fn record(&self, event: T) {
        self.queue.push(event);
    }

    /// Take every event recorded so far, oldest first.
    pub fn take(&self) -> Vec<T> {
        core::iter::from_fn(|| self.queue.pop()).collect()
    }
}

impl<T> Default for Events<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A scenario the [`TestDriver`] can run.
pub trait TestCase
where
    Self: Sync + Send,
{
    /// Full path of the scenario.
    fn name(&'static self) -> &'static str;
    /// Run the scenario on a fresh machine. Returns whether it passed.
    fn run(&'static self) -> bool;
}

impl<T> TestCase for T
where
    T: Fn() + Send + Sync + 'static,
{
    fn name(&'static self) -> &'static str {
        core::any::type_name::<T>()
    }

    fn run(&'static self) -> bool {
        print!("test {} ... ", self.name());
        match uniproc::try_run_at(PRI_DEFAULT, move || self()) {
            Ok(()) => {
                println!("ok");
                true
            }
            Err(failure) => {
                println!("FAILED ({failure})");
                false
            }
        }
    }
}

/// A driver for running tests.
pub struct TestDriver;

impl TestDriver {
    /// Run the given tests whose names, without the crate prefix, are in
    /// `filter`; all of them if `filter` is empty. Returns whether every test
    /// that ran passed.
    pub fn start<const TC: usize>(
        filter: &BTreeSet<String>,
        tests: [&'static dyn TestCase; TC],
    ) -> bool {
        let tests = tests
            .into_iter()
            .filter(|test| {
                let name = test.name();
                let r = name.split("::").next().map(|n| n.len() + 2).unwrap_or(0);
                filter.is_empty() || filter.contains(&name[r.min(name.len())..])
            })
            .collect::<Vec<_>>();
        let (total, mut succ) = (tests.len(), 0);
        println!(
            "Running {} test{}",
            total,
            if total == 1 { "" } else { "s" }
        );

        for test in tests {
            if test.run() {
                succ += 1;
            }
        }
        println!(
            "test result: {}. {} passed; {} failed",
            if total == succ { "ok" } else { "FAILED" },
            succ,
            total - succ
        );
        total == succ
    }
}
