//! Runs the grading scenarios.
//!
//! ```text
//! synch-grader                       # every scenario
//! synch-grader semaphore::sema_0     # only the named ones
//! SYNCH_LOG=debug synch-grader ...   # with log output on stderr
//! ```
use log::{LevelFilter, Log, Metadata, Record};
use std::{collections::BTreeSet, process::ExitCode, str::FromStr};
use synch_grader::{
    TestDriver, condition_variable, donation, lock, preemption, semaphore,
};

struct Console;

impl Log for Console {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:>5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static CONSOLE: Console = Console;

fn main() -> ExitCode {
    let level = std::env::var("SYNCH_LOG")
        .ok()
        .and_then(|v| LevelFilter::from_str(&v).ok())
        .unwrap_or(LevelFilter::Warn);
    if log::set_logger(&CONSOLE).is_ok() {
        log::set_max_level(level);
    }

    let filter = std::env::args().skip(1).collect::<BTreeSet<_>>();
    let passed = TestDriver::start(
        &filter,
        [
            // Semaphore.
            &semaphore::sema_0,
            &semaphore::wake_order,
            &semaphore::n_permits,
            &semaphore::random_sequences,
            &semaphore::self_test,
            &semaphore::up_in_interrupt,
            // Lock.
            &lock::smoke,
            &lock::parking,
            &lock::try_acquire,
            &lock::held_by_current,
            &lock::release_hands_over,
            &lock::nonblocking_in_interrupt,
            // Priority donation.
            &donation::basic,
            &donation::multiple_locks,
            &donation::three_ascending_waiters,
            &donation::nested,
            &donation::depth_limit,
            &donation::ready_owner,
            &donation::requeued_waiter,
            // Condition variable.
            &condition_variable::signal_order,
            &condition_variable::broadcast,
            &condition_variable::snapshot_priority,
            &condition_variable::bounded_buffer,
            // Preemption.
            &preemption::timer_round_robin,
            &preemption::timer_deferred,
            &preemption::sleep_with_preemption_off,
        ],
    );
    if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
