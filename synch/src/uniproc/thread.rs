//! Spawning and joining kernel threads on the host uniprocessor.
use super::machine::{HOST, Machine, run_thread, with_context};
use crate::{
    sync::Semaphore,
    thread::{PRI_DEFAULT, PRI_MAX, Priority, Tid, scheduler::Scheduler},
};
use alloc::{string::String, sync::Arc};
use crossbeam_utils::sync::Parker;

/// A handle to join thread.
pub struct JoinHandle {
    /// Thread id of this handle.
    pub tid: Tid,
    exited: Arc<Semaphore>,
}

impl JoinHandle {
    /// Sleep until the thread has finished.
    pub fn join(self) {
        self.exited.down();
    }
}

/// A struct to build a new thread.
pub struct ThreadBuilder {
    name: String,
    priority: Priority,
}

impl ThreadBuilder {
    /// Create a new thread builder for thread `name`, at [`PRI_DEFAULT`].
    pub fn new<I>(name: I) -> Self
    where
        String: From<I>,
    {
        Self {
            name: String::from(name),
            priority: PRI_DEFAULT,
        }
    }

    /// Set the priority the thread starts with.
    pub fn priority(mut self, priority: Priority) -> Self {
        assert!(
            priority <= PRI_MAX,
            "ThreadBuilder::priority: priority {priority} is above PRI_MAX."
        );
        self.priority = priority;
        self
    }

    /// Spawn the thread on the machine of the caller.
    ///
    /// If the new thread outranks the caller, it runs before this returns.
    pub fn spawn<F: FnOnce() + Send + 'static>(self, thread_fn: F) -> JoinHandle {
        let machine = with_context(|ctx| ctx.machine.clone());
        let handle = self.launch(&machine, thread_fn);
        HOST.maybe_preempt();
        handle
    }

    pub(crate) fn launch<F: FnOnce() + Send + 'static>(
        self,
        machine: &Arc<Machine>,
        thread_fn: F,
    ) -> JoinHandle {
        let parker = Parker::new();
        let tid = machine.admit(self.name.clone(), self.priority, parker.unparker().clone());
        let exited = Arc::new(Semaphore::new(0));
        let handle = JoinHandle {
            tid,
            exited: exited.clone(),
        };

        let machine = machine.clone();
        let spawned = std::thread::Builder::new()
            .name(self.name)
            .spawn(move || {
                run_thread(machine, tid, parker, move || {
                    thread_fn();
                    exited.up();
                })
            });
        if let Err(e) = spawned {
            panic!("ThreadBuilder::spawn: cannot create a host thread: {e}");
        }
        handle
    }
}
