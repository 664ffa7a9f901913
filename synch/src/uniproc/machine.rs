//! The simulated CPU and the [`Scheduler`] it implements.
//!
//! Each kernel thread is an OS thread, but only the thread named by
//! [`Cpu::running`] executes. Every other one is parked on its own
//! [`Parker`]. A context switch puts the next thread in `running`, unparks it
//! and parks the previous one; this hand-over is the *baton*.
use super::Failure;
use crate::{
    interrupt::InterruptState,
    sync::priority::{PriorityList, outranks},
    thread::{Priority, ThreadState, ThreadSync, Tid, scheduler::Scheduler},
};
use alloc::{boxed::Box, collections::BTreeMap, string::String, sync::Arc, vec::Vec};
use core::{any::Any, cell::RefCell};
use crossbeam_utils::sync::{Parker, Unparker};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

struct SimThread {
    name: String,
    state: ThreadState,
    sync: ThreadSync,
    preemption: InterruptState,
    interrupt_depth: usize,
    // Yields requested while they could not be honoured.
    deferred_preempt: bool,
    deferred_tick: bool,
    unparker: Unparker,
}

pub(crate) struct Cpu {
    running: Option<Tid>,
    ready: PriorityList<Tid>,
    threads: BTreeMap<Tid, SimThread>,
    next_tid: Tid,
    live: usize,
    halted: bool,
    outcome: Option<Result<(), Failure>>,
}

impl Cpu {
    fn thread(&self, tid: Tid) -> &SimThread {
        match self.threads.get(&tid) {
            Some(th) => th,
            None => panic!("uniproc: no thread {tid}."),
        }
    }

    fn thread_mut(&mut self, tid: Tid) -> &mut SimThread {
        match self.threads.get_mut(&tid) {
            Some(th) => th,
            None => panic!("uniproc: no thread {tid}."),
        }
    }

    fn priority(&self, tid: Tid) -> Priority {
        self.thread(tid).sync.priority()
    }

    fn enqueue(&mut self, tid: Tid) {
        self.thread_mut(tid).state = ThreadState::Runnable;
        let Cpu { ready, threads, .. } = self;
        ready.insert(tid, |t| threads[t].sync.priority());
    }

    /// Whether `me` should give the CPU to the head of the ready list. A
    /// timer tick also rotates among equal priorities.
    fn should_yield(&self, me: Tid, tick: bool) -> bool {
        let current = self.priority(me);
        match self.ready.front() {
            Some(head) if tick => self.priority(*head) >= current,
            Some(head) => outranks(self.priority(*head), current),
            None => false,
        }
    }

    fn dispatch(&mut self, done: &Condvar) {
        if self.halted {
            return;
        }
        match self.ready.pop_front() {
            Some(next) => {
                self.running = Some(next);
                let th = self.thread_mut(next);
                th.state = ThreadState::Running;
                th.unparker.unpark();
            }
            None if self.live == 0 => self.halt(Ok(()), done),
            None => {
                let blocked: Vec<String> = self
                    .threads
                    .values()
                    .filter(|th| th.state == ThreadState::Parked)
                    .map(|th| th.name.clone())
                    .collect();
                log::error!("uniproc: deadlock, blocked threads: {blocked:?}");
                self.halt(Err(Failure::Deadlock(blocked)), done);
            }
        }
    }

    fn halt(&mut self, outcome: Result<(), Failure>, done: &Condvar) {
        self.running = None;
        if !self.halted {
            self.halted = true;
            self.outcome = Some(outcome);
        }
        done.notify_all();
    }
}

/// A uniprocessor: the thread table, the ready list and the baton.
pub(crate) struct Machine {
    cpu: Mutex<Cpu>,
    done: Condvar,
}

impl Machine {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            cpu: Mutex::new(Cpu {
                running: None,
                ready: PriorityList::new(),
                threads: BTreeMap::new(),
                next_tid: 1,
                live: 0,
                halted: false,
                outcome: None,
            }),
            done: Condvar::new(),
        })
    }

    // A thread that panicked while holding the table leaves it consistent
    // enough to report the failure.
    fn lock(&self) -> MutexGuard<'_, Cpu> {
        self.cpu.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a runnable thread to the table and returns its id.
    pub(crate) fn admit(&self, name: String, priority: Priority, unparker: Unparker) -> Tid {
        let mut cpu = self.lock();
        let tid = cpu.next_tid;
        cpu.next_tid += 1;
        cpu.live += 1;
        log::debug!("uniproc: thread {tid} ({name}) admitted at priority {priority}");
        cpu.threads.insert(
            tid,
            SimThread {
                name,
                state: ThreadState::Runnable,
                sync: ThreadSync::new(priority),
                preemption: InterruptState::On,
                interrupt_depth: 0,
                deferred_preempt: false,
                deferred_tick: false,
                unparker,
            },
        );
        cpu.enqueue(tid);
        tid
    }

    /// Gives the idle CPU to the first thread.
    pub(crate) fn boot(&self) {
        let mut cpu = self.lock();
        if cpu.running.is_none() {
            cpu.dispatch(&self.done);
        }
    }

    /// Waits until every thread has exited or the machine has failed.
    pub(crate) fn wait_outcome(&self) -> Result<(), Failure> {
        let mut cpu = self.lock();
        loop {
            if let Some(outcome) = cpu.outcome.take() {
                return outcome;
            }
            cpu = self
                .done
                .wait(cpu)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// The machine and identity of the kernel thread on this OS thread.
pub(crate) struct Context {
    pub(crate) machine: Arc<Machine>,
    pub(crate) tid: Tid,
    parker: Parker,
}

std::thread_local! {
    static CONTEXT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

pub(crate) fn with_context<R>(f: impl FnOnce(&Context) -> R) -> R {
    CONTEXT.with(|context| match context.borrow().as_ref() {
        Some(ctx) => f(ctx),
        None => panic!("uniproc: kernel thread API called outside of a uniproc thread."),
    })
}

/// Body of every OS thread backing a kernel thread.
pub(crate) fn run_thread(machine: Arc<Machine>, tid: Tid, parker: Parker, f: impl FnOnce()) {
    CONTEXT.with(|context| {
        *context.borrow_mut() = Some(Context {
            machine,
            tid,
            parker,
        })
    });
    with_context(Context::wait_turn);
    let result = std::panic::catch_unwind(core::panic::AssertUnwindSafe(f));
    with_context(|ctx| match result {
        Ok(()) => ctx.exit(),
        Err(payload) => ctx.fail(payload),
    });
}

impl Context {
    fn wait_turn(&self) {
        loop {
            let running = self.machine.lock().running;
            if running == Some(self.tid) {
                return;
            }
            self.parker.park();
        }
    }

    fn switch(&self, mut cpu: MutexGuard<'_, Cpu>) {
        cpu.dispatch(&self.machine.done);
        drop(cpu);
        self.wait_turn();
    }

    fn yield_now(&self, mut cpu: MutexGuard<'_, Cpu>) {
        cpu.enqueue(self.tid);
        self.switch(cpu);
    }

    /// Yields for requests deferred while preemption was off.
    fn honour_deferred(&self, mut cpu: MutexGuard<'_, Cpu>) {
        if std::thread::panicking() {
            return;
        }
        let th = cpu.thread_mut(self.tid);
        if th.interrupt_depth > 0 || th.preemption == InterruptState::Off {
            return;
        }
        let tick = core::mem::take(&mut th.deferred_tick);
        let preempt = core::mem::take(&mut th.deferred_preempt);
        if (tick || preempt) && cpu.should_yield(self.tid, tick) {
            self.yield_now(cpu);
        }
    }

    pub(crate) fn tick(&self) {
        let mut cpu = self.machine.lock();
        let th = cpu.thread_mut(self.tid);
        if th.interrupt_depth > 0 || th.preemption == InterruptState::Off {
            th.deferred_tick = true;
            return;
        }
        if cpu.should_yield(self.tid, true) {
            self.yield_now(cpu);
        }
    }

    pub(crate) fn enter_interrupt(&self) -> InterruptState {
        let mut cpu = self.machine.lock();
        let th = cpu.thread_mut(self.tid);
        th.interrupt_depth += 1;
        core::mem::replace(&mut th.preemption, InterruptState::Off)
    }

    pub(crate) fn leave_interrupt(&self, saved: InterruptState) {
        let mut cpu = self.machine.lock();
        let th = cpu.thread_mut(self.tid);
        th.interrupt_depth -= 1;
        th.preemption = saved;
        self.honour_deferred(cpu);
    }

    fn exit(&self) {
        let mut cpu = self.machine.lock();
        cpu.thread_mut(self.tid).state = ThreadState::Exited;
        cpu.live -= 1;
        log::debug!("uniproc: thread {} exited", self.tid);
        cpu.dispatch(&self.machine.done);
    }

    fn fail(&self, payload: Box<dyn Any + Send>) {
        let mut cpu = self.machine.lock();
        let th = cpu.thread_mut(self.tid);
        th.state = ThreadState::Exited;
        log::error!("uniproc: thread {} ({}) panicked", self.tid, th.name);
        cpu.live -= 1;
        cpu.halt(Err(Failure::Panic(payload)), &self.machine.done);
    }
}

/// The [`Scheduler`] of whichever machine runs the calling thread.
pub(crate) struct Host;

pub(crate) static HOST: Host = Host;

impl Scheduler for Host {
    fn current(&self) -> Tid {
        with_context(|ctx| ctx.tid)
    }

    fn state(&self, tid: Tid) -> ThreadState {
        with_context(|ctx| ctx.machine.lock().thread(tid).state)
    }

    fn with_sync(&self, tid: Tid, f: &mut dyn FnMut(&mut ThreadSync)) {
        with_context(|ctx| f(&mut ctx.machine.lock().thread_mut(tid).sync))
    }

    fn suspend_current(&self) {
        with_context(|ctx| {
            let mut cpu = ctx.machine.lock();
            cpu.thread_mut(ctx.tid).state = ThreadState::Parked;
            ctx.switch(cpu);
        })
    }

    fn make_runnable(&self, tid: Tid) {
        with_context(|ctx| {
            let mut cpu = ctx.machine.lock();
            assert_eq!(
                cpu.thread(tid).state,
                ThreadState::Parked,
                "uniproc: thread {tid} is not parked."
            );
            cpu.enqueue(tid);
        })
    }

    fn maybe_preempt(&self) {
        if std::thread::panicking() {
            return;
        }
        with_context(|ctx| {
            let mut cpu = ctx.machine.lock();
            if !cpu.should_yield(ctx.tid, false) {
                return;
            }
            let th = cpu.thread_mut(ctx.tid);
            if th.interrupt_depth > 0 {
                th.deferred_preempt = true;
                return;
            }
            ctx.yield_now(cpu);
        })
    }

    fn reorder_ready(&self, tid: Tid) {
        with_context(|ctx| {
            let mut cpu = ctx.machine.lock();
            let Cpu { ready, threads, .. } = &mut *cpu;
            ready.reposition(|t| *t == tid, |t| threads[t].sync.priority());
        })
    }

    fn disable_preemption(&self) -> InterruptState {
        with_context(|ctx| {
            let mut cpu = ctx.machine.lock();
            let th = cpu.thread_mut(ctx.tid);
            core::mem::replace(&mut th.preemption, InterruptState::Off)
        })
    }

    fn restore_preemption(&self, state: InterruptState) {
        with_context(|ctx| {
            let mut cpu = ctx.machine.lock();
            cpu.thread_mut(ctx.tid).preemption = state;
            ctx.honour_deferred(cpu);
        })
    }

    fn in_restricted_context(&self) -> bool {
        with_context(|ctx| ctx.machine.lock().thread(ctx.tid).interrupt_depth > 0)
    }
}
