//! # KeOS Synchronization Core
//!
//! This crate is the lowest layer of KeOS's thread synchronization: counting
//! semaphores, locks with **priority donation**, and Mesa-style condition
//! variables. Every wait list in this crate is ordered by a strict priority
//! discipline, so that among threads eligible to proceed the highest-priority
//! one always goes first, with FIFO order among equal priorities.
//!
//! The core does not schedule CPU time. It decides *who is eligible to run*
//! and *at what effective priority*, and talks to the thread subsystem only
//! through the [`Scheduler`] trait. Because there is no lower-level lock to
//! protect its own state, all of it is mutated while preemption is suspended
//! with an [`InterruptGuard`].
//!
//! ## Layout
//!
//! - [`sync::priority`]: the ordering policy and the ordered wait list.
//! - [`sync::semaphore`]: counting semaphore.
//! - [`sync::lock`] and [`sync::donation`]: lock with nested priority donation.
//! - [`sync::condition_variable`]: condition variable over private semaphores.
//! - [`sync::mutex`]: a data-carrying mutex built on [`Lock`].
//! - [`thread`]: thread ids, priorities and the [`Scheduler`] interface.
//! - `uniproc` (feature `std`): a host uniprocessor that implements
//!   [`Scheduler`] with OS threads, used to run the core off-target.
//!
//! [`Scheduler`]: thread::scheduler::Scheduler
//! [`InterruptGuard`]: interrupt::InterruptGuard
//! [`Lock`]: sync::Lock
#![no_std]
#![warn(missing_docs)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod interrupt;
pub mod sync;
pub mod thread;
#[cfg(feature = "std")]
pub mod uniproc;

pub use sync::{ConditionVariable, Lock, Mutex, MutexGuard, Semaphore, WouldBlock};
pub use thread::{PRI_DEFAULT, PRI_MAX, PRI_MIN, Priority, ThreadState, Tid};
