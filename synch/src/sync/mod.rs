//! # Synchronization primitives.
//!
//! Threads that share a resource must agree on who may touch it and when.
//! This module provides the blocking primitives the rest of KeOS builds on:
//!
//! - [`Semaphore`]: a counting semaphore. The only primitive here that ever
//!   suspends a thread.
//! - [`Lock`]: a non-reentrant lock with an owner. While a thread waits on a
//!   lock, it **donates** its priority to the owner, and through the owner to
//!   whatever the owner waits for, so that a low-priority owner cannot starve
//!   a high-priority waiter behind threads of medium priority.
//! - [`ConditionVariable`]: Mesa-style condition variable associated with a
//!   [`Lock`].
//! - [`Mutex`]: a [`Lock`] that owns the data it protects, handing it out
//!   through a [`MutexGuard`].
//!
//! ## Ordering
//!
//! Every wait list here is a [`PriorityList`]: the waiter with the strictly
//! highest priority leaves first, and equal priorities leave in arrival order.
//! When a queued thread's priority changes through donation, it is moved to
//! its new place at once, so the order holds at all times and not only at
//! insertion.
//!
//! ## Mutual exclusion of the primitives themselves
//!
//! There is no lower-level lock under these primitives. Their own state is
//! kept in [`GuardedCell`]s and only touched while an [`InterruptGuard`]
//! suspends preemption.
//!
//! [`PriorityList`]: priority::PriorityList
//! [`GuardedCell`]: crate::interrupt::GuardedCell
//! [`InterruptGuard`]: crate::interrupt::InterruptGuard
pub mod condition_variable;
pub mod donation;
pub mod lock;
pub mod mutex;
pub mod priority;
pub mod semaphore;

pub use condition_variable::ConditionVariable;
pub use lock::Lock;
pub use mutex::{Mutex, MutexGuard};
pub use semaphore::Semaphore;

/// The error returned when a non-blocking acquisition would have blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WouldBlock;

impl core::fmt::Display for WouldBlock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "operation would block")
    }
}
