//! Suspended preemption.
//!
//! On a uniprocessor, a thread that cannot be preempted cannot be interleaved
//! with any other thread. This is the only mutual exclusion the
//! synchronization core has: there is no lower-level lock underneath it.
//!
//! [`InterruptGuard`] suspends preemption for as long as it lives and restores
//! the previous state when dropped, on every exit path. [`GuardedCell`] is the
//! matching storage: its contents can only be reached with a live guard in
//! hand.
use crate::thread::scheduler::scheduler;
use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    sync::atomic::{AtomicBool, Ordering},
};

/// Enumeration representing the interrupt state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InterruptState {
    /// Interrupts are enabled; the current thread may be preempted.
    On,
    /// Interrupts are disabled; the current thread runs until it yields.
    Off,
}

/// An RAII-based guard for suspending preemption.
///
/// When an `InterruptGuard` is created, preemption is suspended. When it is
/// dropped, the preemption state is restored to what it was before the guard
/// was created, so guards nest freely.
///
/// **Important:**
/// - [`InterruptGuard`] instances **must be dropped in reverse order of their
///   creation**. Rust's scoping upholds this unless `drop()` is called early
///   or a guard is stored in a struct field.
/// - A thread may block while holding a guard (the core does so inside
///   `Semaphore::down`); the scheduler switches the saved state together with
///   the thread.
pub struct InterruptGuard {
    saved: InterruptState,
    _not_send: PhantomData<*const ()>,
}

impl InterruptGuard {
    /// Creates a new `InterruptGuard`, suspending preemption.
    pub fn new() -> Self {
        let saved = scheduler().disable_preemption();
        Self {
            saved,
            _not_send: PhantomData,
        }
    }

    /// The state that will be restored when this guard is dropped.
    pub fn saved_state(&self) -> InterruptState {
        self.saved
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        scheduler().restore_preemption(self.saved);
    }
}

/// A cell whose contents are only reachable while preemption is suspended.
///
/// Access goes through [`GuardedCell::with`], which demands a reference to a
/// live [`InterruptGuard`]. Nested access to the same cell is refused with a
/// panic rather than handing out a second mutable reference.
pub struct GuardedCell<T> {
    busy: AtomicBool,
    value: UnsafeCell<T>,
}

// SAFETY: the value is only reached through `with`, which holds the busy flag
// for the duration of the borrow, and the caller proves with an
// `InterruptGuard` that no other thread can run meanwhile.
unsafe impl<T: Send> Sync for GuardedCell<T> {}

impl<T> GuardedCell<T> {
    /// Creates a new cell holding `value`.
    pub const fn new(value: T) -> Self {
        Self {
            busy: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Runs `f` with exclusive access to the contents.
    ///
    /// `f` must not reach this cell again; doing so panics.
    pub fn with<R>(&self, _guard: &InterruptGuard, f: impl FnOnce(&mut T) -> R) -> R {
        struct Release<'a>(&'a AtomicBool);

        impl Drop for Release<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::Release);
            }
        }

        assert!(
            !self.busy.swap(true, Ordering::Acquire),
            "GuardedCell: re-entrant access."
        );
        let _release = Release(&self.busy);
        // SAFETY: the busy flag is ours until `_release` drops, so this is the
        // only reference to the value.
        f(unsafe { &mut *self.value.get() })
    }

    /// Consumes the cell, returning the contents.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Default> Default for GuardedCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::uniproc;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    assert_not_impl_any!(InterruptGuard: Send, Sync);
    assert_impl_all!(GuardedCell<u64>: Send, Sync);

    #[test]
    fn guards_nest() {
        uniproc::run(|| {
            let outer = InterruptGuard::new();
            assert_eq!(outer.saved_state(), InterruptState::On);
            {
                let inner = InterruptGuard::new();
                assert_eq!(inner.saved_state(), InterruptState::Off);
            }
            let again = InterruptGuard::new();
            assert_eq!(again.saved_state(), InterruptState::Off);
        });
    }

    #[test]
    fn cell_hands_out_contents() {
        uniproc::run(|| {
            let cell = GuardedCell::new(41);
            let guard = InterruptGuard::new();
            cell.with(&guard, |v| *v += 1);
            assert_eq!(cell.with(&guard, |v| *v), 42);
            drop(guard);
            assert_eq!(cell.into_inner(), 42);
        });
    }

    #[test]
    #[should_panic(expected = "re-entrant access")]
    fn cell_refuses_reentry() {
        uniproc::run(|| {
            let cell = GuardedCell::new(0);
            let guard = InterruptGuard::new();
            cell.with(&guard, |_| cell.with(&guard, |v| *v += 1));
        });
    }
}
