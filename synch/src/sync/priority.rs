//! # Priority ordering.
//!
//! Every wait list in KeOS obeys one policy: the waiter with the strictly
//! highest priority leaves first, and waiters of equal priority leave in the
//! order they arrived. [`PriorityList`] implements the policy once for all of
//! them: semaphore waiters (keyed by each thread's current priority),
//! condition variable waiters (keyed by a priority snapshot), and the ready
//! list of the host uniprocessor.
//!
//! The list does not store keys. Every operation that needs an order takes a
//! `priority_of` function, so that a key read at insertion time can never go
//! stale. When an element's key changes while it is queued, the owner must
//! call [`PriorityList::reposition`]; the order invariant holds after every
//! such call.
use crate::thread::Priority;
use alloc::collections::VecDeque;

/// Returns true if a waiter at priority `a` must leave before one at `b`.
#[inline]
pub fn outranks(a: Priority, b: Priority) -> bool {
    a > b
}

/// A wait list ordered by priority, highest first, FIFO among equals.
#[derive(Debug)]
pub struct PriorityList<T> {
    items: VecDeque<T>,
}

impl<T> PriorityList<T> {
    /// Creates an empty list.
    pub const fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Number of waiters.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if nobody waits.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The waiter that would leave next.
    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    /// Removes the waiter that leaves next.
    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Iterates from the head of the list.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Inserts `item` behind every waiter that it does not outrank.
    pub fn insert(&mut self, item: T, priority_of: impl Fn(&T) -> Priority) {
        let priority = priority_of(&item);
        let at = self
            .items
            .iter()
            .position(|other| outranks(priority, priority_of(other)))
            .unwrap_or(self.items.len());
        self.items.insert(at, item);
    }

    /// Removes the first waiter matching `pred`.
    pub fn remove_where(&mut self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let at = self.items.iter().position(pred)?;
        self.items.remove(at)
    }

    /// Moves the waiter matching `pred` to the place its current priority
    /// dictates. Returns false if no waiter matches.
    pub fn reposition(
        &mut self,
        pred: impl Fn(&T) -> bool,
        priority_of: impl Fn(&T) -> Priority,
    ) -> bool {
        match self.remove_where(pred) {
            Some(item) => {
                self.insert(item, priority_of);
                true
            }
            None => false,
        }
    }

    /// Checks the order invariant: no waiter outranks the one in front of it.
    pub fn is_ordered(&self, priority_of: impl Fn(&T) -> Priority) -> bool {
        self.items
            .iter()
            .zip(self.items.iter().skip(1))
            .all(|(ahead, behind)| !outranks(priority_of(behind), priority_of(ahead)))
    }
}

impl<T> Default for PriorityList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn drain(mut list: PriorityList<(char, Priority)>) -> Vec<char> {
        let mut out = Vec::new();
        while let Some((name, _)) = list.pop_front() {
            out.push(name);
        }
        out
    }

    #[test]
    fn highest_first_fifo_among_equals() {
        let mut list = PriorityList::new();
        for waiter in [('a', 10), ('b', 30), ('c', 20), ('d', 30), ('e', 10)] {
            list.insert(waiter, |w| w.1);
        }
        assert!(list.is_ordered(|w| w.1));
        assert_eq!(drain(list), ['b', 'd', 'c', 'a', 'e']);
    }

    #[test]
    fn reposition_follows_new_key() {
        let mut list = PriorityList::new();
        for waiter in [('a', 30), ('b', 20), ('c', 20), ('d', 10)] {
            list.insert(waiter, |w| w.1);
        }
        // `d` is raised to tie with `a`; it queues behind `a`.
        let new_key = |w: &(char, Priority)| if w.0 == 'd' { 30 } else { w.1 };
        assert!(!list.is_ordered(new_key));
        assert!(list.reposition(|w| w.0 == 'd', new_key));
        assert!(list.is_ordered(new_key));
        assert_eq!(list.iter().map(|w| w.0).collect::<Vec<_>>(), ['a', 'd', 'b', 'c']);

        assert!(!list.reposition(|w| w.0 == 'z', new_key));
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn remove_where_takes_first_match() {
        let mut list = PriorityList::new();
        for waiter in [('a', 5), ('b', 5), ('c', 1)] {
            list.insert(waiter, |w| w.1);
        }
        assert_eq!(list.remove_where(|w| w.1 == 5), Some(('a', 5)));
        assert_eq!(list.front(), Some(&('b', 5)));
        assert!(list.remove_where(|w| w.1 == 9).is_none());
    }
}
