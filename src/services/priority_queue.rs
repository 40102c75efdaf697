//! Banded priority queue backing the work-stealing scheduler.
//!
//! Five FIFO bands, one per [`Priority`] level. `dequeue` scans high to low
//! priority and takes the oldest item in the chosen band (FIFO); `steal`
//! scans low to high and takes the newest item in the chosen band (LIFO),
//! on the theory that the most recently queued low-priority work is least
//! likely to already be something another agent is mid-assignment on.

use std::collections::VecDeque;

use crate::domain::models::Priority;

#[derive(Debug)]
pub struct PriorityQueue<T> {
    bands: [VecDeque<T>; 5],
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self {
            bands: Default::default(),
        }
    }
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn band_mut(&mut self, priority: Priority) -> &mut VecDeque<T> {
        &mut self.bands[priority as usize]
    }

    pub fn enqueue(&mut self, priority: Priority, item: T) {
        self.band_mut(priority).push_back(item);
    }

    /// Removes and returns the oldest item from the highest non-empty band.
    pub fn dequeue(&mut self) -> Option<T> {
        for &priority in Priority::DESCENDING {
            if let Some(item) = self.band_mut(priority).pop_front() {
                return Some(item);
            }
        }
        None
    }

    /// Removes and returns the newest item from the lowest non-empty band,
    /// for a victim agent to steal from a busier one.
    pub fn steal(&mut self) -> Option<T> {
        for &priority in Priority::ASCENDING {
            if let Some(item) = self.band_mut(priority).pop_back() {
                return Some(item);
            }
        }
        None
    }

    /// Borrow the item `dequeue` would return, without removing it.
    pub fn peek(&self) -> Option<&T> {
        for &priority in Priority::DESCENDING {
            if let Some(item) = self.bands[priority as usize].front() {
                return Some(item);
            }
        }
        None
    }

    pub fn size(&self) -> usize {
        self.bands.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.iter().all(VecDeque::is_empty)
    }

    pub fn clear(&mut self) {
        for band in &mut self.bands {
            band.clear();
        }
    }

    pub fn len_at(&self, priority: Priority) -> usize {
        self.bands[priority as usize].len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequeue_prefers_highest_priority_band() {
        let mut q = PriorityQueue::new();
        q.enqueue(Priority::Low, "low");
        q.enqueue(Priority::Critical, "critical");
        q.enqueue(Priority::Normal, "normal");
        assert_eq!(q.dequeue(), Some("critical"));
        assert_eq!(q.dequeue(), Some("normal"));
        assert_eq!(q.dequeue(), Some("low"));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn dequeue_is_fifo_within_a_band() {
        let mut q = PriorityQueue::new();
        q.enqueue(Priority::Normal, 1);
        q.enqueue(Priority::Normal, 2);
        q.enqueue(Priority::Normal, 3);
        assert_eq!(q.dequeue(), Some(1));
        assert_eq!(q.dequeue(), Some(2));
        assert_eq!(q.dequeue(), Some(3));
    }

    #[test]
    fn steal_prefers_lowest_priority_band_and_is_lifo() {
        let mut q = PriorityQueue::new();
        q.enqueue(Priority::High, "high");
        q.enqueue(Priority::Low, "low-first");
        q.enqueue(Priority::Low, "low-second");
        assert_eq!(q.steal(), Some("low-second"));
        assert_eq!(q.steal(), Some("low-first"));
        assert_eq!(q.steal(), Some("high"));
    }

    #[test]
    fn size_and_is_empty_and_clear() {
        let mut q = PriorityQueue::new();
        assert!(q.is_empty());
        q.enqueue(Priority::Urgent, 1);
        q.enqueue(Priority::Low, 2);
        assert_eq!(q.size(), 2);
        assert!(!q.is_empty());
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn peek_does_not_remove() {
        let mut q = PriorityQueue::new();
        q.enqueue(Priority::Normal, "a");
        assert_eq!(q.peek(), Some(&"a"));
        assert_eq!(q.size(), 1);
    }

    use proptest::prelude::*;

    fn priority_strategy() -> impl Strategy<Value = Priority> {
        prop_oneof![
            Just(Priority::Low),
            Just(Priority::Normal),
            Just(Priority::High),
            Just(Priority::Urgent),
            Just(Priority::Critical),
        ]
    }

    proptest! {
        /// Property 3: no item of a lower band is ever dequeued while a
        /// higher band still holds an item, for an arbitrary enqueue order.
        #[test]
        fn dequeue_never_returns_a_lower_band_while_a_higher_one_is_non_empty(
            items in prop::collection::vec((priority_strategy(), any::<u32>()), 0..200),
        ) {
            let mut q = PriorityQueue::new();
            for (priority, value) in &items {
                q.enqueue(*priority, *value);
            }
            let mut last_priority: Option<Priority> = None;
            while let Some(band) = Priority::DESCENDING.iter().find(|p| q.len_at(**p) > 0) {
                let before = *band;
                let item = q.dequeue().expect("non-empty band must yield an item");
                prop_assert!(items.contains(&(before, item)));
                if let Some(last) = last_priority {
                    prop_assert!(before <= last, "bands must be drained highest-to-lowest");
                }
                last_priority = Some(before);
            }
            prop_assert!(q.is_empty());
        }

        /// Stealing and local dequeue together never invent or drop items:
        /// the total count removed always equals the total enqueued.
        #[test]
        fn total_size_is_conserved_across_mixed_dequeue_and_steal(
            items in prop::collection::vec((priority_strategy(), any::<u32>()), 0..200),
        ) {
            let mut q = PriorityQueue::new();
            for (priority, value) in &items {
                q.enqueue(*priority, *value);
            }
            let mut removed = 0usize;
            loop {
                let took = if removed % 2 == 0 { q.dequeue() } else { q.steal() };
                match took {
                    Some(_) => removed += 1,
                    None => break,
                }
            }
            prop_assert_eq!(removed, items.len());
            prop_assert!(q.is_empty());
        }
    }
}
