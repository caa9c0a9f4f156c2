//! Fixed-capacity history of terminal records.

use std::collections::VecDeque;

/// Ring buffer of finished records. Pushing past capacity drops the
/// oldest entry; there is no recency-of-access policy.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    capacity: usize,
    entries: VecDeque<T>,
}

impl<T> BoundedHistory<T> {
    /// Create an empty history. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Rebuild a history from exported entries (oldest first), keeping only
    /// the newest `capacity` of them.
    pub fn from_entries(capacity: usize, entries: impl IntoIterator<Item = T>) -> Self {
        let mut history = Self::new(capacity);
        for entry in entries {
            history.push(entry);
        }
        history
    }

    /// Append a record, returning the evicted one when full.
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent record.
    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Oldest-first iteration.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T: Clone> BoundedHistory<T> {
    /// Oldest-first copy of every record.
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_on_overflow() {
        let mut history = BoundedHistory::new(3);
        assert_eq!(history.push(1), None);
        assert_eq!(history.push(2), None);
        assert_eq!(history.push(3), None);
        assert_eq!(history.push(4), Some(1));
        assert_eq!(history.to_vec(), vec![2, 3, 4]);
        assert_eq!(history.last(), Some(&4));
    }

    #[test]
    fn test_from_entries_truncates_to_capacity() {
        let history = BoundedHistory::from_entries(2, ["a", "b", "c"]);
        assert_eq!(history.len(), 2);
        assert_eq!(history.to_vec(), vec!["b", "c"]);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut history = BoundedHistory::new(0);
        assert_eq!(history.capacity(), 1);
        history.push('x');
        assert_eq!(history.push('y'), Some('x'));
        assert_eq!(history.len(), 1);
    }
}
