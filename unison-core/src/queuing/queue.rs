use std::fmt::Debug;

use crate::EntryId;

use super::QueueEntry;

/// Gap between queue positions, leaving room for reordering between entries
pub const POSITION_GAP: i64 = 10_000;

/// Represents a type that stores the waiting entries of a room, in play order.
pub trait Queue
where
    Self: 'static + Send + Sync + Debug,
{
    /// Inserts an entry according to its position.
    fn push(&mut self, entry: QueueEntry);

    /// Returns the waiting entries in play order.
    fn peek(&self) -> Vec<&QueueEntry>;

    /// Removes and returns the entry that plays next.
    fn next(&mut self) -> Option<QueueEntry>;

    fn remove(&mut self, id: EntryId) -> Option<QueueEntry>;
    fn get(&self, id: EntryId) -> Option<&QueueEntry>;
    fn get_mut(&mut self, id: EntryId) -> Option<&mut QueueEntry>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The position a newly submitted entry should take.
    fn next_position(&self) -> i64 {
        let max = self.peek().iter().map(|e| e.position).max().unwrap_or(0);
        max + POSITION_GAP
    }
}

/// [Queue] trait object.
pub type BoxedQueue = Box<dyn Queue>;

/// A queue that plays entries in submission order.
///
/// Votes never reorder a linear queue, entries are ordered by
/// `(position, created_at, id)`.
#[derive(Debug, Default)]
pub struct LinearQueue {
    items: Vec<QueueEntry>,
}

impl LinearQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

fn order_key(entry: &QueueEntry) -> (i64, i64, EntryId) {
    (entry.position, entry.created_at, entry.id)
}

impl Queue for LinearQueue {
    fn push(&mut self, entry: QueueEntry) {
        let key = order_key(&entry);
        let index = self.items.partition_point(|e| order_key(e) <= key);

        self.items.insert(index, entry);
    }

    fn peek(&self) -> Vec<&QueueEntry> {
        self.items.iter().collect()
    }

    fn next(&mut self) -> Option<QueueEntry> {
        if self.items.is_empty() {
            return None;
        }

        Some(self.items.remove(0))
    }

    fn remove(&mut self, id: EntryId) -> Option<QueueEntry> {
        let index = self.items.iter().position(|e| e.id == id)?;
        Some(self.items.remove(index))
    }

    fn get(&self, id: EntryId) -> Option<&QueueEntry> {
        self.items.iter().find(|e| e.id == id)
    }

    fn get_mut(&mut self, id: EntryId) -> Option<&mut QueueEntry> {
        self.items.iter_mut().find(|e| e.id == id)
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{entry_for_test, VoteType};

    #[test]
    fn orders_by_position_then_creation() {
        let mut queue = LinearQueue::new();

        let mut late = entry_for_test(3, 10_000);
        late.created_at = 50;

        queue.push(entry_for_test(1, 20_000));
        queue.push(late);
        queue.push(entry_for_test(2, 10_000));

        let ids: Vec<_> = queue.peek().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(queue.next_position(), 30_000);
    }

    #[test]
    fn upvotes_do_not_reorder() {
        let mut queue = LinearQueue::new();
        queue.push(entry_for_test(1, 10_000));
        queue.push(entry_for_test(2, 20_000));

        let second = queue.get_mut(2).unwrap();
        second.toggle_vote(5, VoteType::Upvote);
        second.toggle_vote(6, VoteType::Upvote);

        assert_eq!(queue.next().map(|e| e.id), Some(1));
        assert_eq!(queue.next().map(|e| e.id), Some(2));
        assert!(queue.next().is_none());
        assert_eq!(queue.next_position(), POSITION_GAP);
    }

    #[test]
    fn removes_by_id() {
        let mut queue = LinearQueue::new();
        queue.push(entry_for_test(1, 10_000));
        queue.push(entry_for_test(2, 20_000));

        assert_eq!(queue.remove(1).map(|e| e.id), Some(1));
        assert!(queue.remove(1).is_none());
        assert_eq!(queue.len(), 1);
    }
}
