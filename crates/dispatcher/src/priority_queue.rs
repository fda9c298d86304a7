use std::cmp::Ordering;

use harbor_core::QueueEntry;

/// 调度请求优先队列
///
/// 按优先级降序排列；优先级相同的条目保持插入顺序（插入序号作为稳定的平局规则）。
/// 队列本身不加锁，由持有者提供互斥。
#[derive(Debug, Clone)]
pub struct PriorityQueue<T> {
    entries: Vec<QueueEntry<T>>,
    next_sequence: u64,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_sequence: 0,
        }
    }

    pub fn enqueue(&mut self, item: T, priority: f64) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        // after every entry with priority >= the new one
        let position = self
            .entries
            .partition_point(|entry| entry.priority.total_cmp(&priority) != Ordering::Less);
        self.entries
            .insert(position, QueueEntry::new(item, priority, sequence));
    }

    pub fn dequeue(&mut self) -> Option<T> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0).item)
        }
    }

    pub fn peek(&self) -> Option<&T> {
        self.entries.first().map(|entry| &entry.item)
    }

    pub fn peek_entry(&self) -> Option<&QueueEntry<T>> {
        self.entries.first()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove up to `n` items from the head
    pub fn drain(&mut self, n: usize) -> Vec<T> {
        let count = n.min(self.entries.len());
        self.entries.drain(..count).map(|entry| entry.item).collect()
    }

    /// Remove every item matching the predicate in one pass; the rest keep their order
    pub fn drain_while<F>(&mut self, predicate: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        self.drain_entries_while(predicate)
            .into_iter()
            .map(|entry| entry.item)
            .collect()
    }

    /// Like `drain_while`, but keeps each item's priority and insertion sequence
    pub fn drain_entries_while<F>(&mut self, mut predicate: F) -> Vec<QueueEntry<T>>
    where
        F: FnMut(&T) -> bool,
    {
        let mut drained = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if predicate(&entry.item) {
                drained.push(entry);
            } else {
                kept.push(entry);
            }
        }
        self.entries = kept;
        drained
    }

    /// Put back an entry taken out of this queue. It returns to its original place among
    /// equal priorities, ahead of anything enqueued after it.
    pub fn requeue(&mut self, entry: QueueEntry<T>) {
        let position = self.entries.partition_point(|queued| {
            match queued.priority.total_cmp(&entry.priority) {
                Ordering::Greater => true,
                Ordering::Equal => queued.sequence < entry.sequence,
                Ordering::Less => false,
            }
        });
        self.next_sequence = self.next_sequence.max(entry.sequence + 1);
        self.entries.insert(position, entry);
    }

    /// Items in dequeue order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|entry| &entry.item)
    }
}

impl<T: Clone> PriorityQueue<T> {
    /// Copy `other`'s items into this queue; `other` is left untouched
    pub fn merge(&mut self, other: &PriorityQueue<T>) {
        for entry in &other.entries {
            self.enqueue(entry.item.clone(), entry.priority);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dequeue_in_descending_priority() {
        let mut queue = PriorityQueue::new();
        queue.enqueue("low", 1.0);
        queue.enqueue("high", 9.0);
        queue.enqueue("mid", 5.0);

        assert_eq!(queue.peek(), Some(&"high"));
        assert_eq!(queue.dequeue(), Some("high"));
        assert_eq!(queue.dequeue(), Some("mid"));
        assert_eq!(queue.dequeue(), Some("low"));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_equal_priorities_keep_insertion_order() {
        let mut queue = PriorityQueue::new();
        for name in ["a", "b", "c"] {
            queue.enqueue(name, 3.0);
        }
        queue.enqueue("urgent", 4.0);
        queue.enqueue("d", 3.0);

        let order: Vec<_> = queue.drain(10);
        assert_eq!(order, vec!["urgent", "a", "b", "c", "d"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_takes_at_most_n() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(1, 1.0);
        queue.enqueue(2, 2.0);
        queue.enqueue(3, 3.0);

        assert_eq!(queue.drain(2), vec![3, 2]);
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.drain(0), Vec::<i32>::new());
    }

    #[test]
    fn test_drain_while_preserves_remaining_order() {
        let mut queue = PriorityQueue::new();
        for (value, priority) in [(1, 5.0), (2, 4.0), (3, 3.0), (4, 2.0), (5, 1.0)] {
            queue.enqueue(value, priority);
        }

        let evens = queue.drain_while(|v| v % 2 == 0);
        assert_eq!(evens, vec![2, 4]);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![1, 3, 5]);
    }

    #[test]
    fn test_requeue_restores_original_position() {
        let mut queue = PriorityQueue::new();
        queue.enqueue("first", 5.0);
        queue.enqueue("second", 5.0);
        queue.enqueue("urgent", 8.0);

        let taken = queue.drain_entries_while(|item| *item == "first");
        assert_eq!(taken.len(), 1);
        queue.enqueue("third", 5.0);

        for entry in taken {
            queue.requeue(entry);
        }
        assert_eq!(queue.drain(4), vec!["urgent", "first", "second", "third"]);
    }

    #[test]
    fn test_merge_leaves_source_unchanged() {
        let mut target = PriorityQueue::new();
        target.enqueue("t1", 2.0);

        let mut source = PriorityQueue::new();
        source.enqueue("s1", 3.0);
        source.enqueue("s2", 2.0);

        target.merge(&source);
        assert_eq!(source.size(), 2);
        assert_eq!(target.size(), 3);
        assert_eq!(target.drain(3), vec!["s1", "t1", "s2"]);
    }
}
