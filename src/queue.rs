use std::collections::VecDeque;

/// FIFO of pending trace targets. No uniqueness guarantee at the queue level;
/// dedup happens in the tracer via the processed set and the circulation
/// pre-filter.
#[derive(Debug, Clone, Default)]
pub struct TraceQueue<T> {
    items: VecDeque<T>,
}

impl<T> TraceQueue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn enqueue(&mut self, item: T) {
        self.items.push_back(item);
    }

    pub fn enqueue_many<I: IntoIterator<Item = T>>(&mut self, items: I) {
        self.items.extend(items);
    }

    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = TraceQueue::new();
        queue.enqueue("a");
        queue.enqueue("b");
        queue.enqueue("c");

        assert_eq!(queue.dequeue(), Some("a"));
        assert_eq!(queue.dequeue(), Some("b"));
        assert_eq!(queue.dequeue(), Some("c"));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_enqueue_many_and_len() {
        let mut queue = TraceQueue::new();
        assert!(queue.is_empty());

        queue.enqueue_many(vec![1, 2, 3]);
        assert_eq!(queue.len(), 3);
        assert!(!queue.is_empty());

        queue.dequeue();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_duplicates_are_allowed() {
        let mut queue = TraceQueue::new();
        queue.enqueue_many(vec!["x", "x"]);
        assert_eq!(queue.len(), 2);
    }
}
