use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// An unbounded MPSC queue with blocking and non-blocking pop.
///
/// Backs the persistence-worker job queue and the main-thread callback
/// queue. An empty [`try_pop`](Self::try_pop) is a normal observation, not
/// a failure.
pub struct ConcurrentQueue<T> {
    queue: Mutex<VecDeque<T>>,
    cond: Condvar,
}

impl<T> ConcurrentQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
        }
    }

    /// Appends an item and wakes at most one waiter.
    pub fn push(&self, item: T) {
        self.queue.lock().push_back(item);
        self.cond.notify_one();
    }

    /// Pops the front item if one is available.
    pub fn try_pop(&self) -> Option<T> {
        self.queue.lock().pop_front()
    }

    /// Blocks until an item is available, then pops it.
    pub fn wait_pop(&self) -> T {
        let mut queue = self.queue.lock();
        loop {
            if let Some(item) = queue.pop_front() {
                return item;
            }
            self.cond.wait(&mut queue);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn fifo_order() {
        let queue = ConcurrentQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn try_pop_on_empty_is_none() {
        let queue: ConcurrentQueue<u32> = ConcurrentQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn wait_pop_blocks_until_push() {
        let queue = Arc::new(ConcurrentQueue::new());

        let consumer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.wait_pop())
        };

        std::thread::sleep(Duration::from_millis(50));
        queue.push(99u32);

        assert_eq!(consumer.join().unwrap(), 99);
    }

    #[test]
    fn many_producers_drain_completely() {
        let queue = Arc::new(ConcurrentQueue::new());

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        queue.push(p * 100 + i);
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }

        let mut seen = vec![];
        while let Some(v) = queue.try_pop() {
            seen.push(v);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..400).collect::<Vec<_>>());
    }
}
