//! Bounded hand-off queue between the ingestor tasks and the consumer thread.
//!
//! Multi-producer, single logical consumer. Producers never block: pushing
//! past capacity evicts the oldest entries instead. The consumer drains
//! non-blockingly on its own schedule.

use crate::model::Tick;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct DeliveryQueue {
    inner: Arc<Mutex<VecDeque<Tick>>>,
    capacity: usize,
}

impl DeliveryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
        }
    }

    /// Append one tick, evicting the oldest entries if at capacity.
    pub fn push(&self, tick: Tick) {
        let mut queue = self.inner.lock().unwrap();
        while queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(tick);
    }

    /// Remove and return up to `max_items` ticks in FIFO order. Never blocks.
    pub fn drain(&self, max_items: usize) -> Vec<Tick> {
        let mut queue = self.inner.lock().unwrap();
        let count = max_items.min(queue.len());
        queue.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(n: i64) -> Tick {
        Tick::new("BTCUSDT", n, n as f64, 0.1)
    }

    #[test]
    fn test_fifo_drain() {
        let queue = DeliveryQueue::new(10);
        for i in 0..5 {
            queue.push(tick(i));
        }

        let drained = queue.drain(3);
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].ts_ms, 0);
        assert_eq!(drained[2].ts_ms, 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let queue = DeliveryQueue::new(3);
        for i in 0..5 {
            queue.push(tick(i));
        }

        assert_eq!(queue.len(), 3);
        let drained = queue.drain(10);
        let ts: Vec<i64> = drained.iter().map(|t| t.ts_ms).collect();
        assert_eq!(ts, vec![2, 3, 4]);
    }

    #[test]
    fn test_drain_empty_is_noop() {
        let queue = DeliveryQueue::new(3);
        assert!(queue.drain(10).is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_from_many_threads() {
        let queue = DeliveryQueue::new(1000);
        let mut handles = Vec::new();
        for worker in 0..4 {
            let queue = queue.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    queue.push(tick(worker * 1000 + i));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 400);
    }
}
