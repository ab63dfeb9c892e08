//! Global injection queue
//!
//! Unlike each worker's local Chase-Lev deque, the global queue is a
//! plain mutex-protected ring buffer: tasks land here when they're
//! spawned from outside any worker thread, or when a worker's local
//! deque overflows. Workers drain it in batches under the lock rather
//! than one task at a time, to amortize lock acquisition across a
//! steal attempt.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

pub struct GlobalQueue<T> {
    ring: Mutex<VecDeque<T>>,
    non_empty: Condvar,
}

impl<T> GlobalQueue<T> {
    pub fn new() -> Self {
        Self { ring: Mutex::new(VecDeque::new()), non_empty: Condvar::new() }
    }

    pub fn push(&self, value: T) {
        let mut guard = self.ring.lock().unwrap();
        guard.push_back(value);
        self.non_empty.notify_one();
    }

    pub fn pop(&self) -> Option<T> {
        self.ring.lock().unwrap().pop_front()
    }

    /// Drain up to `max` tasks at once, amortizing the lock acquisition
    /// for a worker that's about to refill its local deque.
    pub fn drain_batch(&self, max: usize) -> Vec<T> {
        let mut guard = self.ring.lock().unwrap();
        let n = max.min(guard.len());
        guard.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until the queue is non-empty or `timeout` elapses, then pop.
    pub fn pop_timeout(&self, timeout: std::time::Duration) -> Option<T> {
        let guard = self.ring.lock().unwrap();
        if let Some(_) = guard.front() {
            drop(guard);
            return self.pop();
        }
        let (mut guard, _) = self.non_empty.wait_timeout(guard, timeout).unwrap();
        guard.pop_front()
    }
}

impl<T> Default for GlobalQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_push_pop_fifo() {
        let q = GlobalQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_drain_batch() {
        let q = GlobalQueue::new();
        for i in 0..10 {
            q.push(i);
        }
        let batch = q.drain_batch(4);
        assert_eq!(batch, vec![0, 1, 2, 3]);
        assert_eq!(q.len(), 6);
    }

    #[test]
    fn test_pop_timeout_returns_pushed_value() {
        let q = Arc::new(GlobalQueue::new());
        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.pop_timeout(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        q.push(42);
        assert_eq!(handle.join().unwrap(), Some(42));
    }

    #[test]
    fn test_pop_timeout_expires_empty() {
        let q: GlobalQueue<i32> = GlobalQueue::new();
        assert_eq!(q.pop_timeout(Duration::from_millis(10)), None);
    }
}
