use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::task::PlaybackTask;

struct Inner {
    items: VecDeque<PlaybackTask>,
    capacity: usize,
}

/// Bounded FIFO between producers and the single playback worker.
///
/// Shrinking the capacity never drops queued tasks; it only rejects pushes
/// until the queue drains below the new bound.
pub struct PlaybackQueue {
    inner: Mutex<Inner>,
    available: Condvar,
}

impl PlaybackQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                capacity: capacity.max(1),
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push without blocking. Hands the task back if the queue is full.
    pub fn try_push(&self, task: PlaybackTask) -> Result<(), PlaybackTask> {
        let mut inner = self.lock();
        if inner.items.len() >= inner.capacity {
            return Err(task);
        }
        inner.items.push_back(task);
        drop(inner);
        self.available.notify_one();
        Ok(())
    }

    /// Pop the oldest task, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<PlaybackTask> {
        let inner = self.lock();
        let (mut inner, _) = self
            .available
            .wait_timeout_while(inner, timeout, |inner| inner.items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        inner.items.pop_front()
    }

    /// Set the capacity (minimum 1).
    pub fn set_capacity(&self, capacity: usize) {
        self.lock().capacity = capacity.max(1);
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Drop all queued tasks. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.items.len();
        inner.items.clear();
        dropped
    }

    /// Wake any waiting consumer so it can observe cancellation.
    pub fn wake(&self) {
        self.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::audio::PcmAudio;

    fn task(label: &str) -> PlaybackTask {
        PlaybackTask::pcm(label, PcmAudio::new(vec![0.1], 16_000))
    }

    #[test]
    fn test_fifo_order() {
        let queue = PlaybackQueue::new(4);
        queue.try_push(task("a")).unwrap();
        queue.try_push(task("b")).unwrap();
        assert_eq!(queue.pop_timeout(Duration::ZERO).unwrap().label, "a");
        assert_eq!(queue.pop_timeout(Duration::ZERO).unwrap().label, "b");
        assert!(queue.pop_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn test_full_queue_rejects() {
        let queue = PlaybackQueue::new(1);
        queue.try_push(task("a")).unwrap();
        let rejected = queue.try_push(task("b")).unwrap_err();
        assert_eq!(rejected.label, "b");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_shrink_keeps_queued_items() {
        let queue = PlaybackQueue::new(3);
        for label in ["a", "b", "c"] {
            queue.try_push(task(label)).unwrap();
        }
        queue.set_capacity(1);
        assert_eq!(queue.len(), 3);
        assert!(queue.try_push(task("d")).is_err());

        queue.pop_timeout(Duration::ZERO);
        queue.pop_timeout(Duration::ZERO);
        queue.pop_timeout(Duration::ZERO);
        assert!(queue.try_push(task("e")).is_ok());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let queue = PlaybackQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.set_capacity(0);
        assert_eq!(queue.capacity(), 1);
    }

    #[test]
    fn test_pop_wakes_on_push() {
        let queue = Arc::new(PlaybackQueue::new(2));
        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.try_push(task("late")).unwrap();
        });

        let started = Instant::now();
        let popped = queue.pop_timeout(Duration::from_secs(5));
        handle.join().unwrap();
        assert_eq!(popped.unwrap().label, "late");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
