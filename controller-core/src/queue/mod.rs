//! Bounded FIFO queue with explicit lifecycle states.
//!
//! `Queue<T>` decouples a transport's delivery task from the worker that
//! processes received payloads (see [`crate::propagator::Propagator`]). It
//! is the single synchronization point between producers (there may be
//! many) and a consumer (there is exactly one, by convention — concurrent
//! consumers are not supported, matching spec.md §4.2).

// Layer 1: Standard library imports
use std::collections::VecDeque;

// Layer 2: Third-party crate imports
use tokio::sync::{Mutex, Notify};

mod error;
pub use error::QueueError;

/// Lifecycle state of a [`Queue`].
///
/// `Open -> Closed` is the only legal transition. Closing is one-way:
/// nothing in this crate ever re-opens a closed queue (see DESIGN.md for
/// the Open Question this resolves).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Accepting new elements.
    Open,
    /// No longer accepting new elements; draining what remains.
    Closed,
}

struct Inner<T> {
    items: VecDeque<T>,
    state: QueueState,
}

/// Bounded, multi-producer single-consumer FIFO queue.
///
/// `0 <= len() <= capacity` always holds. `add` blocks the caller while the
/// queue is full and open; `remove` blocks the caller while the queue is
/// empty and open. Once closed, `add` fails immediately and `remove`
/// returns `None` (the terminal marker) only after the backlog has
/// drained.
pub struct Queue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Notify,
    not_full: Notify,
    capacity: usize,
}

impl<T> Queue<T> {
    /// Create an open queue with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; a zero-capacity queue can never hold
    /// an element and every caller of `add` would block forever.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Queue capacity must be greater than zero");
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.min(1024)),
                state: QueueState::Open,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            capacity,
        }
    }

    /// Maximum number of elements this queue will hold at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> QueueState {
        self.inner.lock().await.state
    }

    /// Approximate number of elements currently queued.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    /// Enqueue `item`, blocking while the queue is full and open.
    ///
    /// Fails with [`QueueError::Closed`] immediately if the queue is
    /// already closed, or if it closes while this call was blocked.
    pub async fn add(&self, item: T) -> Result<(), QueueError> {
        let mut item = Some(item);
        loop {
            {
                let mut guard = self.inner.lock().await;
                if guard.state == QueueState::Closed {
                    return Err(QueueError::Closed);
                }
                if guard.items.len() < self.capacity {
                    if let Some(value) = item.take() {
                        guard.items.push_back(value);
                    }
                    drop(guard);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }
            self.not_full.notified().await;
        }
    }

    /// Dequeue the head element, blocking while the queue is empty and
    /// open.
    ///
    /// Returns `None` — the terminal marker — once the queue is closed
    /// and fully drained. Callers use this to exit their processing loop.
    pub async fn remove(&self) -> Option<T> {
        loop {
            {
                let mut guard = self.inner.lock().await;
                if let Some(item) = guard.items.pop_front() {
                    drop(guard);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if guard.state == QueueState::Closed {
                    return None;
                }
            }
            self.not_empty.notified().await;
        }
    }

    /// Transition the queue to `Closed`, waking every blocked producer and
    /// consumer. A no-op if already closed.
    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        if guard.state == QueueState::Open {
            guard.state = QueueState::Closed;
        }
        drop(guard);
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn add_then_remove_preserves_order() {
        let q = Queue::new(4);
        q.add(1).await.unwrap();
        q.add(2).await.unwrap();
        q.add(3).await.unwrap();
        assert_eq!(q.remove().await, Some(1));
        assert_eq!(q.remove().await, Some(2));
        assert_eq!(q.remove().await, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_capacity() {
        let q = Arc::new(Queue::new(2));
        q.add(1).await.unwrap();
        q.add(2).await.unwrap();
        assert_eq!(q.len().await, 2);

        let q2 = Arc::clone(&q);
        let blocked = tokio::spawn(async move { q2.add(3).await });

        // Under a paused clock, `advance` first runs every other task to
        // its next suspension point before moving the virtual clock —
        // exactly the determinism a fixed wall-clock sleep only
        // approximates. The spawned producer has nothing left to do but
        // block on the queue's `not_full` notification, so by the time
        // this returns it is guaranteed to have reached that point.
        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(q.len().await, 2, "producer should still be blocked");

        assert_eq!(q.remove().await, Some(1));
        blocked.await.unwrap().unwrap();
        assert_eq!(q.len().await, 2);
    }

    #[tokio::test]
    async fn closed_and_empty_returns_terminal_marker() {
        let q: Queue<i32> = Queue::new(4);
        q.close().await;
        assert_eq!(q.remove().await, None);
    }

    #[tokio::test]
    async fn close_drains_backlog_before_terminal_marker() {
        let q = Queue::new(8);
        for i in 0..5 {
            q.add(i).await.unwrap();
        }
        q.close().await;

        for i in 0..5 {
            assert_eq!(q.remove().await, Some(i));
        }
        assert_eq!(q.remove().await, None);
    }

    #[tokio::test]
    async fn add_after_close_fails() {
        let q = Queue::new(4);
        q.close().await;
        assert!(matches!(q.add(1).await, Err(QueueError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn closing_wakes_a_blocked_producer() {
        let q = Arc::new(Queue::new(1));
        q.add(1).await.unwrap();

        let q2 = Arc::clone(&q);
        let blocked = tokio::spawn(async move { q2.add(2).await });
        tokio::time::advance(Duration::from_millis(20)).await;

        q.close().await;
        assert!(matches!(blocked.await.unwrap(), Err(QueueError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn closing_wakes_a_blocked_consumer() {
        let q: Arc<Queue<i32>> = Arc::new(Queue::new(4));
        let q2 = Arc::clone(&q);
        let blocked = tokio::spawn(async move { q2.remove().await });
        tokio::time::advance(Duration::from_millis(20)).await;

        q.close().await;
        assert_eq!(blocked.await.unwrap(), None);
    }
}
