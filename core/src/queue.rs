//! Bounded in-process FIFO queue of entity ids, shared by all three
//! pipelines. The queue is the sole channel between a scheduler and its
//! worker pool: contents are always ids, never mutable objects, so a worker
//! always re-reads current state from the store before acting on one.

use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

#[derive(Clone)]
pub struct BoundedQueue {
    capacity: usize,
    sender: mpsc::Sender<String>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
    shutdown: Arc<Notify>,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            capacity,
            sender,
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ids currently buffered but not yet taken by a worker.
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.sender.capacity())
    }

    /// How many more ids the queue can currently accept.
    pub fn free_capacity(&self) -> usize {
        self.sender.capacity()
    }

    /// Non-blocking offer. Returns whether the id was accepted.
    pub fn offer(&self, id: String) -> bool {
        self.sender.try_send(id).is_ok()
    }

    /// Blocks until an id is available or the queue is shut down, in which
    /// case it returns `None`.
    pub async fn take(&self) -> Option<String> {
        let mut receiver = self.receiver.lock().await;
        tokio::select! {
            biased;
            _ = self.shutdown.notified() => None,
            id = receiver.recv() => id,
        }
    }

    /// Wakes every pending `take()` so worker loops can observe shutdown
    /// without waiting for a fresh id.
    pub fn shut_down(&self) {
        self.shutdown.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn respects_capacity_bound() {
        let q = BoundedQueue::new(2);
        assert!(q.offer("a".into()));
        assert!(q.offer("b".into()));
        assert!(!q.offer("c".into()), "third offer should be rejected at capacity 2");
    }

    #[tokio::test]
    async fn fifo_order() {
        let q = BoundedQueue::new(4);
        q.offer("first".into());
        q.offer("second".into());
        assert_eq!(q.take().await.as_deref(), Some("first"));
        assert_eq!(q.take().await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn free_capacity_tracks_offers() {
        let q = BoundedQueue::new(3);
        assert_eq!(q.free_capacity(), 3);
        q.offer("a".into());
        assert_eq!(q.free_capacity(), 2);
        q.take().await;
        assert_eq!(q.free_capacity(), 3);
    }

    #[tokio::test]
    async fn shutdown_unblocks_take() {
        let q = BoundedQueue::new(1);
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.take().await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        q.shut_down();
        let result = tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("take should return after shutdown")
            .unwrap();
        assert_eq!(result, None);
    }
}
