//! Bounded job queue between ingress and the dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::Job;
use crate::error::QueueError;

/// Producer handle to the shared job queue.
///
/// Cloneable. `close` is called exactly once, by the shutdown sequence;
/// submissions after that fail with a recoverable error instead of being
/// dropped silently. Submissions while the queue is full block the caller,
/// which is why ingress submits from a detached task.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    closed: Arc<AtomicBool>,
}

impl JobQueue {
    /// Create the queue; the receiving half goes to the dispatcher.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Submit a job, waiting while the queue is at capacity.
    pub async fn submit(&self, job: Job) -> Result<(), QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        self.tx.send(job).await.map_err(|_| QueueError::Closed)
    }

    /// Stop accepting submissions.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_then_receive() {
        let (queue, mut rx) = JobQueue::new(2);
        queue.submit(Job::new("a", "text")).await.unwrap();

        let job = rx.recv().await.unwrap();
        assert_eq!(job.id, "a");
    }

    #[tokio::test]
    async fn submit_after_close_is_recoverable() {
        let (queue, _rx) = JobQueue::new(2);
        queue.close();

        let err = queue.submit(Job::new("a", "text")).await.unwrap_err();
        assert!(matches!(err, QueueError::Closed));
    }

    #[tokio::test]
    async fn submit_after_receiver_dropped_is_recoverable() {
        let (queue, rx) = JobQueue::new(2);
        drop(rx);

        let err = queue.submit(Job::new("a", "text")).await.unwrap_err();
        assert!(matches!(err, QueueError::Closed));
    }

    #[tokio::test]
    async fn full_queue_blocks_until_drained() {
        let (queue, mut rx) = JobQueue::new(1);
        queue.submit(Job::new("a", "t")).await.unwrap();

        let blocked = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.submit(Job::new("b", "t")).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        rx.recv().await.unwrap();
        blocked.await.unwrap().unwrap();
    }
}
