//! A single pool worker.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use super::{Job, JobHandler};

/// One of W concurrent executors of the agent pipeline.
///
/// A worker advertises availability by sending a fresh single-slot inbox
/// into the dispatcher's pool channel, then waits on that inbox. Each
/// advertised inbox is consumed by at most one handoff, so the pool never
/// holds stale entries.
pub(super) struct Worker {
    id: usize,
    pool_tx: mpsc::Sender<mpsc::Sender<Job>>,
    quit_rx: watch::Receiver<bool>,
    handler: Arc<dyn JobHandler>,
}

impl Worker {
    pub(super) fn new(
        id: usize,
        pool_tx: mpsc::Sender<mpsc::Sender<Job>>,
        quit_rx: watch::Receiver<bool>,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        Self {
            id,
            pool_tx,
            quit_rx,
            handler,
        }
    }

    pub(super) async fn run(mut self) {
        tracing::debug!(worker = self.id, "worker started");
        loop {
            let (inbox_tx, mut inbox_rx) = mpsc::channel::<Job>(1);
            if self.pool_tx.send(inbox_tx).await.is_err() {
                // Dispatcher is gone.
                break;
            }

            tokio::select! {
                job = inbox_rx.recv() => {
                    if let Some(job) = job {
                        let queued_ms =
                            (chrono::Utc::now() - job.received_at).num_milliseconds();
                        tracing::info!(worker = self.id, job_id = %job.id, queued_ms, "job picked up");
                        // Runs to completion even if the quit signal arrives
                        // mid-job; the agent deadline still bounds it.
                        self.handler.run(job).await;
                    }
                }
                _ = self.quit_rx.changed() => {
                    // Idle worker: exit immediately.
                    break;
                }
            }

            if *self.quit_rx.borrow() {
                break;
            }
        }
        tracing::debug!(worker = self.id, "worker stopped");
    }
}
