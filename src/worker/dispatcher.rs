//! FIFO-to-idle-worker matching.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::worker::Worker;
use super::{Job, JobHandler};

/// Owns the worker tasks and the dispatch loop.
pub struct Dispatcher {
    quit_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn `count` workers and the dispatch loop reading from `queue_rx`.
    pub fn start(
        queue_rx: mpsc::Receiver<Job>,
        count: usize,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        let (quit_tx, quit_rx) = watch::channel(false);
        let (pool_tx, pool_rx) = mpsc::channel::<mpsc::Sender<Job>>(count);

        let mut handles = Vec::with_capacity(count + 1);
        for id in 1..=count {
            let worker = Worker::new(id, pool_tx.clone(), quit_rx.clone(), Arc::clone(&handler));
            handles.push(tokio::spawn(worker.run()));
        }
        handles.push(tokio::spawn(dispatch(queue_rx, pool_rx, quit_rx)));

        tracing::info!(workers = count, "dispatcher started");
        Self { quit_tx, handles }
    }

    /// Signal the dispatch loop and every worker, then wait for them with a
    /// bound. Mid-job workers finish their current job first. Returns false
    /// when the bound expired and the tasks were abandoned.
    pub async fn stop(self, limit: Duration) -> bool {
        let _ = self.quit_tx.send(true);
        match tokio::time::timeout(limit, join_all(self.handles)).await {
            Ok(_) => true,
            Err(_) => {
                tracing::warn!(?limit, "timed out waiting for workers, abandoning them");
                false
            }
        }
    }
}

async fn dispatch(
    mut queue_rx: mpsc::Receiver<Job>,
    mut pool_rx: mpsc::Receiver<mpsc::Sender<Job>>,
    mut quit_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            job = queue_rx.recv() => {
                let Some(job) = job else { break };
                // Wait here until a worker frees up; jobs admitted earlier
                // are always handed off earlier.
                let Some(inbox) = pool_rx.recv().await else { break };
                if inbox.send(job).await.is_err() {
                    tracing::warn!("worker inbox closed before handoff");
                }
            }
            _ = quit_rx.changed() => break,
        }
    }
    tracing::debug!("dispatch loop stopped");
}
