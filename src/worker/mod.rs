//! Bounded worker pool for agent jobs.
//!
//! Jobs flow: ingress → [`JobQueue`] → [`Dispatcher`] → idle worker →
//! [`TaskExecutor`]. Each worker runs one job at a time; the pool size is
//! the concurrency bound on agent invocations.

mod dispatcher;
mod executor;
mod job;
mod queue;
mod worker;

pub use dispatcher::Dispatcher;
pub use executor::TaskExecutor;
pub use job::Job;
pub use queue::JobQueue;

use async_trait::async_trait;

/// What a worker does with a job it has been handed.
///
/// Seam between the pool plumbing and the execution pipeline; tests drive
/// the dispatcher with stub handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: Job);
}
