//! Per-job execution pipeline.
//!
//! Validation, the agent run, result persistence, and webhook notification
//! for a single job. Every step leaves a visible trace in the job store;
//! store write failures are logged and never abort the pipeline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{Job, JobHandler};
use crate::agent::AgentRunner;
use crate::config::AppConfig;
use crate::slack::{self, Notifier};
use crate::store::{JobRecord, JobStatus, JobStore};

/// Cadence of progress updates while the agent runs.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(120);

/// Cap on progress updates. Slack allows five response-URL calls per
/// command; one is reserved for the final message.
const MAX_PROGRESS_UPDATES: u32 = 4;

pub struct TaskExecutor {
    config: AppConfig,
    store: Arc<dyn JobStore>,
    runner: AgentRunner,
    notifier: Notifier,
}

impl TaskExecutor {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn JobStore>,
        runner: AgentRunner,
        notifier: Notifier,
    ) -> Self {
        Self {
            config,
            store,
            runner,
            notifier,
        }
    }

    async fn execute(&self, job: Job) {
        let prompt = job.text.trim().to_string();
        if prompt.is_empty() {
            let msg = "instruction is empty; usage: `/cursor <natural-language prompt>`";
            tracing::warn!(job_id = %job.id, "rejecting job: empty instruction");
            self.record_rejected(&job, "", msg).await;
            if let Some(url) = &job.response_url {
                self.notifier.send(url, &format!("❌ {msg}")).await;
            }
            return;
        }

        // Snapshot once; a concurrent set-path must not move this job.
        let Some(project_path) = self.config.project_path().await else {
            let msg = "project path is not set; run `/cursor set-path <path>` \
                       or POST /api/config/project-path first";
            tracing::warn!(job_id = %job.id, "rejecting job: project path unset");
            self.record_rejected(&job, "", msg).await;
            if let Some(url) = &job.response_url {
                self.notifier.send(url, &format!("❌ {msg}")).await;
            }
            return;
        };

        let record = JobRecord::new(&job.id, &prompt, &project_path, &job.user_id, &job.user_name);
        if let Err(e) = self.store.create(&record).await {
            tracing::error!(job_id = %job.id, "failed to create job record: {e}");
        }
        if let Err(e) = self.store.transition_status(&job.id, JobStatus::Running).await {
            tracing::error!(job_id = %job.id, "failed to mark job running: {e}");
        }

        let progress = job
            .response_url
            .as_ref()
            .map(|url| self.spawn_progress_ticker(&job.id, url.clone()));

        let result = self
            .runner
            .run(&job.id, &prompt, Path::new(&project_path))
            .await;

        if let Some((stop_tx, handle)) = progress {
            let _ = stop_tx.send(());
            let _ = handle.await;
        }

        match result {
            Ok(output) => {
                tracing::info!(job_id = %job.id, output_bytes = output.len(), "agent run completed");
                self.persist(&job.id, &output, "", JobStatus::Completed).await;
                if let Some(url) = &job.response_url {
                    let message = slack::format_success(&job.id, &prompt, &output);
                    self.notifier.send_chunked(url, &message).await;
                }
            }
            Err(err) => {
                let output = err.output().unwrap_or("").to_string();
                tracing::warn!(job_id = %job.id, "agent run failed: {err}");
                self.persist(&job.id, &output, &err.to_string(), JobStatus::Failed)
                    .await;
                if let Some(url) = &job.response_url {
                    let message = slack::format_error(&job.id, &err.to_string(), &output);
                    self.notifier.send_chunked(url, &message).await;
                }
            }
        }
    }

    /// Persist a job rejected before any agent run: pending → failed, no
    /// `running` transition.
    async fn record_rejected(&self, job: &Job, project_path: &str, error: &str) {
        let record = JobRecord::new(
            &job.id,
            job.text.trim(),
            project_path,
            &job.user_id,
            &job.user_name,
        );
        if let Err(e) = self.store.create(&record).await {
            tracing::error!(job_id = %job.id, "failed to create job record: {e}");
        }
        if let Err(e) = self.store.set_result(&job.id, "", error).await {
            tracing::error!(job_id = %job.id, "failed to record rejection: {e}");
        }
        if let Err(e) = self.store.transition_status(&job.id, JobStatus::Failed).await {
            tracing::error!(job_id = %job.id, "failed to mark job failed: {e}");
        }
    }

    /// Result first, terminal status second: observers that see a terminal
    /// status always see its result.
    async fn persist(&self, id: &str, output: &str, error: &str, status: JobStatus) {
        if let Err(e) = self.store.set_result(id, output, error).await {
            tracing::error!(job_id = %id, "failed to record result: {e}");
        }
        if let Err(e) = self.store.transition_status(id, status).await {
            tracing::error!(job_id = %id, "failed to record terminal status: {e}");
        }
    }

    /// Cooperative progress ticker. The executor owns both ends: the
    /// returned sender stops it, the handle is awaited for a clean join.
    fn spawn_progress_ticker(
        &self,
        job_id: &str,
        url: String,
    ) -> (oneshot::Sender<()>, JoinHandle<()>) {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let notifier = self.notifier.clone();
        let job_id = job_id.to_string();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(
                tokio::time::Instant::now() + PROGRESS_INTERVAL,
                PROGRESS_INTERVAL,
            );
            let mut sent = 0u32;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        if sent >= MAX_PROGRESS_UPDATES {
                            break;
                        }
                        sent += 1;
                        let minutes = (u64::from(sent) * PROGRESS_INTERVAL.as_secs()) / 60;
                        notifier
                            .send(&url, &format!("⏳ elapsed {minutes} minutes, still working..."))
                            .await;
                    }
                }
            }
            tracing::debug!(job_id = %job_id, updates = sent, "progress ticker stopped");
        });

        (stop_tx, handle)
    }
}

#[async_trait]
impl JobHandler for TaskExecutor {
    async fn run(&self, job: Job) {
        self.execute(job).await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::config::ALLOWED_RESPONSE_DOMAINS;
    use crate::store::SqliteStore;

    fn executor(project_path: Option<String>, cli_path: &str) -> (TaskExecutor, Arc<SqliteStore>) {
        let config = AppConfig::new(SecretString::new("secret".to_string()), project_path);
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let notifier = Notifier::new(
            ALLOWED_RESPONSE_DOMAINS.iter().map(|d| d.to_string()).collect(),
        );
        let exec = TaskExecutor::new(
            config,
            store.clone() as Arc<dyn JobStore>,
            AgentRunner::new(cli_path),
            notifier,
        );
        (exec, store)
    }

    #[tokio::test]
    async fn empty_instruction_fails_without_agent_run() {
        // A nonexistent CLI would surface as a start error if it were run.
        let (exec, store) = executor(Some("/tmp".to_string()), "/no/such/binary");

        exec.run(Job::new("j1", "   ")).await;

        let rec = store.get("j1").await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Failed);
        assert!(rec.error.contains("empty"));
        assert!(rec.started_at.is_none());
    }

    #[tokio::test]
    async fn unset_project_path_fails_without_agent_run() {
        let (exec, store) = executor(None, "/no/such/binary");

        exec.run(Job::new("j1", "do something")).await;

        let rec = store.get("j1").await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Failed);
        assert!(rec.error.contains("project path"));
        assert!(rec.started_at.is_none());
    }

    #[tokio::test]
    async fn successful_run_persists_output_and_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let (exec, store) = executor(Some(dir.path().display().to_string()), "/bin/echo");

        exec.run(Job::new("j1", "say hello").with_user("U1", "alice"))
            .await;

        let rec = store.get("j1").await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Completed);
        assert!(rec.output.contains("say hello"));
        assert_eq!(rec.error, "");
        assert!(rec.started_at.is_some());
        assert!(rec.completed_at.unwrap() >= rec.started_at.unwrap());
    }

    #[tokio::test]
    async fn start_failure_is_recorded_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let (exec, store) = executor(Some(dir.path().display().to_string()), "/no/such/binary");

        exec.run(Job::new("j1", "do something")).await;

        let rec = store.get("j1").await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Failed);
        assert!(rec.error.contains("failed to start agent"));
        assert!(rec.started_at.is_some());
    }

    #[tokio::test]
    async fn pipeline_runs_jobs_through_the_pool() {
        let dir = tempfile::tempdir().unwrap();
        let (exec, store) = executor(Some(dir.path().display().to_string()), "/bin/echo");
        let (queue, queue_rx) = crate::worker::JobQueue::new(4);
        let dispatcher = crate::worker::Dispatcher::start(queue_rx, 2, Arc::new(exec));

        for i in 0..4 {
            queue
                .submit(Job::new(format!("job-{i}"), format!("task {i}")))
                .await
                .unwrap();
        }

        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut terminal = 0;
            for i in 0..4 {
                if let Some(rec) = store.get(&format!("job-{i}")).await.unwrap() {
                    if rec.status.is_terminal() {
                        terminal += 1;
                    }
                }
            }
            if terminal == 4 {
                break;
            }
        }

        for i in 0..4 {
            let rec = store.get(&format!("job-{i}")).await.unwrap().unwrap();
            assert_eq!(rec.status, JobStatus::Completed);
            assert!(rec.output.contains(&format!("task {i}")));
        }
        assert!(dispatcher.stop(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn create_is_idempotent_with_api_precreated_record() {
        let dir = tempfile::tempdir().unwrap();
        let (exec, store) = executor(Some(dir.path().display().to_string()), "/bin/echo");

        // API ingress pre-creates the record before enqueueing.
        store
            .create(&JobRecord::new("j1", "say hello", "", "", ""))
            .await
            .unwrap();

        exec.run(Job::new("j1", "say hello")).await;

        let rec = store.get("j1").await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Completed);
        assert!(rec.output.contains("say hello"));
    }
}
