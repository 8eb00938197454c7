//! Supervision of the external cursor-agent process.
//!
//! One operation: run the agent with a fixed argv shape, a captured working
//! directory, and a hard wall-clock deadline. The child is placed in its own
//! process group at spawn time so the whole tree can be killed as a unit
//! when the deadline expires.

#[cfg(unix)]
#[path = "process_unix.rs"]
mod process;

#[cfg(windows)]
#[path = "process_windows.rs"]
mod process;

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::AgentError;

/// Hard wall-clock deadline for a single agent run.
pub const AGENT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// How long to wait for the child to be reaped after a group kill. If this
/// also expires we log and return anyway rather than hang a worker.
const KILL_WAIT: Duration = Duration::from_secs(2);

pub struct AgentRunner {
    cli_path: String,
    timeout: Duration,
}

impl AgentRunner {
    pub fn new(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
            timeout: AGENT_TIMEOUT,
        }
    }

    /// Override the run deadline. Used by tests; production keeps
    /// [`AGENT_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the agent once and return its combined stdout+stderr output
    /// (stdout first).
    pub async fn run(
        &self,
        job_id: &str,
        prompt: &str,
        project_dir: &Path,
    ) -> Result<String, AgentError> {
        let mut cmd = Command::new(&self.cli_path);
        cmd.arg("-p")
            .arg(prompt)
            .arg("--force")
            .arg("--output-format")
            .arg("text")
            .current_dir(project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        process::isolate(&mut cmd);

        tracing::info!(
            job_id = %job_id,
            cli = %self.cli_path,
            dir = %project_dir.display(),
            "starting agent run"
        );

        let mut child = cmd.spawn().map_err(|e| AgentError::StartFailed {
            reason: e.to_string(),
        })?;
        let pid = child.id();

        let out_task = spawn_reader(child.stdout.take());
        let err_task = spawn_reader(child.stderr.take());

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let output = collect(out_task, err_task).await;
                if status.success() {
                    Ok(output)
                } else {
                    Err(AgentError::ExitNonZero { status, output })
                }
            }
            Ok(Err(e)) => {
                let output = collect(out_task, err_task).await;
                tracing::error!(job_id = %job_id, output_bytes = output.len(), "agent wait failed: {e}");
                Err(AgentError::StartFailed {
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                tracing::warn!(
                    job_id = %job_id,
                    "agent run exceeded {} minutes, killing process group",
                    self.timeout.as_secs() / 60
                );
                if let Some(pid) = pid {
                    if let Err(e) = process::kill_tree(pid) {
                        tracing::warn!(job_id = %job_id, pid, "failed to kill process group: {e}");
                    }
                }
                if tokio::time::timeout(KILL_WAIT, child.wait()).await.is_err() {
                    tracing::warn!(job_id = %job_id, "timed out waiting for killed agent to be reaped");
                }
                let output = match tokio::time::timeout(KILL_WAIT, collect(out_task, err_task)).await
                {
                    Ok(output) => output,
                    Err(_) => {
                        tracing::warn!(job_id = %job_id, "agent output pipes never closed, dropping output");
                        String::new()
                    }
                };
                Err(AgentError::DeadlineExceeded { output })
            }
        }
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

/// Join both reader tasks and concatenate stdout before stderr.
async fn collect(out_task: JoinHandle<Vec<u8>>, err_task: JoinHandle<Vec<u8>>) -> String {
    let mut combined = out_task.await.unwrap_or_default();
    combined.extend(err_task.await.unwrap_or_default());
    String::from_utf8_lossy(&combined).into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    /// Write an executable shell script and return its path.
    fn script(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("fake-agent.sh");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{body}").unwrap();
        let mut perms = file.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[tokio::test]
    async fn captures_stdout_then_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let cli = script(dir.path(), "echo to-stdout\necho to-stderr 1>&2");

        let runner = AgentRunner::new(cli.display().to_string());
        let output = runner.run("j1", "do things", dir.path()).await.unwrap();

        let stdout_pos = output.find("to-stdout").unwrap();
        let stderr_pos = output.find("to-stderr").unwrap();
        assert!(stdout_pos < stderr_pos);
    }

    #[tokio::test]
    async fn passes_prompt_in_argv() {
        let dir = tempfile::tempdir().unwrap();
        let cli = script(dir.path(), "echo \"$@\"");

        let runner = AgentRunner::new(cli.display().to_string());
        let output = runner.run("j1", "fix main.rs", dir.path()).await.unwrap();

        assert!(output.contains("-p fix main.rs --force --output-format text"));
    }

    #[tokio::test]
    async fn nonexistent_binary_is_start_failed() {
        let dir = tempfile::tempdir().unwrap();
        let runner = AgentRunner::new("/no/such/agent/binary");

        let err = runner.run("j1", "p", dir.path()).await.unwrap_err();
        assert!(matches!(err, AgentError::StartFailed { .. }));
    }

    #[tokio::test]
    async fn nonzero_exit_carries_output() {
        let dir = tempfile::tempdir().unwrap();
        let cli = script(dir.path(), "echo partial work\nexit 3");

        let runner = AgentRunner::new(cli.display().to_string());
        let err = runner.run("j1", "p", dir.path()).await.unwrap_err();

        match err {
            AgentError::ExitNonZero { output, .. } => assert!(output.contains("partial work")),
            other => panic!("expected ExitNonZero, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_kills_the_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let cli = script(dir.path(), "echo before-sleep\nsleep 30\necho after-sleep");

        let runner = AgentRunner::new(cli.display().to_string())
            .with_timeout(Duration::from_millis(300));
        let start = std::time::Instant::now();
        let err = runner.run("j1", "p", dir.path()).await.unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(10));
        match err {
            AgentError::DeadlineExceeded { output } => {
                assert!(output.contains("before-sleep"));
                assert!(!output.contains("after-sleep"));
            }
            other => panic!("expected DeadlineExceeded, got {other:?}"),
        }
    }

    #[test]
    fn deadline_error_names_the_limit() {
        let err = AgentError::DeadlineExceeded {
            output: String::new(),
        };
        assert!(err.to_string().contains("15"));
    }
}
