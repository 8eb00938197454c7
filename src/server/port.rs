//! Startup port guard.
//!
//! Refuses to boot on a port another process holds, optionally terminating
//! the holder first (`AUTO_KILL_PORT=true`).

use std::time::Duration;

use crate::error::ServerError;

pub async fn ensure_port_available(port: u16, auto_kill: bool) -> Result<(), ServerError> {
    if bind_probe(port) {
        return Ok(());
    }
    tracing::warn!(port, "port is already in use");

    let pids = find_port_holders(port).await;
    if pids.is_empty() {
        // Possibly a socket in TIME_WAIT; give the OS a moment and retry.
        tracing::info!(port, "no holder found, retrying shortly");
        tokio::time::sleep(Duration::from_secs(5)).await;
        if bind_probe(port) {
            return Ok(());
        }
        return Err(ServerError::PortInUse { port });
    }

    if !auto_kill {
        tracing::error!(
            port,
            ?pids,
            "set AUTO_KILL_PORT=true to terminate the holder, or pick another PORT"
        );
        return Err(ServerError::PortInUse { port });
    }

    for pid in &pids {
        tracing::info!(pid = *pid, "terminating port holder");
        kill_pid(*pid);
    }
    tokio::time::sleep(Duration::from_secs(2)).await;

    if bind_probe(port) {
        tracing::info!(port, "port freed");
        Ok(())
    } else {
        Err(ServerError::PortInUse { port })
    }
}

fn bind_probe(port: u16) -> bool {
    std::net::TcpListener::bind(("0.0.0.0", port)).is_ok()
}

#[cfg(unix)]
async fn find_port_holders(port: u16) -> Vec<i32> {
    let output = tokio::process::Command::new("lsof")
        .arg("-ti")
        .arg(format!(":{port}"))
        .output()
        .await;

    match output {
        Ok(out) => String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect(),
        Err(e) => {
            tracing::warn!("lsof lookup failed: {e}");
            Vec::new()
        }
    }
}

#[cfg(not(unix))]
async fn find_port_holders(_port: u16) -> Vec<i32> {
    Vec::new()
}

#[cfg(unix)]
fn kill_pid(pid: i32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // SIGTERM first so the holder can clean up, SIGKILL as the fallback.
    if kill(Pid::from_raw(pid), Signal::SIGTERM).is_err() {
        let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_pid(_pid: i32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn free_port_is_available() {
        // Bind to an ephemeral port, note it, and release it.
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(ensure_port_available(port, false).await.is_ok());
    }

    #[test]
    fn bind_probe_sees_a_holder() {
        let listener = std::net::TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(!bind_probe(port));
        drop(listener);
        assert!(bind_probe(port));
    }
}
