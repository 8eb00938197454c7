//! Windows process-tree termination.
//!
//! Windows has no process groups in the Unix sense; `taskkill /T` walks the
//! child tree rooted at the pid instead.

use tokio::process::Command;

pub fn isolate(_cmd: &mut Command) {}

pub fn kill_tree(pid: u32) -> std::io::Result<()> {
    std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output()
        .map(|_| ())
}
