//! Unix process-group isolation.

use tokio::process::Command;

/// Place the child in its own process group so its whole tree can be
/// signalled as a unit.
pub fn isolate(cmd: &mut Command) {
    cmd.process_group(0);
}

/// Kill the child's entire process group. Best-effort and time-bounded at
/// the call site.
pub fn kill_tree(pid: u32) -> std::io::Result<()> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    killpg(Pid::from_raw(pid as i32), Signal::SIGKILL).map_err(std::io::Error::from)
}
