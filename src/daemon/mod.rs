//! Daemon lifecycle: detached start, graceful stop, liveness.
//!
//! The daemon is a detached child of the CLI process: new session, stdin
//! on the null device, stdout/stderr appended to today's log file. The PID
//! file under `$HOME/.nota` coordinates `start --daemon`, `stop` and
//! `status` across invocations.

pub mod pidfile;

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::vault::ENV_VAULT_ROOT;
pub use pidfile::{PidFile, PidFileError, PidStatus};

/// How long `stop` waits for a graceful exit before escalating.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// How long `stop` waits after SIGKILL.
pub const STOP_KILL_WAIT: Duration = Duration::from_millis(500);

/// Poll interval while waiting for the process to exit.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No daemon to stop (missing or stale PID file; stale files are
    /// removed).
    NotRunning,

    /// The daemon exited.
    Stopped {
        pid: i32,
        /// Whether SIGKILL was needed.
        forced: bool,
    },
}

/// Spawn the daemon child and record its PID.
///
/// Refuses when the PID file points at a live process. A stale PID file is
/// cleaned first. On a PID-file write failure the child is killed so no
/// untracked daemon is left behind.
pub fn start_daemon(pid_file: &PidFile, vault_root: &Path, log_path: &Path) -> Result<u32> {
    match pid_file.status()? {
        PidStatus::Running(pid) => {
            bail!("transcription service already running (PID {pid})");
        }
        PidStatus::Stale(_) => {
            pid_file.remove()?;
        }
        PidStatus::NotRunning => {}
    }

    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir).context("create log directory")?;
    }
    let stdout = open_log_append(log_path)?;
    let stderr = open_log_append(log_path)?;

    let exe = std::env::current_exe().context("resolve current executable")?;

    let mut cmd = Command::new(exe);
    cmd.args(["transcribe", "start", "--daemon-child"])
        .env(ENV_VAULT_ROOT, vault_root)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);

    {
        use std::os::unix::process::CommandExt;
        // SAFETY: setsid is async-signal-safe and the closure does nothing
        // else between fork and exec.
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
    }

    let mut child = cmd.spawn().context("spawn daemon process")?;
    let pid = child.id();

    if let Err(e) = pid_file.write(pid) {
        let _ = child.kill();
        let _ = child.wait();
        return Err(e).context("write PID file");
    }

    Ok(pid)
}

/// Stop the daemon tracked by `pid_file`: SIGTERM, poll for exit, escalate
/// to SIGKILL if the grace period runs out, then remove the PID file.
pub async fn stop(pid_file: &PidFile) -> Result<StopOutcome> {
    let pid = match pid_file.read() {
        Ok(pid) => pid,
        Err(PidFileError::NotFound) => return Ok(StopOutcome::NotRunning),
        Err(e) => return Err(e.into()),
    };

    if !pidfile::process_alive(pid) {
        pid_file.remove()?;
        return Ok(StopOutcome::NotRunning);
    }

    signal_process(pid, libc::SIGTERM).context("send SIGTERM")?;

    let mut forced = false;
    if !wait_for_exit(pid, STOP_GRACE).await {
        forced = true;
        // The process ignored SIGTERM; SIGKILL cannot be ignored.
        let _ = signal_process(pid, libc::SIGKILL);
        wait_for_exit(pid, STOP_KILL_WAIT).await;
    }

    pid_file.remove()?;
    Ok(StopOutcome::Stopped { pid, forced })
}

/// Poll until `pid` no longer exists or `timeout` elapses.
pub async fn wait_for_exit(pid: i32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if !pidfile::process_alive(pid) {
            return true;
        }
        tokio::time::sleep(STOP_POLL_INTERVAL).await;
    }

    !pidfile::process_alive(pid)
}

fn signal_process(pid: i32, signal: i32) -> std::io::Result<()> {
    // SAFETY: plain kill(2) call.
    let rc = unsafe { libc::kill(pid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

fn open_log_append(path: &Path) -> Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o644)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))
}
