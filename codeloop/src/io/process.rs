//! Child processes with a wall-clock timeout and bounded output capture.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, error, instrument, warn};

/// Exit code reported for a child killed by the timeout (matches coreutils `timeout`).
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported for a child that ended by a signal without an exit status.
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// How long to keep draining pipes after a timeout kill.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// The process group led by a spawned child.
///
/// The child is its own group leader, so everything it forks shares the group
/// unless it deliberately leaves. Dropping the guard kills the whole group,
/// which covers normal return, timeout and cancellation of the owning future.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn kill(&self) {
        if let Some(pgid) = self.pgid {
            kill_group(pgid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        warn!(pgid, "process group id out of range");
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        // ESRCH: every member is already gone.
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!(pgid, err = %err, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

/// Captured child process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.stdout_truncated > 0 {
            text.push_str(&format!(
                "\n[stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        text
    }

    pub fn stderr_lossy(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        if self.stderr_truncated > 0 {
            text.push_str(&format!(
                "\n[stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        text
    }
}

#[derive(Debug, Default)]
struct Capture {
    buf: Vec<u8>,
    truncated: usize,
    limit: usize,
}

impl Capture {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let remaining = self.limit.saturating_sub(self.buf.len());
        let keep = chunk.len().min(remaining);
        self.buf.extend_from_slice(&chunk[..keep]);
        self.truncated += chunk.len() - keep;
    }

    /// Read until EOF. Bytes read so far stay in the buffer if the future is dropped.
    async fn drain<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> std::io::Result<()> {
        let mut chunk = [0u8; 8192];
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            self.push(&chunk[..n]);
        }
    }
}

/// Run a command with a timeout, capturing stdout/stderr concurrently.
///
/// `output_limit_bytes` bounds what is kept per stream; the rest is drained and
/// counted. On timeout the child is killed and reaped, and whatever output was
/// captured before the kill is returned with `timed_out = true`.
///
/// On unix the child leads a new process group, and the group is killed once
/// the child exits, on timeout, and when this future is dropped. Background
/// processes it started do not outlive the call.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes = output_limit_bytes))]
pub async fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };
    let group = ProcessGroup { pgid: child.id() };

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let mut out = Capture::new(output_limit_bytes);
    let mut err = Capture::new(output_limit_bytes);

    let finished = tokio::time::timeout(timeout, async {
        let (out_res, err_res, status) = tokio::join!(
            out.drain(&mut stdout),
            err.drain(&mut stderr),
            async {
                let status = child.wait().await;
                // Leftover background processes would keep the pipes open.
                group.kill();
                status
            },
        );
        out_res.context("read stdout")?;
        err_res.context("read stderr")?;
        status.context("wait for command")
    })
    .await;

    let (exit_code, timed_out) = match finished {
        Ok(status) => (status?.code().unwrap_or(SIGNAL_EXIT_CODE), false),
        Err(_) => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            group.kill();
            child.kill().await.context("kill command")?;
            // Descendants that left the group may still hold the pipes open.
            let _ = tokio::time::timeout(DRAIN_GRACE, async {
                let _ = tokio::join!(out.drain(&mut stdout), err.drain(&mut stderr));
            })
            .await;
            (TIMEOUT_EXIT_CODE, true)
        }
    };

    if out.truncated > 0 || err.truncated > 0 {
        warn!(
            stdout_truncated = out.truncated,
            stderr_truncated = err.truncated,
            "output truncated"
        );
    }

    debug!(exit_code, timed_out, "command finished");
    Ok(CommandOutput {
        exit_code,
        stdout: out.buf,
        stderr: err.buf,
        stdout_truncated: out.truncated,
        stderr_truncated: err.truncated,
        timed_out,
    })
}
