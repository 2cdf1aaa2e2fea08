//! Direct subprocess execution for accepted commands.
//!
//! The accepted token vector is passed as argv; no shell ever interposes.
//! Every child is bounded three ways: wall-clock timeout, CPU-time rlimit
//! (Unix), and a capped output buffer that truncates instead of applying
//! backpressure.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use crate::ToolError;

/// Bounds applied to one spawned child.
#[derive(Debug, Clone, Copy)]
pub struct ExecLimits {
    pub wall_clock: Duration,
    pub cpu_seconds: u64,
    pub max_output_bytes: usize,
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self {
            wall_clock: Duration::from_secs(30),
            cpu_seconds: 30,
            max_output_bytes: 200_000,
        }
    }
}

/// Terminal state of a spawned call.
#[derive(Debug)]
pub struct ExecOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
    pub timed_out: bool,
}

/// RAII guard that kills the child's whole process group on drop.
///
/// Wrap immediately after `spawn()` so cancellation (operator interrupt or
/// timeout) cannot orphan a runaway child. `disarm()` after a normal exit.
struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    fn child_mut(&mut self) -> &mut Child {
        self.child.as_mut().expect("child present")
    }

    fn disarm(&mut self) {
        self.child = None;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                unsafe {
                    if libc::killpg(pid as i32, libc::SIGKILL) == -1 {
                        let _ = child.start_kill();
                    }
                }
            }
            let _ = child.try_wait();
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
            let _ = child.try_wait();
        }
    }
}

/// Spawn `program` with `args`, pinned to `cwd`, under `env` only.
///
/// Timeout is a terminal state, not an error: the caller turns it into a
/// `timed_out` result that is reinjected so the model can recover.
pub async fn spawn_argv(
    program: &Path,
    args: &[String],
    cwd: &Path,
    env: &[(String, String)],
    limits: ExecLimits,
) -> Result<ExecOutcome, ToolError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .current_dir(cwd)
        .env_clear()
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;

        let cpu_seconds = limits.cpu_seconds;
        unsafe {
            command.as_std_mut().pre_exec(move || {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                let rlimit = libc::rlimit {
                    rlim_cur: cpu_seconds,
                    rlim_max: cpu_seconds,
                };
                if libc::setrlimit(libc::RLIMIT_CPU, &raw const rlimit) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let child = command.spawn().map_err(|e| ToolError::ExecutionFailed {
        tool: program.display().to_string(),
        message: e.to_string(),
    })?;
    let mut guard = ChildGuard::new(child);

    let stdout = guard.child_mut().stdout.take().ok_or_else(|| failed(program, "stdout"))?;
    let stderr = guard.child_mut().stderr.take().ok_or_else(|| failed(program, "stderr"))?;

    let collect = async {
        // Drain both pipes concurrently so a full stderr cannot deadlock a
        // child still writing stdout.
        let ((stdout, stdout_truncated), (stderr, stderr_truncated)) = tokio::join!(
            read_capped(stdout, limits.max_output_bytes),
            read_capped(stderr, limits.max_output_bytes)
        );
        let status = guard.child_mut().wait().await;
        (stdout, stderr, stdout_truncated || stderr_truncated, status)
    };

    match tokio::time::timeout(limits.wall_clock, collect).await {
        Ok((stdout, stderr, truncated, status)) => {
            guard.disarm();
            let status = status.map_err(|e| ToolError::ExecutionFailed {
                tool: program.display().to_string(),
                message: e.to_string(),
            })?;
            Ok(ExecOutcome {
                exit_code: status.code(),
                stdout,
                stderr,
                truncated,
                timed_out: false,
            })
        }
        Err(_) => {
            // Guard drop kills the process group.
            drop(guard);
            Ok(ExecOutcome {
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                truncated: false,
                timed_out: true,
            })
        }
    }
}

fn failed(program: &Path, stream: &str) -> ToolError {
    ToolError::ExecutionFailed {
        tool: program.display().to_string(),
        message: format!("failed to capture {stream}"),
    }
}

/// Read a stream to EOF, keeping at most `cap` bytes.
///
/// Draining continues past the cap so the child never blocks on a full pipe.
async fn read_capped<R: tokio::io::AsyncRead + Unpin>(mut stream: R, cap: usize) -> (String, bool) {
    let mut collected: Vec<u8> = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if collected.len() < cap {
                    let take = n.min(cap - collected.len());
                    collected.extend_from_slice(&buf[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }
    (String::from_utf8_lossy(&collected).into_owned(), truncated)
}
