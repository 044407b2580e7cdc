use std::{io::ErrorKind, process::ExitStatus, process::Stdio, sync::Arc, time::Duration};

use itertools::Itertools;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, Command},
    sync::Mutex,
    task::JoinHandle,
    time::{Instant, timeout},
};

use crate::core::{
    domain::{Stage, StageResult},
    errors::SupervisorError,
    traits::supervisor::Supervisor,
};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Runs stages as plain child processes of this one.
///
/// Each child gets its own process group so that a timeout can take down
/// everything it spawned. Descendants that move to another session escape
/// the group and are not tracked.
#[derive(Clone, Debug)]
pub struct NativeSupervisor {
    kill_grace: Duration,
    output_limit_bytes: usize,
}

impl NativeSupervisor {
    pub fn new(kill_grace: Duration, output_limit_bytes: usize) -> Self {
        NativeSupervisor {
            kill_grace,
            output_limit_bytes,
        }
    }
}

#[async_trait::async_trait]
impl Supervisor for NativeSupervisor {
    #[tracing::instrument(skip(self, stage, stdin), fields(kind = ?stage.kind))]
    async fn run(&self, stage: &Stage, stdin: &str) -> Result<StageResult, SupervisorError> {
        let (program, args) = stage
            .command
            .split_first()
            .ok_or(SupervisorError::EmptyCommand)?;

        tracing::debug!(
            command = %stage.command.iter().join(" "),
            timeout_ms = stage.timeout.as_millis() as u64,
            "Starting stage"
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&stage.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| SupervisorError::Spawn {
            program: program.clone(),
            msg: e.to_string(),
        })?;
        let pid = child.id();

        let feeder = feed_stdin(&mut child, stdin);
        let mut stdout = Capture::start(child.stdout.take(), self.output_limit_bytes);
        let mut stderr = Capture::start(child.stderr.take(), self.output_limit_bytes);

        let (status, timed_out) = match timeout(stage.timeout, child.wait()).await {
            Ok(Ok(status)) => (Some(status), false),
            Ok(Err(e)) => {
                terminate(&mut child, pid);
                if let Some(feeder) = feeder {
                    feeder.abort();
                }
                stdout.abort();
                stderr.abort();
                return Err(SupervisorError::Wait { msg: e.to_string() });
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = stage.timeout.as_millis() as u64,
                    "Stage timed out, killing process group"
                );
                terminate(&mut child, pid);
                let status = timeout(self.kill_grace, child.wait())
                    .await
                    .ok()
                    .and_then(Result::ok);
                if status.is_none() {
                    tracing::error!("Process did not exit after kill");
                }
                (status, true)
            }
        };

        if let Some(feeder) = feeder {
            feeder.abort();
        }

        // Whatever the leader left running in its group dies with it, even on
        // a clean exit. Pipe contents written before the kill stay readable.
        if let Some(pid) = pid {
            kill_group(pid);
        }
        if !drain(&mut stdout, &mut stderr, self.kill_grace).await {
            tracing::warn!("Output pipes still open after group kill");
            stdout.abort();
            stderr.abort();
        }

        let (stdout, stdout_truncated) = stdout.into_text().await;
        let (stderr, stderr_truncated) = stderr.into_text().await;
        let result = StageResult {
            stdout,
            stderr,
            exit_code: status.and_then(|s| s.code()),
            signal: status.and_then(exit_signal),
            timed_out,
            truncated: stdout_truncated || stderr_truncated,
            elapsed: started.elapsed(),
        };
        tracing::debug!(
            exit_code = ?result.exit_code,
            signal = ?result.signal,
            timed_out = result.timed_out,
            truncated = result.truncated,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Stage finished"
        );

        Ok(result)
    }
}

/// Writes stdin on its own task so a child that never reads cannot block
/// the wait. Dropping the handle closes the pipe and signals EOF.
fn feed_stdin(child: &mut Child, stdin: &str) -> Option<JoinHandle<()>> {
    let mut handle = child.stdin.take()?;
    let data = stdin.as_bytes().to_vec();

    Some(tokio::spawn(async move {
        if let Err(e) = handle.write_all(&data).await {
            if e.kind() != ErrorKind::BrokenPipe {
                tracing::debug!(error = %e, "Failed to write stdin");
            }
        }
    }))
}

/// A stream being collected into memory, capped at a byte limit. Bytes past
/// the limit are read and discarded so the writer never stalls.
struct Capture {
    buf: Arc<Mutex<Captured>>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Capture {
    fn start<R>(reader: Option<R>, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Captured::default()));
        let sink = buf.clone();

        let task = tokio::spawn(async move {
            let Some(mut reader) = reader else {
                return;
            };

            let mut chunk = [0u8; READ_CHUNK_BYTES];
            loop {
                let n = match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        tracing::debug!(error = %e, "Failed to read child output");
                        break;
                    }
                };

                let mut sink = sink.lock().await;
                let room = limit.saturating_sub(sink.bytes.len());
                if n > room {
                    sink.truncated = true;
                }
                sink.bytes.extend_from_slice(&chunk[..n.min(room)]);
            }
        });

        Capture { buf, task }
    }

    async fn wait(&mut self) {
        // A JoinHandle must not be polled again once it has yielded.
        if !self.task.is_finished() {
            let _ = (&mut self.task).await;
        }
    }

    /// Stops reading. Bytes captured so far are kept.
    fn abort(&self) {
        self.task.abort();
    }

    /// Decoded text and whether the limit cut it short. A multi-byte
    /// character split by the cut is dropped rather than replaced.
    async fn into_text(self) -> (String, bool) {
        let Captured {
            mut bytes,
            truncated,
        } = std::mem::take(&mut *self.buf.lock().await);
        let split_char = match std::str::from_utf8(&bytes) {
            Err(e) if truncated && e.error_len().is_none() => Some(e.valid_up_to()),
            _ => None,
        };
        if let Some(end) = split_char {
            bytes.truncate(end);
        }
        (String::from_utf8_lossy(&bytes).into_owned(), truncated)
    }
}

/// Waits for both captures to hit EOF. Returns false if the grace period ran
/// out first.
async fn drain(stdout: &mut Capture, stderr: &mut Capture, grace: Duration) -> bool {
    timeout(grace, async {
        stdout.wait().await;
        stderr.wait().await;
    })
    .await
    .is_ok()
}

fn terminate(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        kill_group(pid);
    }
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "Failed to kill child");
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::{
        sys::signal::{Signal, killpg},
        unistd::Pid,
    };

    // The child was started with `process_group(0)`, so its pid is the pgid.
    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        tracing::debug!(error = %e, pgid = pid, "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}
