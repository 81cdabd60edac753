//! Child process supervision
//!
//! Spawns the peer and runs the four tasks that service it:
//!
//! - **writer**: drains the outbound frame queue into the child's stdin
//! - **reader**: owns the accumulation buffer, decodes stdout, routes payloads
//! - **stderr**: forwards stderr lines to a [`StderrHandler`]
//! - **exit watcher**: owns the [`Child`], escalates shutdown (graceful
//!   signal, then kill after a grace period) and closes the connection when
//!   the process exits

use super::Shared;
use super::notification::{NotificationHandler, StderrHandler};
use super::router::route_payload;
use crate::config::ClientConfig;
use crate::error::{RpcError, RpcResult};
use crate::framing::{FrameDecoder, FramingMode};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Read size for stdout chunks
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Spawn the configured command with piped stdio.
///
/// The environment overlay is applied over the inherited environment, so
/// overrides win and everything else is passed through.
pub(crate) fn spawn_child(config: &ClientConfig) -> RpcResult<Child> {
    let program = config.resolved_command()?;
    let mut cmd = Command::new(&program);

    cmd.args(&config.args)
        .envs(&config.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(cwd) = &config.cwd {
        cmd.current_dir(cwd);
    }

    cmd.spawn().map_err(|e| {
        RpcError::connection(format!("Failed to spawn '{}': {}", program, e))
    })
}

/// Start the writer task and return the queue feeding it.
///
/// Dropping every sender lets the task flush what is queued and finish,
/// which closes the child's stdin.
pub(crate) fn start_writer(
    mut stdin: ChildStdin,
    label: String,
) -> (mpsc::UnboundedSender<Vec<u8>>, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Vec<u8>>();

    let task = tokio::spawn(async move {
        while let Some(frame) = receiver.recv().await {
            let written = async {
                stdin.write_all(&frame).await?;
                stdin.flush().await
            };
            if let Err(e) = written.await {
                warn!("Failed to write to '{}' stdin: {}", label, e);
                break;
            }
        }
        debug!("Writer for '{}' finished", label);
    });

    (sender, task)
}

/// Start the stdout reader task
pub(crate) fn start_reader(
    mut stdout: ChildStdout,
    framing: FramingMode,
    shared: Arc<Shared>,
    notifications: Arc<dyn NotificationHandler>,
) {
    let cancel = shared.cancel.clone();

    tokio::spawn(async move {
        let mut decoder = FrameDecoder::new(framing);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = stdout.read(&mut chunk) => read,
            };

            match read {
                Ok(0) => {
                    debug!("'{}' closed stdout", shared.label);
                    break;
                }
                Ok(n) => {
                    for payload in decoder.push(&chunk[..n]) {
                        route_payload(&payload, &shared.tracker, notifications.as_ref());
                    }
                }
                Err(e) => {
                    warn!("Error reading '{}' stdout: {}", shared.label, e);
                    break;
                }
            }
        }

        if !decoder.remainder().is_empty() {
            debug!(
                "Discarding {} bytes of incomplete frame from '{}'",
                decoder.remainder().len(),
                shared.label
            );
        }
    });
}

/// Start the stderr forwarding task
pub(crate) fn start_stderr(
    stderr: ChildStderr,
    cancel: CancellationToken,
    handler: Arc<dyn StderrHandler>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) => handler.handle(&line),
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped reading stderr: {}", e);
                    break;
                }
            }
        }
    });
}

/// Start the exit watcher. It owns the child until it has been reaped, then
/// cancels `exited`.
pub(crate) fn start_exit_watcher(
    mut child: Child,
    grace: Duration,
    shared: Arc<Shared>,
    exited: CancellationToken,
) {
    let cancel = shared.cancel.clone();

    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => terminate(&mut child, grace, &shared.label).await,
        };

        let reason = match status {
            Ok(status) => {
                info!("'{}' exited with {}", shared.label, status);
                format!("process exited with {}", status)
            }
            Err(e) => {
                warn!("Failed to wait for '{}': {}", shared.label, e);
                format!("process wait failed: {}", e)
            }
        };
        shared.close(&reason);
        exited.cancel();
    });
}

/// Graceful signal first, forced kill once `grace` has elapsed
async fn terminate(child: &mut Child, grace: Duration, label: &str) -> std::io::Result<ExitStatus> {
    send_graceful_signal(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!("'{}' still running after {:?}, killing", label, grace);
            child.kill().await?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn send_graceful_signal(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        // Already reaped
        return;
    };

    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => {
            warn!("Failed to SIGTERM process {}: {}", pid, e);
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn send_graceful_signal(child: &mut Child) {
    // No graceful signal outside unix; closing stdin is the polite request.
    let _ = child.start_kill();
}
