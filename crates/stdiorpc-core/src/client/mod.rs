//! Stdio JSON-RPC client
//!
//! Spawns a peer process and talks JSON-RPC 2.0 over its stdin/stdout.
//!
//! # Features
//! - Newline or `Content-Length` framing, chosen per connection
//! - Concurrent requests correlated purely by id
//! - Per-request timeouts
//! - Notification and stderr observers
//! - Graceful shutdown with a forced kill after a grace period

mod notification;
mod router;
mod supervisor;
mod tracker;

pub use notification::{
    LoggingNotificationHandler, LoggingStderrHandler, NotificationHandler, StderrHandler,
};
pub use tracker::IdStrategy;

use crate::config::ClientConfig;
use crate::error::{RpcError, RpcResult};
use crate::framing::{FramingMode, encode_frame};
use crate::protocol::{RpcNotification, RpcRequest};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use tracker::RequestTracker;

/// Connection lifecycle. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

/// State shared between the facade and the background tasks
pub(crate) struct Shared {
    pub(crate) label: String,
    framing: FramingMode,
    state: RwLock<ConnectionState>,
    pub(crate) tracker: RequestTracker,
    writer: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
    pub(crate) cancel: CancellationToken,
}

impl Shared {
    fn new(config: &ClientConfig) -> Self {
        Self {
            label: config.command.clone(),
            framing: config.framing,
            state: RwLock::new(ConnectionState::Idle),
            tracker: RequestTracker::new(config.id_strategy(), config.request_timeout()),
            writer: Mutex::new(None),
            writer_task: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Frame and queue one payload for the writer task
    fn send(&self, payload: &str) -> RpcResult<()> {
        let writer = self.writer.lock();
        let Some(sender) = writer.as_ref() else {
            return Err(RpcError::NotConnected);
        };
        sender
            .send(encode_frame(self.framing, payload))
            .map_err(|_| RpcError::disconnected("writer closed"))
    }

    /// Stop accepting frames and wait, at most `limit`, for the queued ones
    /// to reach the child. Ends with the child's stdin closed.
    async fn drain_writer(&self, limit: Duration) {
        drop(self.writer.lock().take());
        let task = self.writer_task.lock().take();
        let Some(task) = task else {
            return;
        };
        if tokio::time::timeout(limit, task).await.is_err() {
            warn!(
                "Writer for '{}' still busy after {:?}, abandoning queued frames",
                self.label, limit
            );
        }
    }

    /// Move to `Disconnected`, stop the tasks, and fail every pending request.
    ///
    /// Safe to call any number of times from any task.
    pub(crate) fn close(&self, reason: &str) {
        let previous = std::mem::replace(&mut *self.state.write(), ConnectionState::Disconnected);

        // Dropping the sender ends the writer, which closes the child's stdin
        drop(self.writer.lock().take());
        self.cancel.cancel();
        let rejected = self.tracker.reject_all(reason);

        match previous {
            ConnectionState::Connected | ConnectionState::Connecting => {
                info!(
                    "Disconnected from '{}' ({}), {} pending request(s) rejected",
                    self.label, reason, rejected
                );
            }
            ConnectionState::Idle | ConnectionState::Disconnected => {}
        }
    }
}

/// JSON-RPC client for a single child process
pub struct StdioRpcClient {
    config: ClientConfig,
    shared: Arc<Shared>,
    notifications: Arc<dyn NotificationHandler>,
    stderr: Arc<dyn StderrHandler>,
    pid: Mutex<Option<u32>>,
    exited: Mutex<Option<CancellationToken>>,
}

impl StdioRpcClient {
    /// Create an unconnected client
    pub fn new(config: ClientConfig) -> Self {
        let shared = Arc::new(Shared::new(&config));
        let stderr = Arc::new(LoggingStderrHandler::new(config.command.clone()));
        Self {
            config,
            shared,
            notifications: Arc::new(LoggingNotificationHandler),
            stderr,
            pid: Mutex::new(None),
            exited: Mutex::new(None),
        }
    }

    /// Observe peer notifications. Takes effect at `connect()`.
    pub fn with_notification_handler(mut self, handler: impl NotificationHandler + 'static) -> Self {
        self.notifications = Arc::new(handler);
        self
    }

    /// Observe the peer's stderr. Takes effect at `connect()`.
    pub fn with_stderr_handler(mut self, handler: impl StderrHandler + 'static) -> Self {
        self.stderr = Arc::new(handler);
        self
    }

    /// Connection parameters
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether requests can currently be sent
    pub fn is_connected(&self) -> bool {
        self.shared.state() == ConnectionState::Connected
    }

    /// OS process id of the child, once spawned
    pub fn pid(&self) -> Option<u32> {
        *self.pid.lock()
    }

    /// Spawn the peer and start servicing its streams.
    ///
    /// A client connects at most once. Any failure leaves it disconnected.
    #[instrument(skip(self), level = "debug")]
    pub async fn connect(&self) -> RpcResult<()> {
        {
            let mut state = self.shared.state.write();
            match *state {
                ConnectionState::Idle => *state = ConnectionState::Connecting,
                ConnectionState::Connecting | ConnectionState::Connected => {
                    return Err(RpcError::AlreadyConnected);
                }
                ConnectionState::Disconnected => {
                    return Err(RpcError::disconnected(
                        "client cannot be reused after disconnect",
                    ));
                }
            }
        }

        let limit = self.config.connect_timeout();
        let outcome = match tokio::time::timeout(limit, self.establish()).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::ConnectTimeout {
                millis: limit.as_millis() as u64,
            }),
        };

        if let Err(e) = &outcome {
            warn!("Failed to connect to '{}': {}", self.shared.label, e);
            self.shared.close(&format!("connect failed: {}", e));
        }
        outcome
    }

    async fn establish(&self) -> RpcResult<()> {
        self.config.validate()?;

        let mut child = supervisor::spawn_child(&self.config)?;
        *self.pid.lock() = child.id();

        let startup_grace = self.config.startup_grace();
        if startup_grace.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(startup_grace).await;
        }
        if let Some(status) = child.try_wait()? {
            return Err(RpcError::connection(format!(
                "'{}' exited during startup with {}",
                self.shared.label, status
            )));
        }

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RpcError::connection("Failed to get stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RpcError::connection("Failed to get stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RpcError::connection("Failed to get stderr"))?;
        let pid = child.id();

        let (writer, writer_task) = supervisor::start_writer(stdin, self.shared.label.clone());
        {
            let mut state = self.shared.state.write();
            if *state != ConnectionState::Connecting {
                // disconnect() won the race; the child dies with `child`
                return Err(RpcError::disconnected("disconnected while connecting"));
            }
            *self.shared.writer.lock() = Some(writer);
            *self.shared.writer_task.lock() = Some(writer_task);
            *state = ConnectionState::Connected;
        }

        supervisor::start_reader(
            stdout,
            self.config.framing,
            Arc::clone(&self.shared),
            Arc::clone(&self.notifications),
        );
        supervisor::start_stderr(stderr, self.shared.cancel.clone(), Arc::clone(&self.stderr));
        let exited = CancellationToken::new();
        supervisor::start_exit_watcher(
            child,
            self.config.kill_grace(),
            Arc::clone(&self.shared),
            exited.clone(),
        );
        *self.exited.lock() = Some(exited);

        info!(
            "Connected to '{}' (pid {:?}, {} framing)",
            self.shared.label, pid, self.config.framing
        );
        Ok(())
    }

    /// Send a request and wait for its result.
    ///
    /// Fails with the peer's error object, a timeout naming `method`, or a
    /// disconnected error. Other in-flight requests are unaffected.
    #[instrument(skip(self, params), level = "debug")]
    pub async fn request(&self, method: &str, params: Option<Value>) -> RpcResult<Value> {
        if !self.is_connected() {
            return Err(RpcError::NotConnected);
        }

        let (id, completion) = self.shared.tracker.register(method);
        let request = RpcRequest::new(id.clone(), method).with_params(params);

        let sent = serde_json::to_string(&request)
            .map_err(RpcError::from)
            .and_then(|payload| self.shared.send(&payload));
        if let Err(e) = sent {
            debug!("Failed to send request {} ({}): {}", id, method, e);
            self.shared.tracker.fail(&id, e);
        }

        completion
            .await
            .unwrap_or_else(|_| Err(RpcError::disconnected("request dropped")))
    }

    /// Send a request and deserialize its result
    pub async fn call<T>(&self, method: &str, params: Option<Value>) -> RpcResult<T>
    where
        T: DeserializeOwned,
    {
        let value = self.request(method, params).await?;
        serde_json::from_value(value).map_err(|e| {
            RpcError::serialization(format!("Failed to decode '{}' result: {}", method, e))
        })
    }

    /// Fire-and-forget notification. Dropped silently when not connected.
    pub fn notify(&self, method: &str, params: Option<Value>) {
        let notification = RpcNotification::new(method).with_params(params);
        let sent = serde_json::to_string(&notification)
            .map_err(RpcError::from)
            .and_then(|payload| self.shared.send(&payload));
        if let Err(e) = sent {
            debug!("Dropping notification {}: {}", method, e);
        }
    }

    /// Terminate the peer and fail all pending requests. Idempotent.
    ///
    /// The child gets a graceful signal now and is killed once the grace
    /// period expires; callers are never left waiting on either.
    pub fn disconnect(&self) {
        self.shared.close("client disconnected");
    }

    /// Orderly close: deliver queued messages, then stop the peer and wait
    /// until it has been reaped.
    ///
    /// Queued frames are flushed and stdin is closed so the peer can exit on
    /// its own; a peer still running after the kill grace gets the
    /// `disconnect` escalation. Returns at once if no child was ever started.
    pub async fn shutdown(&self) {
        let grace = self.config.kill_grace();
        self.shared.drain_writer(grace).await;

        let exited = self.exited.lock().clone();
        if let Some(exited) = &exited {
            if tokio::time::timeout(grace, exited.cancelled()).await.is_err() {
                debug!("'{}' still running after stdin closed", self.shared.label);
            }
        }

        self.shared.close("client shut down");
        if let Some(exited) = exited {
            exited.cancelled().await;
        }
    }

    #[cfg(test)]
    pub(crate) fn tracker_stats(&self) -> tracker::TrackerStats {
        self.shared.tracker.stats()
    }
}

impl Drop for StdioRpcClient {
    fn drop(&mut self) {
        self.shared.close("client dropped");
    }
}

impl std::fmt::Debug for StdioRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioRpcClient")
            .field("command", &self.config.command)
            .field("framing", &self.config.framing)
            .field("state", &self.state())
            .finish()
    }
}
