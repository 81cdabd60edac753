//! Observer hooks for peer notifications and peer stderr

use serde_json::Value;
use tracing::debug;

/// Sync trait for handling peer-initiated notifications.
///
/// Called from the stdout reader task, so implementations should return
/// quickly and hand heavy work off to a channel.
pub trait NotificationHandler: Send + Sync {
    /// Handle a notification
    fn handle(&self, method: &str, params: Option<Value>);
}

impl<F> NotificationHandler for F
where
    F: Fn(&str, Option<Value>) + Send + Sync,
{
    fn handle(&self, method: &str, params: Option<Value>) {
        self(method, params)
    }
}

/// Default notification handler that logs notifications
pub struct LoggingNotificationHandler;

impl NotificationHandler for LoggingNotificationHandler {
    fn handle(&self, method: &str, params: Option<Value>) {
        debug!("Peer notification: {} {:?}", method, params);
    }
}

/// Receives the child's stderr, one line at a time. Never fatal.
pub trait StderrHandler: Send + Sync {
    /// Handle one line (without the trailing newline)
    fn handle(&self, line: &str);
}

impl<F> StderrHandler for F
where
    F: Fn(&str) + Send + Sync,
{
    fn handle(&self, line: &str) {
        self(line)
    }
}

/// Default stderr handler: forwards lines to `tracing` at debug level
pub struct LoggingStderrHandler {
    command: String,
}

impl LoggingStderrHandler {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl StderrHandler for LoggingStderrHandler {
    fn handle(&self, line: &str) {
        debug!(target: "stdiorpc::stderr", command = %self.command, "{}", line);
    }
}
