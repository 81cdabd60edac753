//! Pending-request bookkeeping: id issuance, correlation, and timeouts

use crate::error::{RpcError, RpcResult};
use crate::framing::FramingMode;
use crate::protocol::{RequestId, RpcResponse};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How request ids are generated for a connection.
///
/// Language servers expect small sequential integers; tool servers are
/// happy with opaque tokens. The choice is per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// Monotonically increasing integers starting at 1
    Sequential,
    /// Random v4 UUID strings
    Uuid,
}

impl IdStrategy {
    /// Conventional policy for a framing mode
    pub fn for_framing(mode: FramingMode) -> Self {
        match mode {
            FramingMode::ContentLength => Self::Sequential,
            FramingMode::Newline => Self::Uuid,
        }
    }
}

/// Receiving side of a pending request
pub(crate) type Completion = oneshot::Receiver<RpcResult<Value>>;

struct PendingRequest {
    method: String,
    sender: oneshot::Sender<RpcResult<Value>>,
    timer: JoinHandle<()>,
    created_at: Instant,
}

#[derive(Default)]
struct TrackerState {
    pending: HashMap<RequestId, PendingRequest>,
    created: u64,
    timers_fired: u64,
    timers_cancelled: u64,
}

/// Lifetime counters; `timers_fired + timers_cancelled == created` once idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct TrackerStats {
    pub created: u64,
    pub timers_fired: u64,
    pub timers_cancelled: u64,
    pub pending: usize,
}

/// Owns every in-flight request of one connection
pub(crate) struct RequestTracker {
    strategy: IdStrategy,
    next_id: AtomicI64,
    timeout: Duration,
    state: Arc<Mutex<TrackerState>>,
}

impl RequestTracker {
    pub(crate) fn new(strategy: IdStrategy, timeout: Duration) -> Self {
        Self {
            strategy,
            next_id: AtomicI64::new(1),
            timeout,
            state: Arc::new(Mutex::new(TrackerState::default())),
        }
    }

    fn next_id(&self) -> RequestId {
        match self.strategy {
            IdStrategy::Sequential => {
                RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
            }
            IdStrategy::Uuid => RequestId::String(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Issue an id and start its timeout timer. Must run inside a tokio runtime.
    pub(crate) fn register(&self, method: &str) -> (RequestId, Completion) {
        let id = self.next_id();
        let (sender, receiver) = oneshot::channel();

        // The timer is spawned under the lock so it cannot observe the map
        // before this entry is in it.
        let mut state = self.state.lock();
        let timer = tokio::spawn(expire_after(
            Arc::clone(&self.state),
            id.clone(),
            self.timeout,
        ));
        let pending = PendingRequest {
            method: method.to_string(),
            sender,
            timer,
            created_at: Instant::now(),
        };
        state.created += 1;
        if let Some(previous) = state.pending.insert(id.clone(), pending) {
            warn!("Request id {} reissued while still pending", id);
            previous.timer.abort();
            state.timers_cancelled += 1;
            let _ = previous
                .sender
                .send(Err(RpcError::protocol(format!("request id {} reissued", id))));
        }
        drop(state);

        debug!("Registered request {} ({})", id, method);
        (id, receiver)
    }

    /// Complete the matching request. Returns false for unknown or late ids.
    pub(crate) fn resolve(&self, response: RpcResponse) -> bool {
        let RpcResponse { id, outcome } = response;
        let Some(pending) = self.take(&id) else {
            debug!("Dropping response for unknown request {}", id);
            return false;
        };

        debug!(
            "Request {} ({}) completed in {:?}",
            id,
            pending.method,
            pending.created_at.elapsed()
        );
        let _ = pending.sender.send(outcome.map_err(RpcError::from));
        true
    }

    /// Fail one request immediately (e.g. the write could not be queued)
    pub(crate) fn fail(&self, id: &RequestId, error: RpcError) -> bool {
        match self.take(id) {
            Some(pending) => {
                let _ = pending.sender.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fail every pending request with a disconnected error
    pub(crate) fn reject_all(&self, reason: &str) -> usize {
        let drained: Vec<(RequestId, PendingRequest)> = {
            let mut state = self.state.lock();
            let drained: Vec<_> = state.pending.drain().collect();
            state.timers_cancelled += drained.len() as u64;
            drained
        };

        let count = drained.len();
        for (id, pending) in drained {
            pending.timer.abort();
            debug!("Cancelling pending request {} ({}): {}", id, pending.method, reason);
            let _ = pending.sender.send(Err(RpcError::disconnected(reason)));
        }
        count
    }

    fn take(&self, id: &RequestId) -> Option<PendingRequest> {
        let mut state = self.state.lock();
        let pending = state.pending.remove(id)?;
        pending.timer.abort();
        state.timers_cancelled += 1;
        Some(pending)
    }

    pub(crate) fn stats(&self) -> TrackerStats {
        let state = self.state.lock();
        TrackerStats {
            created: state.created,
            timers_fired: state.timers_fired,
            timers_cancelled: state.timers_cancelled,
            pending: state.pending.len(),
        }
    }
}

async fn expire_after(state: Arc<Mutex<TrackerState>>, id: RequestId, timeout: Duration) {
    tokio::time::sleep(timeout).await;

    let pending = {
        let mut state = state.lock();
        let pending = state.pending.remove(&id);
        if pending.is_some() {
            state.timers_fired += 1;
        }
        pending
    };

    if let Some(pending) = pending {
        warn!(
            "Request {} ({}) timed out after {:?}",
            id, pending.method, timeout
        );
        let millis = timeout.as_millis() as u64;
        let _ = pending
            .sender
            .send(Err(RpcError::timeout(pending.method, millis)));
    }
}
