//! Routes decoded payloads to the request tracker or the notification hook

use super::notification::NotificationHandler;
use super::tracker::RequestTracker;
use crate::protocol::RpcMessage;
use tracing::{debug, warn};

/// What happened to one inbound payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Routed {
    /// Completed a pending request
    Resolved,
    /// Response for an id nobody is waiting on
    Unmatched,
    /// Passed to the notification handler
    Notification,
    /// Peer-initiated request; this client does not serve requests
    PeerRequest,
    /// Not a valid JSON-RPC message
    Malformed,
}

/// Route one payload. Never panics and never fails the connection.
pub(crate) fn route_payload(
    payload: &[u8],
    tracker: &RequestTracker,
    notifications: &dyn NotificationHandler,
) -> Routed {
    let message = match RpcMessage::parse(payload) {
        Ok(message) => message,
        Err(e) => {
            warn!(
                "Dropping undecodable message ({}): {}",
                e,
                String::from_utf8_lossy(&payload[..payload.len().min(200)])
            );
            return Routed::Malformed;
        }
    };

    match message {
        RpcMessage::Response(response) => {
            if tracker.resolve(response) {
                Routed::Resolved
            } else {
                Routed::Unmatched
            }
        }
        RpcMessage::Notification(notification) => {
            notifications.handle(&notification.method, notification.params);
            Routed::Notification
        }
        RpcMessage::Request(request) => {
            debug!(
                "Ignoring peer request {} ({})",
                request.id, request.method
            );
            Routed::PeerRequest
        }
    }
}
