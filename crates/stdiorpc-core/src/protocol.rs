//! JSON-RPC 2.0 message types
//!
//! Inbound payloads are classified once, at the parse boundary, into
//! [`RpcMessage`]. Shapes that fit none of request, response, or
//! notification are rejected rather than defaulted.

use crate::error::{RpcError, RpcResult};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// JSON-RPC version
pub const JSONRPC_VERSION: &str = "2.0";

/// Request ID (can be string or number)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Number ID
    Number(i64),
    /// String ID
    String(String),
}

impl RequestId {
    fn from_value(value: Value) -> RpcResult<Self> {
        match value {
            Value::String(s) => Ok(Self::String(s)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Number)
                .ok_or_else(|| RpcError::protocol(format!("non-integer id: {}", n))),
            other => Err(RpcError::protocol(format!("invalid id type: {}", other))),
        }
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
        }
    }
}

/// JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version
    pub jsonrpc: String,
    /// Request ID
    pub id: RequestId,
    /// Method name
    pub method: String,
    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Create a new request
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params: None,
        }
    }

    /// Add parameters to the request
    pub fn with_params(mut self, params: Option<Value>) -> Self {
        self.params = params;
        self
    }
}

/// JSON-RPC notification (no id, no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNotification {
    /// JSON-RPC version
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcNotification {
    /// Create a new notification
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: None,
        }
    }

    /// Add parameters
    pub fn with_params(mut self, params: Option<Value>) -> Self {
        self.params = params;
        self
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i64,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Create a new error
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Add data to the error
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Method not found (-32601)
    pub fn method_not_found() -> Self {
        Self::new(-32601, "Method not found")
    }

    /// Invalid params (-32602)
    pub fn invalid_params() -> Self {
        Self::new(-32602, "Invalid params")
    }
}

impl From<JsonRpcError> for RpcError {
    fn from(err: JsonRpcError) -> Self {
        RpcError::server(err.code, err.message, err.data)
    }
}

/// JSON-RPC response. Exactly one of result or error, so the outcome is a `Result`.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    /// Request ID this response corresponds to
    pub id: RequestId,
    /// `Ok(result)` or `Err(error)`; a `null` result is `Ok(Value::Null)`
    pub outcome: Result<Value, JsonRpcError>,
}

impl RpcResponse {
    /// Create a success response
    pub fn success(id: impl Into<RequestId>, result: Value) -> Self {
        Self {
            id: id.into(),
            outcome: Ok(result),
        }
    }

    /// Create an error response
    pub fn error(id: impl Into<RequestId>, error: JsonRpcError) -> Self {
        Self {
            id: id.into(),
            outcome: Err(error),
        }
    }

    /// Get the result, consuming the response
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        self.outcome
    }
}

impl Serialize for RpcResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        map.serialize_entry("id", &self.id)?;
        match &self.outcome {
            Ok(result) => map.serialize_entry("result", result)?,
            Err(error) => map.serialize_entry("error", error)?,
        }
        map.end()
    }
}

/// A classified inbound or outbound JSON-RPC message
#[derive(Debug, Clone)]
pub enum RpcMessage {
    /// Request message (method + id)
    Request(RpcRequest),
    /// Response message (id + result or error)
    Response(RpcResponse),
    /// Notification message (method, no id)
    Notification(RpcNotification),
}

impl RpcMessage {
    /// Parse and classify a decoded payload
    pub fn parse(payload: impl AsRef<[u8]>) -> RpcResult<Self> {
        let value: Value = serde_json::from_slice(payload.as_ref())
            .map_err(|e| RpcError::protocol(format!("invalid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Classify an already-parsed JSON value
    pub fn from_value(value: Value) -> RpcResult<Self> {
        let Value::Object(mut obj) = value else {
            return Err(RpcError::protocol("message is not a JSON object"));
        };

        if let Some(version) = obj.get("jsonrpc") {
            if version.as_str() != Some(JSONRPC_VERSION) {
                return Err(RpcError::protocol(format!(
                    "unsupported jsonrpc version: {}",
                    version
                )));
            }
        }

        // A null id is what peers send when they could not read ours; treat it as absent.
        let id = match obj.remove("id") {
            None | Some(Value::Null) => None,
            Some(v) => Some(RequestId::from_value(v)?),
        };

        let method = match obj.remove("method") {
            None => None,
            Some(Value::String(m)) => Some(m),
            Some(other) => {
                return Err(RpcError::protocol(format!("invalid method: {}", other)));
            }
        };

        let params = obj.remove("params");

        match (method, id) {
            (Some(method), Some(id)) => Ok(Self::Request(RpcRequest {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id,
                method,
                params,
            })),
            (Some(method), None) => Ok(Self::Notification(RpcNotification {
                jsonrpc: JSONRPC_VERSION.to_string(),
                method,
                params,
            })),
            (None, Some(id)) => Ok(Self::Response(RpcResponse {
                outcome: Self::response_outcome(&mut obj)?,
                id,
            })),
            (None, None) => Err(RpcError::protocol("message has neither method nor id")),
        }
    }

    fn response_outcome(obj: &mut Map<String, Value>) -> RpcResult<Result<Value, JsonRpcError>> {
        match (obj.remove("result"), obj.remove("error")) {
            (Some(result), None) => Ok(Ok(result)),
            (None, Some(error)) => serde_json::from_value::<JsonRpcError>(error)
                .map(Err)
                .map_err(|e| RpcError::protocol(format!("invalid error object: {}", e))),
            (Some(_), Some(_)) => Err(RpcError::protocol(
                "response carries both result and error",
            )),
            (None, None) => Err(RpcError::protocol(
                "response carries neither result nor error",
            )),
        }
    }

    /// Get the message ID if present
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Response(res) => Some(&res.id),
            Self::Notification(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = RpcRequest::new(1i64, "initialize");
        let json = serde_json::to_string(&req).unwrap();

        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"initialize\""));
        assert!(json.contains("\"id\":1"));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_notification_has_no_id() {
        let notif = RpcNotification::new("initialized").with_params(Some(json!({})));
        let json = serde_json::to_string(&notif).unwrap();

        assert!(!json.contains("\"id\""));
        assert!(json.contains("\"params\":{}"));
    }

    #[test]
    fn test_parse_success_response() {
        let msg = RpcMessage::parse(r#"{"jsonrpc":"2.0","id":1,"result":"ok"}"#).unwrap();
        match msg {
            RpcMessage::Response(res) => {
                assert_eq!(res.id, RequestId::Number(1));
                assert_eq!(res.into_result().unwrap(), json!("ok"));
            }
            other => panic!("Expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_null_result_is_present() {
        let msg = RpcMessage::parse(r#"{"jsonrpc":"2.0","id":"a","result":null}"#).unwrap();
        match msg {
            RpcMessage::Response(res) => assert_eq!(res.outcome, Ok(Value::Null)),
            other => panic!("Expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_response() {
        let msg = RpcMessage::parse(
            r#"{"jsonrpc":"2.0","id":7,"error":{"code":-32601,"message":"nope","data":[1]}}"#,
        )
        .unwrap();
        match msg {
            RpcMessage::Response(res) => {
                let err = res.into_result().unwrap_err();
                assert_eq!(err.code, -32601);
                assert_eq!(err.message, "nope");
                assert_eq!(err.data, Some(json!([1])));
            }
            other => panic!("Expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_notification_and_request() {
        let msg = RpcMessage::parse(r#"{"jsonrpc":"2.0","method":"window/logMessage"}"#).unwrap();
        assert!(matches!(msg, RpcMessage::Notification(_)));
        assert!(msg.id().is_none());

        let msg =
            RpcMessage::parse(r#"{"jsonrpc":"2.0","id":3,"method":"workspace/configuration"}"#)
                .unwrap();
        assert!(matches!(msg, RpcMessage::Request(_)));
    }

    #[test]
    fn test_parse_rejects_invalid_shapes() {
        // Both result and error
        assert!(RpcMessage::parse(
            r#"{"jsonrpc":"2.0","id":1,"result":1,"error":{"code":1,"message":"x"}}"#
        )
        .is_err());
        // Neither
        assert!(RpcMessage::parse(r#"{"jsonrpc":"2.0","id":"a1"}"#).is_err());
        // Not an object
        assert!(RpcMessage::parse("[1,2,3]").is_err());
        // Wrong version
        assert!(RpcMessage::parse(r#"{"jsonrpc":"1.0","id":1,"result":1}"#).is_err());
        // Float id
        assert!(RpcMessage::parse(r#"{"jsonrpc":"2.0","id":1.5,"result":1}"#).is_err());
        // Malformed JSON
        assert!(RpcMessage::parse("{not json").is_err());
        // Null id response is inert
        assert!(RpcMessage::parse(r#"{"jsonrpc":"2.0","id":null,"result":1}"#).is_err());
    }

    #[test]
    fn test_response_serialization_keeps_null_result() {
        let res = RpcResponse::success(4i64, Value::Null);
        let json = serde_json::to_string(&res).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","id":4,"result":null}"#);

        let res = RpcResponse::error("x", JsonRpcError::method_not_found());
        let json = serde_json::to_string(&res).unwrap();
        assert!(json.contains("\"error\":{\"code\":-32601"));
        assert!(!json.contains("result"));
    }

    #[test]
    fn test_string_and_number_ids_differ() {
        assert_ne!(RequestId::from("1"), RequestId::from(1i64));
        assert_eq!(RequestId::from(12i64).to_string(), "12");
    }
}
