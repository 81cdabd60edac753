//! Scriptable JSON-RPC peer used by the integration tests.
//!
//! Usage: `echo-peer [newline|content-length]`
//!
//! Methods:
//! - `echo`: result is the params (or null)
//! - `fail`: error -32000 carrying the params as data
//! - `sleep {ms, value}`: answers `value` after `ms` milliseconds
//! - `notify_me {method, params}`: sends a notification, then answers "ok"
//! - `garbage`: writes an undecodable frame, then answers "ok"
//! - `env {name}`: the variable's value, or null; invalid params without `name`
//! - `duplicate`: answers twice ("first", then "second")
//! - `stderr {line}`: writes `line` to stderr, then answers "ok"
//! - `recorded`: methods of every notification received so far
//! - `exit {code}`: exits without answering
//!
//! Anything else gets "Method not found". EOF on stdin exits cleanly.

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use stdiorpc_core::{
    FrameDecoder, FramingMode, JsonRpcError, RpcMessage, RpcNotification, RpcRequest, RpcResponse,
    encode_frame,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};

type Outbox = mpsc::UnboundedSender<Vec<u8>>;

#[tokio::main]
async fn main() {
    let framing = match std::env::args().nth(1) {
        Some(arg) => match arg.parse::<FramingMode>() {
            Ok(mode) => mode,
            Err(e) => {
                eprintln!("echo-peer: {}", e);
                std::process::exit(2);
            }
        },
        None => FramingMode::Newline,
    };

    let (outbox, mut queue) = mpsc::unbounded_channel::<Vec<u8>>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(bytes) = queue.recv().await {
            if stdout.write_all(&bytes).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let recorded = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut decoder = FrameDecoder::new(framing);
    let mut stdin = tokio::io::stdin();
    let mut chunk = vec![0u8; 4096];

    loop {
        let n = match stdin.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for payload in decoder.push(&chunk[..n]) {
            match RpcMessage::parse(&payload) {
                Ok(RpcMessage::Request(request)) => {
                    handle_request(request, framing, outbox.clone(), Arc::clone(&recorded)).await;
                }
                Ok(RpcMessage::Notification(notification)) => {
                    recorded.lock().await.push(notification.method);
                }
                Ok(RpcMessage::Response(_)) => {}
                Err(e) => eprintln!("echo-peer: dropping message: {}", e),
            }
        }
    }

    drop(outbox);
    let _ = writer.await;
}

fn send_json(outbox: &Outbox, framing: FramingMode, value: &impl serde::Serialize) {
    if let Ok(payload) = serde_json::to_string(value) {
        let _ = outbox.send(encode_frame(framing, &payload));
    }
}

async fn handle_request(
    request: RpcRequest,
    framing: FramingMode,
    outbox: Outbox,
    recorded: Arc<Mutex<Vec<String>>>,
) {
    let RpcRequest {
        id, method, params, ..
    } = request;
    let params = params.unwrap_or(Value::Null);

    let response = match method.as_str() {
        "echo" => RpcResponse::success(id, params),
        "fail" => RpcResponse::error(
            id,
            JsonRpcError::new(-32000, "requested failure").with_data(params),
        ),
        "sleep" => {
            let ms = params.get("ms").and_then(Value::as_u64).unwrap_or(0);
            let value = params.get("value").cloned().unwrap_or(Value::Null);
            // Answer from a task so later requests overtake this one
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                send_json(&outbox, framing, &RpcResponse::success(id, value));
            });
            return;
        }
        "notify_me" => {
            let event = params
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or("peer/event");
            let notification =
                RpcNotification::new(event).with_params(params.get("params").cloned());
            send_json(&outbox, framing, &notification);
            RpcResponse::success(id, json!("ok"))
        }
        "garbage" => {
            let _ = outbox.send(encode_frame(framing, "{not json"));
            RpcResponse::success(id, json!("ok"))
        }
        "env" => match params.get("name").and_then(Value::as_str) {
            Some(name) => {
                let value = std::env::var(name).map(Value::String).unwrap_or(Value::Null);
                RpcResponse::success(id, value)
            }
            None => RpcResponse::error(id, JsonRpcError::invalid_params()),
        },
        "duplicate" => {
            send_json(&outbox, framing, &RpcResponse::success(id.clone(), json!("first")));
            RpcResponse::success(id, json!("second"))
        }
        "stderr" => {
            let line = params.get("line").and_then(Value::as_str).unwrap_or("");
            eprintln!("{}", line);
            RpcResponse::success(id, json!("ok"))
        }
        "recorded" => RpcResponse::success(id, json!(recorded.lock().await.clone())),
        "exit" => {
            let code = params.get("code").and_then(Value::as_i64).unwrap_or(0);
            std::process::exit(code as i32);
        }
        _ => RpcResponse::error(id, JsonRpcError::method_not_found()),
    };

    send_json(&outbox, framing, &response);
}
