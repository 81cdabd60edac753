//! Integration tests for StdioRpcClient against real child processes

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stdiorpc_core::{ClientConfig, ConnectionState, FramingMode, RpcError, StdioRpcClient};

const BOTH_FRAMINGS: [FramingMode; 2] = [FramingMode::Newline, FramingMode::ContentLength];

fn peer_config(framing: FramingMode) -> ClientConfig {
    ClientConfig::new(env!("CARGO_BIN_EXE_echo-peer"), framing).with_args([framing.to_string()])
}

async fn connected(config: ClientConfig) -> StdioRpcClient {
    let client = StdioRpcClient::new(config);
    client.connect().await.unwrap();
    assert!(client.is_connected());
    client
}

#[tokio::test]
async fn test_echo_in_both_framings() {
    for framing in BOTH_FRAMINGS {
        let client = connected(peer_config(framing)).await;

        let result = client
            .request("echo", Some(json!({"text": "hello"})))
            .await
            .unwrap();
        assert_eq!(result, json!({"text": "hello"}));

        // No params and a null result are both fine
        assert_eq!(client.request("echo", None).await.unwrap(), Value::Null);

        client.disconnect();
    }
}

#[tokio::test]
async fn test_multibyte_payload_content_length() {
    let client = connected(peer_config(FramingMode::ContentLength)).await;
    let text = "héllo wörld ✓ 日本語";
    let result = client.request("echo", Some(json!(text))).await.unwrap();
    assert_eq!(result, json!(text));
}

#[tokio::test]
async fn test_typed_call() {
    let client = connected(peer_config(FramingMode::Newline)).await;
    let numbers: Vec<i64> = client.call("echo", Some(json!([1, 2, 3]))).await.unwrap();
    assert_eq!(numbers, vec![1, 2, 3]);

    let err = client
        .call::<Vec<i64>>("echo", Some(json!("not a list")))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Serialization { .. }));
}

#[tokio::test]
async fn test_concurrent_requests_resolve_out_of_order() {
    for framing in BOTH_FRAMINGS {
        let client = connected(peer_config(framing)).await;

        // Later requests sleep less, so responses arrive in reverse order
        let count = 8u64;
        let calls = (0..count).map(|i| {
            let params = json!({"ms": (count - i) * 25, "value": i});
            let client = &client;
            async move { (i, client.request("sleep", Some(params)).await) }
        });

        for (i, result) in join_all(calls).await {
            assert_eq!(result.unwrap(), json!(i));
        }
    }
}

#[tokio::test]
async fn test_server_error_reaches_only_its_caller() {
    let client = connected(peer_config(FramingMode::ContentLength)).await;

    let (failed, ok) = tokio::join!(
        client.request("fail", Some(json!({"reason": "test"}))),
        client.request("echo", Some(json!(7))),
    );

    match failed {
        Err(RpcError::Server {
            code,
            message,
            data,
            ..
        }) => {
            assert_eq!(code, -32000);
            assert_eq!(message, "requested failure");
            assert_eq!(data, Some(json!({"reason": "test"})));
        }
        other => panic!("Expected server error, got {:?}", other),
    }
    assert_eq!(ok.unwrap(), json!(7));

    let err = client.request("no/such/method", None).await.unwrap_err();
    assert!(matches!(err, RpcError::Server { code: -32601, .. }));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_timeout_fails_only_that_request() {
    let config = peer_config(FramingMode::Newline).with_timeout(Duration::from_millis(200));
    let client = connected(config).await;

    let err = client
        .request("sleep", Some(json!({"ms": 600, "value": "late"})))
        .await
        .unwrap_err();
    match err {
        RpcError::Timeout { method, millis, .. } => {
            assert_eq!(method, "sleep");
            assert_eq!(millis, 200);
        }
        other => panic!("Expected timeout, got {:?}", other),
    }

    // Let the late response arrive; it must be ignored
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(client.is_connected());
    assert_eq!(client.request("echo", Some(json!(1))).await.unwrap(), json!(1));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unanswered_request_times_out() {
    // cat reflects the request back; a request is never a response
    for framing in BOTH_FRAMINGS {
        let config = ClientConfig::new("cat", framing).with_timeout(Duration::from_millis(150));
        let client = connected(config).await;

        let err = client.request("textDocument/hover", None).await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout { ref method, .. } if method == "textDocument/hover"));
        assert!(client.is_connected());
    }
}

#[tokio::test]
async fn test_malformed_frames_are_inert() {
    for framing in BOTH_FRAMINGS {
        let client = connected(peer_config(framing)).await;

        assert_eq!(client.request("garbage", None).await.unwrap(), json!("ok"));
        assert!(client.is_connected());
        assert_eq!(
            client.request("echo", Some(json!("after"))).await.unwrap(),
            json!("after")
        );
    }
}

#[tokio::test]
async fn test_duplicate_response_resolves_once() {
    let client = connected(peer_config(FramingMode::ContentLength)).await;

    assert_eq!(client.request("duplicate", None).await.unwrap(), json!("first"));
    // The second copy is dropped and does not leak into the next request
    assert_eq!(client.request("echo", Some(json!(2))).await.unwrap(), json!(2));
}

#[tokio::test]
async fn test_notification_handler_sees_peer_notifications() {
    let seen: Arc<Mutex<Vec<(String, Option<Value>)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let client = StdioRpcClient::new(peer_config(FramingMode::Newline))
        .with_notification_handler(move |method: &str, params: Option<Value>| {
            sink.lock().push((method.to_string(), params));
        });
    client.connect().await.unwrap();

    let params = json!({"method": "$/progress", "params": {"percent": 50}});
    client.request("notify_me", Some(params)).await.unwrap();

    // The notification precedes the response on the wire
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "$/progress");
    assert_eq!(seen[0].1, Some(json!({"percent": 50})));
}

#[tokio::test]
async fn test_notify_reaches_peer() {
    for framing in BOTH_FRAMINGS {
        let client = connected(peer_config(framing)).await;

        client.notify("initialized", Some(json!({})));
        client.notify("$/cancelRequest", None);

        let recorded = client.request("recorded", None).await.unwrap();
        assert_eq!(recorded, json!(["initialized", "$/cancelRequest"]));
    }
}

#[tokio::test]
async fn test_env_overlay_reaches_child() {
    let config = peer_config(FramingMode::Newline).with_env("STDIORPC_PEER_TOKEN", "secret");
    let client = connected(config).await;

    let token = client
        .request("env", Some(json!({"name": "STDIORPC_PEER_TOKEN"})))
        .await
        .unwrap();
    assert_eq!(token, json!("secret"));

    // Ambient variables are still inherited
    let path = client
        .request("env", Some(json!({"name": "PATH"})))
        .await
        .unwrap();
    assert!(path.is_string());
}

#[tokio::test]
async fn test_invalid_params_error_code() {
    let client = connected(peer_config(FramingMode::Newline)).await;

    let err = client
        .request("env", Some(json!({"key": "PATH"})))
        .await
        .unwrap_err();
    match err {
        RpcError::Server { code, message, .. } => {
            assert_eq!(code, -32602);
            assert_eq!(message, "Invalid params");
        }
        other => panic!("Expected invalid params, got {:?}", other),
    }
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_stderr_is_forwarded() {
    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&lines);
    let client = StdioRpcClient::new(peer_config(FramingMode::Newline))
        .with_stderr_handler(move |line: &str| sink.lock().push(line.to_string()));
    client.connect().await.unwrap();

    client
        .request("stderr", Some(json!({"line": "indexing workspace"})))
        .await
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !lines.lock().iter().any(|l| l == "indexing workspace") {
        assert!(Instant::now() < deadline, "stderr line never arrived");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_disconnect_fails_all_pending() {
    let client = connected(peer_config(FramingMode::Newline)).await;

    let pending = (0..5).map(|i| client.request("sleep", Some(json!({"ms": 10_000, "value": i}))));
    let disconnect = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.disconnect();
    };

    let started = Instant::now();
    let (results, ()) = tokio::join!(join_all(pending), disconnect);
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(results.len(), 5);
    for result in results {
        assert!(matches!(result, Err(RpcError::Disconnected { .. })));
    }
    assert!(!client.is_connected());

    // Terminal: no further requests and no reconnect
    assert!(matches!(
        client.request("echo", None).await,
        Err(RpcError::NotConnected)
    ));
    assert!(client.connect().await.is_err());
    client.disconnect();
}

#[tokio::test]
async fn test_process_exit_rejects_pending() {
    let client = connected(peer_config(FramingMode::ContentLength)).await;

    let (slow, exited) = tokio::join!(
        client.request("sleep", Some(json!({"ms": 10_000}))),
        client.request("exit", Some(json!({"code": 3}))),
    );
    assert!(slow.unwrap_err().is_disconnected());
    assert!(exited.unwrap_err().is_disconnected());
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_missing_command_fails_connect() {
    let client = StdioRpcClient::new(ClientConfig::new(
        "/nonexistent/stdiorpc/peer",
        FramingMode::Newline,
    ));
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, RpcError::Connection { .. }));
    assert!(!client.is_connected());
}

#[cfg(unix)]
#[tokio::test]
async fn test_exit_during_startup_fails_connect() {
    // The exit lands well inside the startup grace, before the exit check
    let config = ClientConfig::new("sh", FramingMode::Newline)
        .with_args(["-c", "exit 3"])
        .with_startup_grace(Duration::from_millis(500));
    let client = StdioRpcClient::new(config);

    let err = tokio::time::timeout(Duration::from_secs(5), client.connect())
        .await
        .unwrap()
        .unwrap_err();
    match &err {
        RpcError::Connection { message, .. } => {
            assert!(message.contains("exited during startup"), "{}", message);
        }
        other => panic!("Expected connection error, got {:?}", other),
    }
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.request("echo", None).await.unwrap_err().is_disconnected());
}

#[cfg(unix)]
#[tokio::test]
async fn test_connect_timeout_reaps_child() {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let config = ClientConfig::new("sleep", FramingMode::Newline)
        .with_args(["30"])
        .with_startup_grace(Duration::from_secs(10))
        .with_connect_timeout(Duration::from_millis(200));
    let client = StdioRpcClient::new(config);

    let started = Instant::now();
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, RpcError::ConnectTimeout { millis: 200 }), "{:?}", err);
    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // Dropping the half-started child kills it; the runtime reaps it
    let pid = Pid::from_raw(client.pid().unwrap() as i32);
    let deadline = Instant::now() + Duration::from_secs(5);
    while kill(pid, None).is_ok() {
        assert!(Instant::now() < deadline, "timed-out child was never reaped");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_disconnect_kills_after_grace() {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Ignores SIGTERM, so only the forced kill ends it
    let config = ClientConfig::new("sh", FramingMode::Newline)
        .with_args(["-c", "trap '' TERM; exec sleep 30"])
        .with_kill_grace(Duration::from_millis(400));
    let client = connected(config).await;
    let pid = Pid::from_raw(client.pid().unwrap() as i32);
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.disconnect();
    assert!(!client.is_connected());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(kill(pid, None).is_ok(), "process should survive SIGTERM");

    let deadline = Instant::now() + Duration::from_secs(5);
    while kill(pid, None).is_ok() {
        assert!(Instant::now() < deadline, "process was never killed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_disconnect_sigterm_ends_cooperative_peer() {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let config = ClientConfig::new("sleep", FramingMode::Newline)
        .with_args(["30"])
        .with_kill_grace(Duration::from_secs(10));
    let client = connected(config).await;
    let pid = Pid::from_raw(client.pid().unwrap() as i32);

    client.disconnect();

    // Well before the grace period expires
    let deadline = Instant::now() + Duration::from_secs(3);
    while kill(pid, None).is_ok() {
        assert!(Instant::now() < deadline, "SIGTERM was not delivered");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_shutdown_waits_for_reap() {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let client = connected(peer_config(FramingMode::Newline)).await;
    let pid = Pid::from_raw(client.pid().unwrap() as i32);

    tokio::time::timeout(Duration::from_secs(5), client.shutdown())
        .await
        .unwrap();
    assert!(!client.is_connected());
    assert!(kill(pid, None).is_err());

    // Never-connected clients return at once
    let idle = StdioRpcClient::new(peer_config(FramingMode::Newline));
    tokio::time::timeout(Duration::from_millis(100), idle.shutdown())
        .await
        .unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_shutdown_delivers_queued_notification() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("received");

    for _ in 0..5 {
        let _ = std::fs::remove_file(&out);
        let script = format!("read line; printf '%s' \"$line\" > '{}'", out.display());
        let config = ClientConfig::new("sh", FramingMode::Newline).with_args(["-c", script.as_str()]);
        let client = connected(config).await;

        client.notify("initialized", Some(json!({"ready": true})));
        tokio::time::timeout(Duration::from_secs(5), client.shutdown())
            .await
            .unwrap();
        assert!(!client.is_connected());

        let line = std::fs::read_to_string(&out).unwrap();
        let received: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(received["method"], "initialized");
        assert_eq!(received["params"], json!({"ready": true}));
        assert!(received.get("id").is_none());
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_shutdown_escalates_when_peer_ignores_eof() {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Never reads stdin and ignores SIGTERM
    let config = ClientConfig::new("sh", FramingMode::Newline)
        .with_args(["-c", "trap '' TERM; exec sleep 30"])
        .with_kill_grace(Duration::from_millis(200));
    let client = connected(config).await;
    let pid = Pid::from_raw(client.pid().unwrap() as i32);

    let started = Instant::now();
    tokio::time::timeout(Duration::from_secs(5), client.shutdown())
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(400));
    assert!(kill(pid, None).is_err());
}
