//! End-to-end tests for the MCP pipe
//!
//! A local WebSocket server stands in for the Xiaozhi endpoint; the pipe
//! launches this crate's own binary as the MCP server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async, connect_async, WebSocketStream};

use xiaozhi_mcp::config::{BackoffConfig, PipeConfig, ServerCommand};
use xiaozhi_mcp::error::XiaozhiMcpError;
use xiaozhi_mcp::pipe::bridge::is_auth_failure;
use xiaozhi_mcp::pipe::McpPipe;

const TOKEN: &str = "test-token-0123456789";
const WAIT: Duration = Duration::from_secs(15);

fn builtin_server() -> ServerCommand {
    ServerCommand {
        program: env!("CARGO_BIN_EXE_xiaozhi-mcp").to_string(),
        args: vec!["serve".to_string()],
    }
}

fn pipe_config(port: u16) -> PipeConfig {
    PipeConfig {
        token: TOKEN.to_string(),
        endpoint: format!("ws://127.0.0.1:{}/mcp/", port),
        command: builtin_server(),
        backoff: BackoffConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
        },
        connect_timeout: Duration::from_secs(5),
        ping_interval: Duration::from_secs(20),
        ping_timeout: Duration::from_secs(10),
        shutdown_grace: Duration::from_secs(2),
    }
}

async fn accept_tcp(listener: &TcpListener) -> TcpStream {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("pipe never connected")
        .unwrap();
    stream
}

/// Next text frame, skipping control frames
async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("no frame from pipe")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return text;
        }
    }
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    serde_json::from_str(&next_text(ws).await).unwrap()
}

/// Handshake callback that rejects the token
fn reject_unauthorized(_request: &Request, _response: Response) -> Result<Response, ErrorResponse> {
    let mut rejection = ErrorResponse::new(Some("invalid token".to_string()));
    *rejection.status_mut() = StatusCode::UNAUTHORIZED;
    Err(rejection)
}

#[tokio::test]
async fn test_relays_tool_calls_through_builtin_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipe = McpPipe::new(pipe_config(port), shutdown_rx);
    let pipe_task = tokio::spawn(async move { pipe.run().await });

    let stream = accept_tcp(&listener).await;
    let mut requested_uri = String::new();
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        requested_uri = request.uri().to_string();
        Ok(response)
    };
    let mut ws = accept_hdr_async(stream, callback).await.unwrap();
    assert_eq!(requested_uri, format!("/mcp/?token={}", TOKEN));

    let initialize = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {"protocolVersion": "2024-11-05", "capabilities": {}}
    });
    ws.send(Message::Text(initialize.to_string())).await.unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["serverInfo"]["name"], "Xiaozhi Reminder Server");

    let add = json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/call",
        "params": {
            "name": "add_reminder",
            "arguments": {"title": "Renew passport", "datetime_str": "2099-01-01 09:00"}
        }
    });
    ws.send(Message::Text(add.to_string())).await.unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["id"], 2);
    let body: Value =
        serde_json::from_str(reply["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["reminder"]["title"], "Renew passport");

    shutdown_tx.send(true).unwrap();
    timeout(WAIT, pipe_task)
        .await
        .expect("pipe did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_reconnects_after_server_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipe = McpPipe::new(pipe_config(port), shutdown_rx);
    let pipe_task = tokio::spawn(async move { pipe.run().await });

    let mut first = accept_async(accept_tcp(&listener).await).await.unwrap();
    first.close(None).await.unwrap();

    // A fresh session gets a fresh server, so the reminder book starts over.
    let mut second = accept_async(accept_tcp(&listener).await).await.unwrap();
    let stats = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": "get_reminder_stats", "arguments": {}}
    });
    second.send(Message::Text(stats.to_string())).await.unwrap();
    let reply = next_json(&mut second).await;
    let body: Value =
        serde_json::from_str(reply["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(body["stats"]["total_reminders"], 0);

    shutdown_tx.send(true).unwrap();
    timeout(WAIT, pipe_task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_missing_pong_drops_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut config = pipe_config(port);
    config.ping_interval = Duration::from_millis(100);
    config.ping_timeout = Duration::from_millis(200);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipe = McpPipe::new(config, shutdown_rx);
    let pipe_task = tokio::spawn(async move { pipe.run().await });

    // Never read from this socket, so pings are never answered.
    let _silent = accept_async(accept_tcp(&listener).await).await.unwrap();
    let _second = accept_tcp(&listener).await;

    shutdown_tx.send(true).unwrap();
    timeout(WAIT, pipe_task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_while_endpoint_is_down() {
    // Bind then drop to get a port nobody listens on.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipe = McpPipe::new(pipe_config(port), shutdown_rx);
    let pipe_task = tokio::spawn(async move { pipe.run().await });

    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown_tx.send(true).unwrap();
    timeout(WAIT, pipe_task).await.unwrap().unwrap().unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_large_frame_does_not_stall_relay() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // `cat` echoes whatever it reads, so stdout must be drained while stdin is written.
    let mut config = pipe_config(port);
    config.command = ServerCommand {
        program: "cat".to_string(),
        args: Vec::new(),
    };
    config.ping_interval = Duration::from_millis(500);
    config.ping_timeout = Duration::from_secs(5);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipe = McpPipe::new(config, shutdown_rx);
    let pipe_task = tokio::spawn(async move { pipe.run().await });

    let mut ws = accept_async(accept_tcp(&listener).await).await.unwrap();
    let payload = "x".repeat(512 * 1024);
    ws.send(Message::Text(payload.clone())).await.unwrap();
    let echoed = next_text(&mut ws).await;
    assert_eq!(echoed.len(), payload.len());

    shutdown_tx.send(true).unwrap();
    timeout(WAIT, pipe_task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_binary_frames_are_relayed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipe = McpPipe::new(pipe_config(port), shutdown_rx);
    let pipe_task = tokio::spawn(async move { pipe.run().await });

    let mut ws = accept_async(accept_tcp(&listener).await).await.unwrap();

    // Not UTF-8: dropped without ending the session.
    ws.send(Message::Binary(vec![0xff, 0xfe, 0x00])).await.unwrap();

    let ping = json!({"jsonrpc": "2.0", "id": 5, "method": "ping"});
    ws.send(Message::Binary(ping.to_string().into_bytes()))
        .await
        .unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["id"], 5);
    assert!(reply["result"].is_object());

    shutdown_tx.send(true).unwrap();
    timeout(WAIT, pipe_task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_rejected_token_is_retried() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipe = McpPipe::new(pipe_config(port), shutdown_rx);
    let pipe_task = tokio::spawn(async move { pipe.run().await });

    let rejected = accept_hdr_async(accept_tcp(&listener).await, reject_unauthorized).await;
    assert!(rejected.is_err());

    let mut ws = accept_async(accept_tcp(&listener).await).await.unwrap();
    let ping = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
    ws.send(Message::Text(ping.to_string())).await.unwrap();
    assert_eq!(next_json(&mut ws).await["id"], 1);

    shutdown_tx.send(true).unwrap();
    timeout(WAIT, pipe_task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_unauthorized_handshake_is_auth_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let stream = accept_tcp(&listener).await;
        let _ = accept_hdr_async(stream, reject_unauthorized).await;
    });

    let err = connect_async(format!("ws://127.0.0.1:{}/mcp/?token={}", port, TOKEN))
        .await
        .err()
        .expect("handshake should be rejected");
    assert!(is_auth_failure(&XiaozhiMcpError::from(err)));

    server.await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_non_utf8_server_output_is_skipped() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut config = pipe_config(port);
    config.command = ServerCommand {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), r"printf '\377\376\n'; exec cat".to_string()],
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipe = McpPipe::new(config, shutdown_rx);
    let pipe_task = tokio::spawn(async move { pipe.run().await });

    let mut ws = accept_async(accept_tcp(&listener).await).await.unwrap();
    ws.send(Message::Text("still relaying".to_string()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut ws).await, "still relaying");

    shutdown_tx.send(true).unwrap();
    timeout(WAIT, pipe_task).await.unwrap().unwrap().unwrap();
}
