//! WebSocket <-> stdio bridge
//!
//! Keeps one connection to the Xiaozhi endpoint alive and relays every
//! message between it and a freshly spawned MCP server process.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};

use crate::config::PipeConfig;
use crate::error::{PipeError, Result, XiaozhiMcpError};
use crate::pipe::backoff::Backoff;
use crate::pipe::process::{read_line, McpProcess, ProcessIo};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Longest payload excerpt written to the log
const LOG_PREVIEW_CHARS: usize = 100;

/// Why a relay session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The MCP server closed its stdout
    ProcessExited,
    /// The remote side closed the socket
    SocketClosed,
    /// Shutdown was requested
    Shutdown,
}

/// The pipe: reconnect loop plus per-connection relay
pub struct McpPipe {
    config: PipeConfig,
    shutdown: watch::Receiver<bool>,
}

impl McpPipe {
    /// Create a pipe that stops once `shutdown` turns `true` or its sender is dropped
    pub fn new(config: PipeConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self { config, shutdown }
    }

    /// Run until shutdown
    pub async fn run(&self) -> Result<()> {
        let mut shutdown = self.shutdown.clone();
        let mut backoff = Backoff::new(self.config.backoff);

        while !shutdown_requested(&shutdown) {
            let connected = tokio::select! {
                result = self.connect() => result,
                _ = wait_for_shutdown(&mut shutdown) => break,
            };

            match connected {
                Ok(ws) => {
                    backoff.reset();
                    match self.run_session(ws, &mut shutdown).await {
                        Ok(SessionEnd::Shutdown) => break,
                        Ok(end) => warn!("Session ended: {:?}", end),
                        Err(e) => error!("Session failed: {}", e),
                    }
                }
                Err(e) => log_connect_error(&e),
            }

            if shutdown_requested(&shutdown) {
                break;
            }

            let delay = backoff.next_delay();
            info!("Reconnecting in {:?}...", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        info!("MCP pipe stopped");
        Ok(())
    }

    async fn connect(&self) -> Result<WsStream> {
        info!("Connecting to Xiaozhi WebSocket at {}...", self.config.endpoint);
        info!(
            "Token length: {} characters ({})",
            self.config.token.chars().count(),
            self.config.masked_token()
        );

        let timeout = self.config.connect_timeout;
        let (ws, response) = tokio::time::timeout(timeout, connect_async(self.config.connect_url()))
            .await
            .map_err(|_| PipeError::ConnectTimeout {
                timeout_secs: timeout.as_secs(),
            })??;

        info!("WebSocket connected successfully (HTTP {})", response.status());
        Ok(ws)
    }

    /// Relay between `ws` and a new MCP server until either side goes away
    async fn run_session(
        &self,
        ws: WsStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd> {
        let (process, mut io) = match McpProcess::spawn(&self.config.command) {
            Ok(spawned) => spawned,
            Err(e) => {
                let mut ws = ws;
                let _ = ws.close(None).await;
                return Err(e);
            }
        };

        info!(
            "Relaying between WebSocket and MCP process {}",
            process.pid().unwrap_or_default()
        );

        let mut line = Vec::new();
        let (mut sink, mut stream) = ws.split();
        let ping_interval = self.config.ping_interval;
        let ping_timeout = self.config.ping_timeout;
        let mut ping = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
        let mut pong_deadline: Option<Instant> = None;

        let end: Result<SessionEnd> = loop {
            let deadline = pong_deadline;
            tokio::select! {
                read = read_line(&mut io.stdout, &mut line) => match read {
                    Ok(0) => break Ok(SessionEnd::ProcessExited),
                    Ok(_) => {
                        let bytes = std::mem::take(&mut line);
                        let Ok(text) = String::from_utf8(bytes) else {
                            warn!("Dropping non-UTF-8 line from MCP process");
                            continue;
                        };
                        let message = text.trim();
                        if message.is_empty() {
                            continue;
                        }
                        info!("Process -> WS: {}", preview(message));
                        if let Err(e) = sink.send(Message::Text(message.to_string())).await {
                            break Err(e.into());
                        }
                    }
                    Err(e) => break Err(e.into()),
                },
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = forward_to_process(&io, &text) {
                            break Err(e);
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => {
                            if let Err(e) = forward_to_process(&io, &text) {
                                break Err(e);
                            }
                        }
                        Err(_) => warn!("Dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Pong(_))) => pong_deadline = None,
                    Some(Ok(Message::Close(frame))) => {
                        match frame {
                            Some(frame) => warn!("WebSocket closed by server: {} {}", frame.code, frame.reason),
                            None => warn!("WebSocket closed by server"),
                        }
                        break Ok(SessionEnd::SocketClosed);
                    }
                    // Pings are answered by tungstenite itself
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e.into()),
                    None => break Ok(SessionEnd::SocketClosed),
                },
                _ = ping.tick() => {
                    if pong_deadline.is_none() {
                        pong_deadline = Some(Instant::now() + ping_timeout);
                    }
                    if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                        break Err(e.into());
                    }
                }
                _ = pong_overdue(deadline) => {
                    break Err(PipeError::KeepaliveTimeout {
                        timeout_secs: ping_timeout.as_secs(),
                    }
                    .into());
                }
                _ = wait_for_shutdown(shutdown) => break Ok(SessionEnd::Shutdown),
            }
        };

        // Best effort: the socket may already be gone.
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;

        process.stop(io, self.config.shutdown_grace).await;
        end
    }
}

fn forward_to_process(io: &ProcessIo, text: &str) -> Result<()> {
    info!("WS -> Process: {}", preview(text));
    io.send_line(text)
}

async fn pong_overdue(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Resolves once shutdown is requested or the sender side is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn log_connect_error(err: &XiaozhiMcpError) {
    error!("WebSocket connection failed: {}", err);
    if is_auth_failure(err) {
        error!("HTTP 401 - Token authentication failed. Please verify your XIAOZHI_TOKEN is correct.");
        error!("Get your token from: https://api.xiaozhi.me or your Xiaozhi account settings");
    }
}

/// Whether the endpoint rejected the token during the handshake
pub fn is_auth_failure(err: &XiaozhiMcpError) -> bool {
    matches!(
        err,
        XiaozhiMcpError::WebSocket(tungstenite::Error::Http(response))
            if response.status() == tungstenite::http::StatusCode::UNAUTHORIZED
    )
}

/// Truncate a payload for logging
pub fn preview(message: &str) -> String {
    match message.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &message[..cut]),
        None => message.to_string(),
    }
}
