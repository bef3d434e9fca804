//! Local MCP server process
//!
//! Spawns the configured server with piped stdio, forwards its stderr to the
//! log and stops it when a session ends. Writes to the server's stdin go
//! through a dedicated task, so a server that stops reading never stalls the
//! caller.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ServerCommand;
use crate::error::{PipeError, Result};

/// How long leftover stderr output may take to reach the log after exit
const STDERR_DRAIN: Duration = Duration::from_millis(500);

/// A running MCP server
pub struct McpProcess {
    child: Child,
    pid: Option<u32>,
    stdin_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
}

/// Queue of lines for the server's stdin, plus its raw stdout
pub struct ProcessIo {
    pub stdin: mpsc::UnboundedSender<String>,
    pub stdout: BufReader<ChildStdout>,
}

impl ProcessIo {
    /// Queue one message for the server. Fails once the writer has stopped.
    pub fn send_line(&self, message: &str) -> Result<()> {
        self.stdin
            .send(message.to_string())
            .map_err(|_| PipeError::StdinClosed.into())
    }
}

/// Write one newline-terminated message to the server's stdin
async fn write_line(stdin: &mut ChildStdin, message: &str) -> std::io::Result<()> {
    stdin.write_all(message.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

/// Feed queued lines to `stdin` until the queue closes, then drop it (EOF)
async fn pump_stdin(mut stdin: ChildStdin, mut queue: mpsc::UnboundedReceiver<String>) {
    while let Some(message) = queue.recv().await {
        if let Err(e) = write_line(&mut stdin, &message).await {
            warn!("Failed to write to MCP process stdin: {}", e);
            break;
        }
    }
}

/// Read one `\n`-terminated line of raw bytes into `buf`.
///
/// Returns `Ok(0)` at EOF. Bytes read by a cancelled call stay in `buf`, so
/// the caller only clears it after consuming a complete line.
pub async fn read_line(
    stdout: &mut BufReader<ChildStdout>,
    buf: &mut Vec<u8>,
) -> std::io::Result<usize> {
    stdout.read_until(b'\n', buf).await
}

impl McpProcess {
    /// Start the server described by `command`
    pub fn spawn(command: &ServerCommand) -> Result<(Self, ProcessIo)> {
        info!("Starting MCP process: {}", command.display());

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipeError::SpawnFailed {
                program: command.program.clone(),
                source,
            })?;

        let pid = child.id();
        info!("MCP process started with PID: {}", pid.unwrap_or_default());

        let stdin = child
            .stdin
            .take()
            .ok_or(PipeError::MissingStdio { stream: "stdin" })?;
        let stdout = child
            .stdout
            .take()
            .ok_or(PipeError::MissingStdio { stream: "stdout" })?;

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let stdin_task = tokio::spawn(pump_stdin(stdin, queue_rx));

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut buf = Vec::new();
                while let Ok(n) = reader.read_until(b'\n', &mut buf).await {
                    if n == 0 {
                        break;
                    }
                    let line = String::from_utf8_lossy(&buf).trim().to_string();
                    if !line.is_empty() {
                        info!("[MCP STDERR] {}", line);
                    }
                    buf.clear();
                }
            })
        });

        let process = Self {
            child,
            pid,
            stdin_task: Some(stdin_task),
            stderr_task,
        };
        let io = ProcessIo {
            stdin: queue_tx,
            stdout: BufReader::new(stdout),
        };

        Ok((process, io))
    }

    /// OS process id, if the process is still known to the runtime
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Stop the server.
    ///
    /// `io` is dropped first; once the stdin queue drains the server sees
    /// EOF. It gets `grace` to exit on its own before being killed.
    pub async fn stop(mut self, io: ProcessIo, grace: Duration) {
        drop(io);

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => info!("MCP process exited: {}", status),
            Ok(Err(e)) => warn!("Failed to wait for MCP process: {}", e),
            Err(_) => {
                warn!(
                    "MCP process did not exit within {:?}, killing it",
                    grace
                );
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill MCP process: {}", e);
                }
            }
        }

        if let Some(task) = self.stdin_task.take() {
            task.abort();
        }
        if let Some(mut task) = self.stderr_task.take() {
            // Grandchildren may still hold stderr open.
            if tokio::time::timeout(STDERR_DRAIN, &mut task).await.is_err() {
                task.abort();
            }
        }
    }
}
