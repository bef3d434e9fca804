//! Configuration management for the Xiaozhi MCP bridge
//!
//! Reads the deployment-time environment (`XIAOZHI_TOKEN`, `MCP_SCRIPT`, ...)
//! and resolves the MCP server command the pipe supervises.

use std::time::Duration;

use crate::error::{ConfigError, Result, XiaozhiMcpError};

/// Default Xiaozhi MCP WebSocket endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://api.xiaozhi.me/mcp/";

/// Tokens shorter than this are rejected at startup
pub const MIN_TOKEN_LENGTH: usize = 10;

/// `MCP_SCRIPT` value selecting the reminder server built into this binary
pub const BUILTIN_SCRIPT: &str = "builtin";

/// Environment variable names
pub mod env {
    pub const TOKEN: &str = "XIAOZHI_TOKEN";
    pub const SCRIPT: &str = "MCP_SCRIPT";
    pub const ENDPOINT: &str = "XIAOZHI_ENDPOINT";
    pub const PYTHON: &str = "MCP_PYTHON";
}

/// Command line used to launch the local MCP server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    /// Program to execute
    pub program: String,

    /// Arguments passed to the program
    pub args: Vec<String>,
}

impl ServerCommand {
    /// The reminder server built into this binary (`<self> serve`)
    pub fn builtin() -> Result<Self> {
        let exe = std::env::current_exe().map_err(XiaozhiMcpError::Io)?;
        Ok(Self {
            program: exe.display().to_string(),
            args: vec!["serve".to_string()],
        })
    }

    /// Resolve an `MCP_SCRIPT` value into a command line.
    ///
    /// Unset, empty or `builtin` selects [`ServerCommand::builtin`]. Python
    /// scripts run under `python`; anything else is split on whitespace.
    pub fn resolve(script: Option<&str>, python: &str) -> Result<Self> {
        let script = script.map(str::trim).unwrap_or_default();
        if script.is_empty() || script == BUILTIN_SCRIPT {
            return Self::builtin();
        }

        if script.ends_with(".py") {
            return Ok(Self {
                program: python.to_string(),
                args: vec![script.to_string()],
            });
        }

        let mut parts = script.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| {
            XiaozhiMcpError::Config(ConfigError::InvalidConfig {
                message: format!("{} is blank", env::SCRIPT),
            })
        })?;

        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Human-readable form for logs
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Reconnect backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay after the first failure, and after every successful connect
    pub initial_delay: Duration,

    /// Upper bound for the doubling delay
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Configuration for the pipe process
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Xiaozhi access token, whitespace trimmed
    pub token: String,

    /// WebSocket endpoint without the token parameter
    pub endpoint: String,

    /// MCP server to launch for each session
    pub command: ServerCommand,

    /// Reconnect backoff
    pub backoff: BackoffConfig,

    /// How long a single connection attempt may take
    pub connect_timeout: Duration,

    /// Interval between keepalive pings
    pub ping_interval: Duration,

    /// How long to wait for a pong before dropping the connection
    pub ping_timeout: Duration,

    /// How long the MCP server gets to exit after its stdin closes
    pub shutdown_grace: Duration,
}

impl PipeConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup(env::TOKEN)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                XiaozhiMcpError::Config(ConfigError::MissingEnvVar {
                    var: env::TOKEN.to_string(),
                })
            })?;

        let length = token.chars().count();
        if length < MIN_TOKEN_LENGTH {
            return Err(ConfigError::TokenTooShort { length }.into());
        }

        let endpoint = lookup(env::ENDPOINT)
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let python = lookup(env::PYTHON).unwrap_or_else(|| "python3".to_string());
        let command = ServerCommand::resolve(lookup(env::SCRIPT).as_deref(), &python)?;

        Ok(Self {
            token,
            endpoint,
            command,
            backoff: BackoffConfig::default(),
            connect_timeout: Duration::from_secs(30),
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
        })
    }

    /// Endpoint URL with the token attached as a query parameter
    pub fn connect_url(&self) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!(
            "{}{}token={}",
            self.endpoint,
            separator,
            urlencoding::encode(&self.token)
        )
    }

    /// Token safe for logging
    pub fn masked_token(&self) -> String {
        mask_token(&self.token)
    }
}

/// Mask a credential for logging: first 10 and last 4 characters survive
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 14 {
        return "***".to_string();
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
