//! Error types for the Xiaozhi MCP bridge
//!
//! This module defines the error hierarchy for the reminder server and the pipe.

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum XiaozhiMcpError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reminder book errors
    #[error("Reminder error: {0}")]
    Reminder(#[from] ReminderError),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// Pipe session errors
    #[error("Pipe error: {0}")]
    Pipe(#[from] PipeError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("XIAOZHI_TOKEN seems too short ({length} characters)")]
    TokenTooShort { length: usize },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Reminder book errors
///
/// The display strings are returned to the calling assistant verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReminderError {
    #[error("Unable to parse datetime: {input}. Use format: YYYY-MM-DD HH:MM")]
    InvalidDatetime { input: String },

    #[error("Cannot create reminder for past time")]
    PastTime,

    #[error("Reminder with ID {id} not found")]
    NotFound { id: String },

    #[error("Hours must be a valid number")]
    InvalidHours,
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid tool arguments: {message}")]
    InvalidArguments { message: String },
}

/// Pipe session errors
#[derive(Error, Debug)]
pub enum PipeError {
    #[error("Failed to spawn MCP server '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("MCP server is missing its {stream} pipe")]
    MissingStdio { stream: &'static str },

    #[error("MCP server stdin is closed")]
    StdinClosed,

    #[error("Connection attempt timed out after {timeout_secs} seconds")]
    ConnectTimeout { timeout_secs: u64 },

    #[error("No pong received within {timeout_secs} seconds")]
    KeepaliveTimeout { timeout_secs: u64 },
}

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, XiaozhiMcpError>;
