//! Xiaozhi MCP Bridge Library
//!
//! A Model Context Protocol (MCP) reminder server plus the pipe that exposes
//! a local stdio MCP server to the Xiaozhi assistant over WebSocket.

pub mod config;
pub mod error;
pub mod mcp;
pub mod pipe;
pub mod reminders;

pub use config::PipeConfig;
pub use error::{Result, XiaozhiMcpError};
