//! MCP (Model Context Protocol) module
//!
//! Implements the MCP server protocol for the reminder tools.

pub mod server;
pub mod tools;
pub mod types;
