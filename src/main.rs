//! Xiaozhi MCP Bridge - Rust Implementation
//!
//! `pipe` (the default) connects the Xiaozhi WebSocket endpoint to a local
//! stdio MCP server; `serve` runs the built-in reminder server on stdio.

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use xiaozhi_mcp::config::PipeConfig;
use xiaozhi_mcp::error::{ConfigError, Result, XiaozhiMcpError};
use xiaozhi_mcp::mcp::server::McpServer;
use xiaozhi_mcp::pipe::{shutdown_signal, McpPipe};

/// Xiaozhi MCP Bridge
#[derive(Parser)]
#[command(name = "xiaozhi-mcp")]
#[command(author, version, about = "Xiaozhi MCP bridge - exposes an MCP reminder server to Xiaozhi")]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Relay between the Xiaozhi endpoint and the MCP server named by MCP_SCRIPT (default)
    Pipe,
    /// Run the reminder MCP server on stdin/stdout
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout belongs to the MCP protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Pipe) {
        Commands::Pipe => run_pipe().await,
        Commands::Serve => {
            let mut server = McpServer::default();
            server.run_stdio().await
        }
    }
}

async fn run_pipe() -> Result<()> {
    let config = match PipeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            report_config_error(&e);
            std::process::exit(1);
        }
    };

    info!("{}", "=".repeat(60));
    info!("Starting Xiaozhi MCP Reminder Server");
    info!("{}", "=".repeat(60));
    info!("Script: {}", config.command.display());
    info!("Token: {}", config.masked_token());
    info!("{}", "=".repeat(60));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Stopping MCP Pipe...");
        let _ = shutdown_tx.send(true);
    });

    McpPipe::new(config, shutdown_rx).run().await
}

fn report_config_error(err: &XiaozhiMcpError) {
    let banner = "=".repeat(60);
    error!("{}", banner);
    for line in config_error_report(err) {
        error!("{}", line);
    }
    error!("{}", banner);
}

/// Lines explaining a startup configuration failure
fn config_error_report(err: &XiaozhiMcpError) -> Vec<String> {
    match err {
        XiaozhiMcpError::Config(ConfigError::MissingEnvVar { var }) => vec![
            format!("ERROR: {} environment variable not set", var),
            "Please set your token:".to_string(),
            format!("  export {}=your_actual_token", var),
            String::new(),
            "Get your token from:".to_string(),
            "  - Xiaozhi account settings".to_string(),
            "  - https://api.xiaozhi.me".to_string(),
        ],
        XiaozhiMcpError::Config(ConfigError::TokenTooShort { length }) => vec![
            "ERROR: XIAOZHI_TOKEN seems too short".to_string(),
            format!("Token length: {} characters", length),
            "Please verify your token is correct".to_string(),
        ],
        other => vec![format!("ERROR: {}", other)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token_report() {
        let err = XiaozhiMcpError::Config(ConfigError::MissingEnvVar {
            var: "XIAOZHI_TOKEN".to_string(),
        });
        let report = config_error_report(&err);
        assert!(report.contains(&"  export XIAOZHI_TOKEN=your_actual_token".to_string()));
    }

    #[test]
    fn test_short_token_report() {
        let err = XiaozhiMcpError::Config(ConfigError::TokenTooShort { length: 6 });
        let report = config_error_report(&err);
        assert!(report.contains(&"Token length: 6 characters".to_string()));
        assert!(report.contains(&"Please verify your token is correct".to_string()));
        assert!(!report.iter().any(|line| line.contains("export")));
    }

    #[test]
    fn test_other_errors_are_reported_verbatim() {
        let err = XiaozhiMcpError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "current executable unavailable",
        ));
        let report = config_error_report(&err);
        assert_eq!(report.len(), 1);
        assert!(report[0].contains("current executable unavailable"));
    }
}
