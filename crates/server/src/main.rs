//! emi-mcp-server: exposes the EMI calculator tools over MCP on stdio.
//!
//! Every tool call is forwarded to the EMI REST backend at
//! `EMI_API_BASE_URL` (default `http://localhost:8000/api`). Stdout carries
//! protocol traffic only; logs go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use emi_core::config::{load_dotenv, Config};
use emi_mcp::{McpServer, StdioTransport};
use emi_tool_runtime::{register_emi_tools, BackendClient, ToolRegistry};

// ── CLI ─────────────────────────────────────────────────────────────

/// MCP server proxying EMI calculations to the EMI REST backend.
///
/// Configure the backend with the EMI_API_BASE_URL environment variable
/// (or a .env file in the working directory).
#[derive(Parser, Debug)]
#[command(name = "emi-mcp-server", version, about)]
struct Cli {}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let _cli = Cli::parse();
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();

    let config = Config::from_env();
    info!(
        base_url = %config.backend.base_url,
        timeout_secs = config.backend.request_timeout.as_secs(),
        "EMI backend configured"
    );

    let backend = Arc::new(
        BackendClient::new(config.backend.clone()).context("failed to build EMI backend client")?,
    );

    let mut registry = ToolRegistry::new();
    register_emi_tools(&mut registry, backend).context("failed to register EMI tools")?;

    let mut server = McpServer::new(registry).with_name(config.server_name);
    let mut transport = StdioTransport::stdio();

    server
        .run(&mut transport)
        .await
        .context("MCP server terminated with a transport error")?;

    info!("emi-mcp-server exited cleanly");
    Ok(())
}
