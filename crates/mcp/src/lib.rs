//! MCP (Model Context Protocol) server for the EMI calculator tools.
//!
//! Implements the server side of MCP over JSON-RPC 2.0, exposing a
//! `ToolRegistry` to a host that talks over stdio.
//!
//! # Architecture
//!
//! - **types**: JSON-RPC 2.0 and MCP-specific protocol types
//! - **transport**: Pluggable transport layer (stdio, channels)
//! - **server**: MCP server wrapping a `ToolRegistry`
//! - **error**: Unified error types
//!
//! # Usage
//!
//! ```no_run
//! use emi_mcp::server::McpServer;
//! use emi_mcp::transport::StdioTransport;
//! use emi_tool_runtime::ToolRegistry;
//!
//! # async fn example() {
//! let registry = ToolRegistry::new();
//! let mut server = McpServer::new(registry);
//! let mut transport = StdioTransport::stdio();
//! server.run(&mut transport).await.unwrap();
//! # }
//! ```

pub mod types;
pub mod transport;
pub mod server;
pub mod error;

pub use types::*;
pub use transport::{ChannelTransport, LineTransport, McpTransport, StdioTransport};
pub use server::McpServer;
pub use error::McpError;
