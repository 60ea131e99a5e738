//! MCP (Model Context Protocol) client library.
//!
//! This crate provides a client for communicating with MCP tool servers via
//! stdio. Requests are correlated by JSON-RPC id, so a single [`Server`] can
//! serve many concurrent tool calls.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Server, ServerConfig};
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ServerConfig::new("tools", "python").with_args(["mcp_test_serve.py"]);
//!
//! let server = Server::spawn(config).await?;
//! server.initialize().await?;
//!
//! for tool in server.list_tools().await? {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let mut args = serde_json::Map::new();
//! args.insert("a".into(), 2.into());
//! args.insert("b".into(), 3.into());
//! let result = server.call_tool("add", Some(args)).await?;
//! println!("{}", result.text());
//!
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod protocol;
mod server;

pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, EmbeddedResource, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, RequestId,
    ServerCapabilities, ServerInfo, Tool, ToolContent,
};
pub use server::{
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_STARTUP_TIMEOUT, MAX_OUTPUT_SIZE, MAX_TOOL_PAGES, Server,
    ServerConfig, Timeouts,
};
