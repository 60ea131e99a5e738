//! The seam between tool dispatch and a connected tool server.

use mcp::{CallToolResult, Server, Tool};
use serde_json::{Map, Value};
use std::future::Future;

/// Anything that can list and call tools.
///
/// [`mcp::Server`] is the production implementation; tests substitute an
/// in-process stub.
pub trait ToolTransport: Send + Sync {
    /// Every tool the server currently exposes.
    fn list_tools(&self) -> impl Future<Output = mcp::Result<Vec<Tool>>> + Send;

    /// Invoke one tool with already validated arguments.
    fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> impl Future<Output = mcp::Result<CallToolResult>> + Send;

    /// Release the connection. Later calls fail.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

impl ToolTransport for Server {
    async fn list_tools(&self) -> mcp::Result<Vec<Tool>> {
        Server::list_tools(self).await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> mcp::Result<CallToolResult> {
        Server::call_tool(self, name, Some(arguments)).await
    }

    async fn close(&self) {
        self.shutdown().await;
    }
}
