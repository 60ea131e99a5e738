//! Session lifecycle: one tool server, its catalog, and an id for logs.

use std::sync::Arc;

use mcp::{Server, ServerConfig};
use uuid::Uuid;

use crate::Result;
use crate::tools::{Catalog, DispatchOptions, Dispatcher, ToolRegistry, ToolTransport};

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected tool server and the tools discovered on it.
///
/// The transport is closed by [`Session::shutdown`]; a spawned server is
/// also killed when the last handle to it is dropped.
pub struct Session<T = Server> {
    pub id: SessionId,
    transport: Arc<T>,
    registry: Arc<ToolRegistry>,
}

impl Session<Server> {
    /// Spawn the server, complete the handshake and discover its tools.
    pub async fn start(config: ServerConfig) -> Result<Self> {
        let server = Server::spawn(config).await?;
        if let Err(e) = server.initialize().await {
            server.shutdown().await;
            return Err(e.into());
        }
        Self::with_transport(server).await
    }
}

impl<T: ToolTransport> Session<T> {
    /// Discover tools over an already initialized transport.
    pub async fn with_transport(transport: T) -> Result<Self> {
        let id = SessionId::new();
        let registry = match ToolRegistry::discover(&transport).await {
            Ok(registry) => registry,
            Err(e) => {
                transport.close().await;
                return Err(e.into());
            }
        };

        tracing::info!(session = %id, tools = registry.snapshot().len(), "session started");
        Ok(Self {
            id,
            transport: Arc::new(transport),
            registry: Arc::new(registry),
        })
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// A dispatcher over this session's transport and registry.
    pub fn dispatcher(&self, options: DispatchOptions) -> Dispatcher<T> {
        Dispatcher::new(Arc::clone(&self.transport), Arc::clone(&self.registry))
            .with_options(options)
    }

    /// Re-list the server's tools and swap in the new catalog.
    pub async fn rediscover(&self) -> Result<Arc<Catalog>> {
        Ok(self.registry.rediscover(self.transport.as_ref()).await?)
    }

    /// Close the transport. Calls made afterwards fail.
    pub async fn shutdown(&self) {
        self.transport.close().await;
        tracing::info!(session = %self.id, "session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolCall;
    use crate::testing::{StubTransport, add_tool, sum};
    use mcp::Timeouts;
    use serde_json::{Value, json};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    /// A tool server on an in-memory pipe that exposes `add`.
    fn adding_server() -> Server {
        let (client, remote) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client);

        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(remote);
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let message: Value = serde_json::from_str(&line).unwrap();
                let Some(id) = message.get("id").cloned() else {
                    continue;
                };
                let result = match message["method"].as_str() {
                    Some("initialize") => json!({
                        "protocolVersion": mcp::PROTOCOL_VERSION,
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "adder"}
                    }),
                    Some("tools/list") => json!({"tools": [{
                        "name": "add",
                        "description": "Add two numbers",
                        "inputSchema": add_tool().input_schema
                    }]}),
                    Some("tools/call") => {
                        let args = &message["params"]["arguments"];
                        let total = args["a"].as_i64().unwrap() + args["b"].as_i64().unwrap();
                        json!({"content": [{"type": "text", "text": total.to_string()}]})
                    }
                    _ => continue,
                };
                let reply = json!({"jsonrpc": "2.0", "id": id, "result": result});
                if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                    return;
                }
            }
        });

        Server::connect("adder", client_read, client_write, Timeouts::default())
    }

    #[tokio::test]
    async fn mcp_server_backs_a_session() {
        let server = adding_server();
        server.initialize().await.unwrap();
        let session = Session::with_transport(server).await.unwrap();

        let contract = session.registry().get("add").unwrap();
        assert_eq!(contract.description(), "Add two numbers");

        let dispatcher = session.dispatcher(DispatchOptions::default());
        let result = dispatcher
            .dispatch(&ToolCall::new("c1", "add", json!({"a": 2, "b": 3})))
            .await;
        assert_eq!(result.output, "5");
        assert!(!result.is_error);

        session.shutdown().await;
        let after = dispatcher
            .dispatch(&ToolCall::new("c2", "add", json!({"a": 1, "b": 1})))
            .await;
        assert!(after.is_error);
    }

    #[tokio::test]
    async fn session_discovers_and_shuts_down() {
        let session = Session::with_transport(StubTransport::new().with_tool(add_tool(), sum))
            .await
            .unwrap();

        assert!(session.registry().get("add").is_ok());
        assert_ne!(session.id, SessionId::new());

        session.shutdown().await;
        assert!(session.transport().is_closed());
    }

    #[tokio::test]
    async fn spawn_failure_is_a_transport_error() {
        let config = ServerConfig::new("missing", "/nonexistent/tool-server");
        let err = Session::start(config).await.err().unwrap();
        assert!(matches!(err, crate::Error::Transport(mcp::Error::Spawn(_))));
    }
}
