//! MCP server management (spawn, communicate, lifecycle).
//!
//! A [`Server`] owns one child process and one JSON-RPC channel. Requests are
//! written line by line to the child's stdin; a background reader task parses
//! stdout and routes each response to the caller waiting on its id, so any
//! number of requests may be in flight at once.

use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, IncomingMessage, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsParams,
    ListToolsResult, RequestId, ServerRequest, Tool,
};

/// Default bound on the `initialize` handshake.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Default bound on every other request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum response size (1MB).
/// Sized for large tool outputs (file reads, search results).
///
/// A longer response is answered with an error for its caller. The line is
/// still read in full first, so this bounds what callers see, not what the
/// reader buffers.
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Upper bound on `tools/list` pages fetched during one listing.
pub const MAX_TOOL_PAGES: usize = 100;

/// Time limits applied to server requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on the handshake.
    pub startup: Duration,
    /// Bound on each request after the handshake.
    pub request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup: DEFAULT_STARTUP_TIMEOUT,
            request: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Configuration for an MCP server.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub timeouts: Timeouts,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type Pending = HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>;

/// State shared between callers and the reader task.
struct Channel {
    server: String,
    writer: Mutex<Writer>,
    pending: StdMutex<Pending>,
    closed: AtomicBool,
}

impl Channel {
    fn pending(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn write_line(&self, message: &impl Serialize) -> Result<()> {
        let mut json = serde_json::to_string(message)?;
        json.push('\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    fn route(&self, response: JsonRpcResponse) {
        let waiter = self.pending().remove(&response.id);
        match waiter {
            Some(tx) => {
                // The caller may have timed out in the meantime.
                let _ = tx.send(response);
            }
            None => tracing::debug!(
                server = %self.server,
                id = %response.id,
                "dropping response with no waiting caller"
            ),
        }
    }

    async fn answer(&self, request: ServerRequest) {
        let reply = if request.method == "ping" {
            JsonRpcResponse::success(request.id, Value::Object(Map::new()))
        } else {
            tracing::debug!(server = %self.server, method = %request.method, "unsupported server request");
            JsonRpcResponse::failure(
                request.id,
                JsonRpcError {
                    code: -32601,
                    message: format!("method not found: {}", request.method),
                    data: None,
                },
            )
        };

        if let Err(e) = self.write_line(&reply).await {
            tracing::warn!(server = %self.server, error = %e, "failed to answer server request");
        }
    }

    /// Mark the channel dead and fail everyone still waiting.
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pending().clear();
    }
}

/// Handle to a running MCP server.
pub struct Server {
    name: String,
    channel: Arc<Channel>,
    process: Mutex<Option<Child>>,
    reader: JoinHandle<()>,
    next_id: AtomicI64,
    timeouts: Timeouts,
    server_info: OnceLock<InitializeResult>,
}

impl Server {
    /// Spawn a new MCP server process.
    pub async fn spawn(config: ServerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(Error::Spawn)?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdout")))?;

        tracing::info!(
            server = %config.name,
            command = %config.command,
            pid = ?process.id(),
            "spawned MCP server"
        );

        let server = Self::connect(config.name, stdout, stdin, config.timeouts);
        *server.process.lock().await = Some(process);
        Ok(server)
    }

    /// Attach to a server over an existing byte channel.
    ///
    /// Must be called from within a Tokio runtime: the reader task is spawned
    /// immediately.
    pub fn connect<R, W>(name: impl Into<String>, reader: R, writer: W, timeouts: Timeouts) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let name = name.into();
        let channel = Arc::new(Channel {
            server: name.clone(),
            writer: Mutex::new(Box::new(writer)),
            pending: StdMutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        let reader = tokio::spawn(read_loop(Arc::clone(&channel), BufReader::new(reader)));

        Self {
            name,
            channel,
            process: Mutex::new(None),
            reader,
            next_id: AtomicI64::new(1),
            timeouts,
            server_info: OnceLock::new(),
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Perform the MCP handshake (must be called before other operations).
    pub async fn initialize(&self) -> Result<&InitializeResult> {
        let startup = self.timeouts.startup;
        let result: InitializeResult = match self
            .request("initialize", Some(InitializeParams::default()), startup)
            .await
        {
            Err(Error::Timeout { .. }) => return Err(Error::HandshakeTimeout(startup)),
            other => other?,
        };

        self.notify("notifications/initialized").await?;

        tracing::info!(
            server = %self.name,
            remote = %result.server_info.name,
            protocol = %result.protocol_version,
            "MCP handshake complete"
        );

        Ok(self.server_info.get_or_init(|| result))
    }

    /// Check if the server is initialized.
    pub fn is_initialized(&self) -> bool {
        self.server_info.get().is_some()
    }

    /// Get server info (after initialization).
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.get()
    }

    /// List every tool the server exposes, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.ensure_initialized()?;

        let mut tools = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = None;
        for _ in 0..MAX_TOOL_PAGES {
            let page: ListToolsResult = self
                .request("tools/list", Some(ListToolsParams { cursor }), self.timeouts.request)
                .await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => {
                    if !seen.insert(next.clone()) {
                        return Err(Error::InvalidResponse(format!(
                            "tools/list: cursor {next:?} repeated"
                        )));
                    }
                    cursor = Some(next);
                }
                _ => {
                    tracing::debug!(server = %self.name, count = tools.len(), "listed tools");
                    return Ok(tools);
                }
            }
        }

        Err(Error::InvalidResponse(format!(
            "tools/list: more than {MAX_TOOL_PAGES} pages"
        )))
    }

    /// Call a tool by name.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult> {
        self.ensure_initialized()?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        let result: CallToolResult = self
            .request("tools/call", Some(params), self.timeouts.request)
            .await?;

        // Check for error flag
        if result.is_error {
            return Err(Error::ToolCallFailed(result.text()));
        }

        Ok(result)
    }

    /// Check if the server process is still running.
    pub async fn is_running(&self) -> bool {
        if self.channel.closed.load(Ordering::SeqCst) {
            return false;
        }
        match self.process.lock().await.as_mut() {
            Some(process) => matches!(process.try_wait(), Ok(None)),
            None => true,
        }
    }

    /// Stop reading, fail pending requests and kill the process.
    pub async fn shutdown(&self) {
        self.reader.abort();
        self.channel.close();

        if let Some(mut process) = self.process.lock().await.take() {
            if let Err(e) = process.kill().await {
                tracing::warn!(server = %self.name, error = %e, "failed to kill MCP server");
            } else {
                tracing::info!(server = %self.name, "MCP server stopped");
            }
        }
    }

    // --- Internal methods ---

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>, wait: Duration) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        let (tx, rx) = oneshot::channel();
        self.channel.pending().insert(id.clone(), tx);

        // The reader sets `closed` before draining, so a request registered
        // after the drain is caught here.
        if self.channel.closed.load(Ordering::SeqCst) {
            self.channel.pending().remove(&id);
            return Err(Error::ServerExited);
        }

        if let Err(e) = self.channel.write_line(&request).await {
            self.channel.pending().remove(&id);
            return Err(e);
        }
        tracing::debug!(server = %self.name, %id, method, "sent request");

        let response = match timeout(wait, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(Error::ServerExited),
            Err(_) => {
                self.channel.pending().remove(&id);
                return Err(Error::Timeout {
                    method: method.to_string(),
                    after: wait,
                });
            }
        };

        let result_value = response.into_result()?;
        serde_json::from_value(result_value)
            .map_err(|e| Error::InvalidResponse(format!("{method}: {e}")))
    }

    async fn notify(&self, method: &str) -> Result<()> {
        self.channel
            .write_line(&JsonRpcNotification::new(method))
            .await
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        // The child itself is killed on drop.
        self.reader.abort();
        self.channel.close();
    }
}

async fn read_loop<R>(channel: Arc<Channel>, mut reader: BufReader<R>)
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                tracing::info!(server = %channel.server, "MCP server closed its output");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(server = %channel.server, error = %e, "failed to read from MCP server");
                break;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<IncomingMessage>(trimmed) {
            Ok(IncomingMessage::Response(response)) => {
                let response = if trimmed.len() > MAX_OUTPUT_SIZE {
                    JsonRpcResponse::failure(
                        response.id,
                        JsonRpcError::server(format!(
                            "output too large: {} bytes (max {MAX_OUTPUT_SIZE})",
                            trimmed.len()
                        )),
                    )
                } else {
                    response
                };
                channel.route(response);
            }
            Ok(IncomingMessage::Request(request)) => {
                // Answered off the read path so a caller holding the writer
                // cannot stall reading.
                let channel = Arc::clone(&channel);
                tokio::spawn(async move { channel.answer(request).await });
            }
            Ok(IncomingMessage::Notification(notification)) => tracing::debug!(
                server = %channel.server,
                method = %notification.method,
                "server notification"
            ),
            // Not JSON-RPC: most likely log output on stdout.
            Err(_) => tracing::debug!(server = %channel.server, line = trimmed, "skipping non JSON-RPC output"),
        }
    }

    channel.close();
}
