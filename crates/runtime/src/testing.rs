//! In-process doubles for the transport and model seams.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use mcp::{CallToolResult, Tool, ToolContent};
use serde_json::{Map, Value, json};

use crate::model::{Backend, Message, ModelError, ModelRequest, ModelResponse, ToolCall, Usage};
use crate::tools::ToolTransport;

type Handler = Box<dyn Fn(&Map<String, Value>) -> Result<String, String> + Send + Sync>;

pub fn tool(name: &str, schema: Value) -> Tool {
    Tool {
        name: name.into(),
        description: Some(format!("{name} tool")),
        input_schema: schema,
    }
}

pub fn add_tool() -> Tool {
    tool(
        "add",
        json!({
            "type": "object",
            "properties": {
                "a": {"type": "integer", "description": "first addend"},
                "b": {"type": "integer", "description": "second addend"}
            },
            "required": ["a", "b"]
        }),
    )
}

pub fn sum(arguments: &Map<String, Value>) -> Result<String, String> {
    let a = arguments.get("a").and_then(Value::as_i64).ok_or("a")?;
    let b = arguments.get("b").and_then(Value::as_i64).ok_or("b")?;
    Ok((a + b).to_string())
}

/// Tool server stub. Handlers returning `Err` behave like a server
/// reporting `isError`.
#[derive(Default)]
pub struct StubTransport {
    tools: Mutex<Vec<Tool>>,
    handlers: HashMap<String, Handler>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    received: Mutex<Vec<(String, Map<String, Value>)>>,
    closed: AtomicBool,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(
        mut self,
        tool: Tool,
        handler: impl Fn(&Map<String, Value>) -> Result<String, String> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(tool.name.clone(), Box::new(handler));
        self.tools.get_mut().unwrap().push(tool);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_tools(&self, tools: Vec<Tool>) {
        *self.tools.lock().unwrap() = tools;
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.tools.lock().unwrap().clone()
    }

    /// Number of calls that reached the transport.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<(String, Map<String, Value>)> {
        self.received.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ToolTransport for StubTransport {
    async fn list_tools(&self) -> mcp::Result<Vec<Tool>> {
        Ok(self.tools())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> mcp::Result<CallToolResult> {
        if self.is_closed() {
            return Err(mcp::Error::ServerExited);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let Some(handler) = self.handlers.get(name) else {
            return Err(mcp::Error::JsonRpc(mcp::JsonRpcError::server(format!(
                "Unknown tool: {name}"
            ))));
        };
        match handler(&arguments) {
            Ok(text) if text.is_empty() => Ok(CallToolResult {
                content: Vec::new(),
                is_error: false,
            }),
            Ok(text) => Ok(CallToolResult {
                content: vec![ToolContent::Text { text }],
                is_error: false,
            }),
            Err(message) => Err(mcp::Error::ToolCallFailed(message)),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Model stub that replays queued turns and records what it was sent.
///
/// Once the script runs out it keeps answering with `fallback`, if set.
#[derive(Default)]
pub struct ScriptedBackend {
    turns: Mutex<VecDeque<Message>>,
    fallback: Option<Message>,
    delay: Duration,
    seen: Mutex<Vec<Vec<Message>>>,
    tools_seen: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(turns: impl IntoIterator<Item = Message>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().collect()),
            ..Self::default()
        }
    }

    /// A model that requests `call` on every turn.
    pub fn always_calling(call: ToolCall) -> Self {
        Self {
            fallback: Some(Message::assistant_with_calls("Let me compute that first.", vec![call])),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of model queries served.
    pub fn queries(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Conversation sent with each query, in order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }

    /// Tool count advertised on the latest query.
    pub fn tools_seen(&self) -> usize {
        self.tools_seen.load(Ordering::SeqCst)
    }
}

impl Backend for ScriptedBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        self.seen.lock().unwrap().push(request.messages.to_vec());
        self.tools_seen.store(request.tools.len(), Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.turns.lock().unwrap().pop_front();
        let message = next
            .or_else(|| self.fallback.clone())
            .ok_or(ModelError::EmptyResponse)?;
        Ok(ModelResponse {
            message,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
        })
    }
}
