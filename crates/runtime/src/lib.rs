//! toolbridge runtime: tool contracts, dispatch and the model loop.
//!
//! This crate turns the tools of an MCP server into validated invocation
//! contracts and drives a tool-calling model against them.
//!
//! # Overview
//!
//! - **Session**: one connected tool server plus the [`ToolRegistry`] built
//!   from its tool list.
//! - **Schema translation**: each tool's input schema becomes an
//!   [`InvocationContract`] that validates model-produced arguments.
//! - **Dispatcher**: runs tool calls and turns every outcome, including
//!   failures, into a result the model can read.
//! - **Agent**: the model/tool loop over a [`Conversation`], bounded by a
//!   step budget.
//! - **Backend**: a trait abstracting LLM providers (OpenAI-compatible,
//!   Anthropic).
//!
//! # Example
//!
//! ```no_run
//! use mcp::ServerConfig;
//! use runtime::{Agent, AgentConfig, OpenAiBackend, Session};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> runtime::Result<()> {
//! let server = ServerConfig::new("tools", "python").with_args(["mcp_test_serve.py"]);
//! let session = Session::start(server).await?;
//! let backend = OpenAiBackend::builder("sk-...", "qwen-plus")
//!     .base_url("https://dashscope.aliyuncs.com/compatible-mode/v1")
//!     .build();
//!
//! let agent = Agent::new(backend, session, AgentConfig::default());
//! let outcome = agent.ask("What is 2 + 3?", &CancellationToken::new()).await?;
//! println!("{}", outcome.final_answer().unwrap_or_default());
//! agent.session().shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod agent;
mod error;
pub mod model;
pub mod providers;
mod session;
pub mod tools;

#[cfg(test)]
mod testing;

pub use tools::{dispatch, registry, schema};

// Agent loop
pub use agent::{Agent, AgentConfig, Outcome, Termination};

// Error types
pub use error::{Error, Result};

// Conversation model and backend seam
pub use model::{
    Backend, Conversation, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall,
    ToolResult, ToolSpec, Usage,
};

// Providers
pub use providers::{AnthropicBackend, OpenAiBackend, Provider};

// Session management
pub use session::{Session, SessionId};

// Tools
pub use tools::{
    Diagnostic, DispatchOptions, Dispatcher, ExtraArguments, InvocationContract, ParamKind,
    ParameterSpec, ToolError, ToolRegistry, ToolTransport,
};
