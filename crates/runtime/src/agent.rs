//! The model/tool loop.
//!
//! An [`Agent`] alternates between querying the model and dispatching the
//! tool calls it asks for, until the model answers without calls or the
//! step budget runs out:
//!
//! ```text
//! AwaitModel ──calls──▶ Dispatch ──results──▶ AwaitModel ──no calls──▶ Done
//!     └──────────────── budget reached ─────────────────────────────▶ Done
//! ```

use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::model::{Backend, Conversation, Message, ModelRequest, ToolCall, Usage};
use crate::session::Session;
use crate::tools::{DispatchOptions, ExtraArguments, ToolTransport};
use crate::{Error, Result};

pub const DEFAULT_STEP_BUDGET: usize = 15;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Answer reported for a run that hit the step budget.
pub const TRUNCATION_MARKER: &str = "[truncated: step budget reached before a final answer]";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum number of model queries per run.
    pub step_budget: usize,
    /// Bound on each model query and each tool call.
    pub request_timeout: Duration,
    pub extra_arguments: ExtraArguments,
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            step_budget: DEFAULT_STEP_BUDGET,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            extra_arguments: ExtraArguments::Ignore,
            system_prompt: None,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The model answered without requesting tools.
    Completed,
    /// The step budget ran out first.
    Truncated,
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub conversation: Conversation,
    /// Model queries made.
    pub steps: usize,
    pub termination: Termination,
    pub usage: Usage,
}

impl Outcome {
    /// Text of the model's closing message.
    ///
    /// A truncated run has no closing message; its answer is
    /// [`TRUNCATION_MARKER`] rather than text from an intermediate turn.
    pub fn final_answer(&self) -> Option<String> {
        match self.termination {
            Termination::Completed => self.conversation.last_assistant_text(),
            Termination::Truncated => Some(TRUNCATION_MARKER.to_string()),
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.termination == Termination::Truncated
    }
}

enum State {
    AwaitModel,
    Dispatch(Vec<ToolCall>),
    Done(Termination),
}

/// Drives a model backend against one tool session.
pub struct Agent<B, T> {
    backend: B,
    session: Session<T>,
    config: AgentConfig,
}

impl<B: Backend, T: ToolTransport> Agent<B, T> {
    pub fn new(backend: B, session: Session<T>, config: AgentConfig) -> Self {
        Self {
            backend,
            session,
            config,
        }
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run a fresh conversation opened by `input`.
    pub async fn ask(&self, input: &str, cancel: &CancellationToken) -> Result<Outcome> {
        self.run(Conversation::from_user(input), cancel).await
    }

    /// Continue `conversation` until the model stops calling tools.
    ///
    /// Calls left unanswered by a previous run are dispatched first. On
    /// cancellation the session is shut down and the conversation dropped.
    #[tracing::instrument(skip_all, fields(session = %self.session.id))]
    pub async fn run(
        &self,
        mut conversation: Conversation,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let dispatcher = self.session.dispatcher(DispatchOptions {
            timeout: self.config.request_timeout,
            extra_arguments: self.config.extra_arguments,
        });
        let mut steps = 0;
        let mut usage = Usage::default();

        let pending = conversation.pending_calls();
        let mut state = if pending.is_empty() {
            State::AwaitModel
        } else {
            State::Dispatch(pending)
        };

        loop {
            state = match state {
                State::AwaitModel if steps >= self.config.step_budget => {
                    tracing::warn!(budget = self.config.step_budget, "step budget exhausted");
                    State::Done(Termination::Truncated)
                }

                State::AwaitModel => {
                    steps += 1;
                    tracing::info!(step = steps, messages = conversation.len(), "querying model");

                    let specs = self.session.registry().specs();
                    let request = ModelRequest {
                        system: self.config.system_prompt.as_deref(),
                        messages: conversation.messages(),
                        tools: &specs,
                    };

                    let response = tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(self.abort().await),
                        reply = timeout(self.config.request_timeout, self.backend.call(request)) => {
                            reply.map_err(|_| Error::Timeout(self.config.request_timeout))??
                        }
                    };
                    usage += response.usage;

                    let calls: Vec<ToolCall> =
                        response.message.tool_calls().into_iter().cloned().collect();
                    conversation.push(response.message)?;

                    if calls.is_empty() {
                        State::Done(Termination::Completed)
                    } else {
                        State::Dispatch(calls)
                    }
                }

                State::Dispatch(calls) => {
                    for call in &calls {
                        tracing::info!(tool = %call.name, call_id = %call.id, "tool requested");
                    }

                    let results = dispatcher.dispatch_all(&calls, cancel).await;
                    if cancel.is_cancelled() {
                        let cancelled = results.iter().filter(|r| r.is_error).count();
                        tracing::debug!(cancelled, "discarding partial turn");
                        return Err(self.abort().await);
                    }

                    for result in results {
                        conversation.push(Message::tool(result))?;
                    }
                    State::AwaitModel
                }

                State::Done(termination) => {
                    tracing::info!(steps, ?termination, "run finished");
                    return Ok(Outcome {
                        conversation,
                        steps,
                        termination,
                        usage,
                    });
                }
            };
        }
    }

    async fn abort(&self) -> Error {
        tracing::warn!("run cancelled, closing session");
        self.session.shutdown().await;
        Error::Cancelled
    }
}
