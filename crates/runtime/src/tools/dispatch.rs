//! Execution of model-requested tool calls.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use mcp::CallToolResult;
use tokio_util::sync::CancellationToken;

use super::errors::ToolError;
use super::registry::ToolRegistry;
use super::schema::ExtraArguments;
use super::transport::ToolTransport;
use crate::model::{ToolCall, ToolResult};

/// Output recorded when a tool succeeds without returning content.
pub const EMPTY_SUCCESS: &str = "Success (No content returned)";

/// Default bound on one tool call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    pub timeout: Duration,
    pub extra_arguments: ExtraArguments,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CALL_TIMEOUT,
            extra_arguments: ExtraArguments::default(),
        }
    }
}

/// Validates tool calls against the registry and forwards them.
///
/// Every call yields a [`ToolResult`] correlated to the call's id. Lookup,
/// validation, transport and timeout failures are rendered into error
/// results instead of being raised.
pub struct Dispatcher<T> {
    transport: Arc<T>,
    registry: Arc<ToolRegistry>,
    options: DispatchOptions,
}

impl<T: ToolTransport> Dispatcher<T> {
    pub fn new(transport: Arc<T>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            transport,
            registry,
            options: DispatchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Run one call to completion.
    #[tracing::instrument(skip_all, fields(tool = %call.name, call_id = %call.id))]
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        match self.execute(call).await {
            Ok(output) => {
                let preview: String = output.chars().take(PREVIEW_CHARS).collect();
                tracing::debug!(%preview, "tool call succeeded");
                ToolResult::success(call, output)
            }
            Err(e) => {
                tracing::warn!(error = %e, "tool call failed");
                failure(call, &e)
            }
        }
    }

    /// Run a batch concurrently. Results come back in call order.
    ///
    /// Calls still running when `cancel` fires get a cancelled result.
    pub async fn dispatch_all(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Vec<ToolResult> {
        join_all(calls.iter().map(|call| async move {
            tokio::select! {
                result = self.dispatch(call) => result,
                () = cancel.cancelled() => failure(call, &ToolError::Cancelled),
            }
        }))
        .await
    }

    async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        let contract = self.registry.get(&call.name)?;
        let mut arguments = contract.validate(&call.input, self.options.extra_arguments)?;

        // Absent optionals are left to the server's own defaults.
        arguments.retain(|_, value| !value.is_null());

        let result = tokio::time::timeout(
            self.options.timeout,
            self.transport.call_tool(contract.name(), arguments),
        )
        .await
        .map_err(|_| ToolError::Timeout(self.options.timeout))??;

        Ok(render(&result))
    }
}

fn failure(call: &ToolCall, error: &ToolError) -> ToolResult {
    ToolResult::error(call, format!("Error executing tool {}: {error}", call.name))
}

fn render(result: &CallToolResult) -> String {
    if result.content.is_empty() {
        return EMPTY_SUCCESS.to_string();
    }
    let text = result.text();
    if !text.is_empty() {
        return text;
    }
    // Only non-text chunks: hand the model their JSON form.
    serde_json::to_string(&result.content).unwrap_or_else(|_| EMPTY_SUCCESS.to_string())
}
