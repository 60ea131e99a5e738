use std::time::Duration;
use thiserror::Error;

use super::schema::ValidationError;

/// Why a single tool call produced no output.
///
/// The dispatcher renders these into error results for the model; they
/// never abort a run.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),

    #[error(transparent)]
    InvalidArguments(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] mcp::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled before completion")]
    Cancelled,
}
