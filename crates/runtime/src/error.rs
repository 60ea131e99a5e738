use std::time::Duration;

use thiserror::Error;

use crate::model::{ConversationError, ModelError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("tool server: {0}")]
    Transport(#[from] mcp::Error),

    #[error("model: {0}")]
    Model(#[from] ModelError),

    #[error("conversation: {0}")]
    Conversation(#[from] ConversationError),

    #[error("model did not respond within {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
