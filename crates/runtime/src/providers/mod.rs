//! LLM provider adapters.
//!
//! Each provider implements [`Backend`] for its specific API; [`Provider`]
//! picks one at runtime.

mod anthropic;
mod openai;

pub use anthropic::{ANTHROPIC_BASE_URL, AnthropicBackend, AnthropicBackendBuilder};
pub use openai::{OPENAI_BASE_URL, OpenAiBackend, OpenAiBackendBuilder};

use crate::model::{Backend, ModelError, ModelRequest, ModelResponse};

/// A backend chosen by configuration.
pub enum Provider {
    OpenAi(OpenAiBackend),
    Anthropic(AnthropicBackend),
}

impl From<OpenAiBackend> for Provider {
    fn from(backend: OpenAiBackend) -> Self {
        Self::OpenAi(backend)
    }
}

impl From<AnthropicBackend> for Provider {
    fn from(backend: AnthropicBackend) -> Self {
        Self::Anthropic(backend)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi(backend) => write!(f, "{backend}"),
            Self::Anthropic(backend) => write!(f, "{backend}"),
        }
    }
}

impl Backend for Provider {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        match self {
            Self::OpenAi(backend) => backend.call(request).await,
            Self::Anthropic(backend) => backend.call(request).await,
        }
    }
}
