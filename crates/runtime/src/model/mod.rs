//! LLM protocol types, conversation state and the backend trait.

pub mod conversation;
pub mod errors;
pub mod types;

pub use conversation::{Conversation, ConversationError};
pub use errors::ModelError;
pub use types::{
    Backend, Message, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolResult, ToolSpec,
    Usage,
};
