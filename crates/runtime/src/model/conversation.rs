//! Append-only conversation state.

use super::types::{Message, Role, ToolCall};
use thiserror::Error;

/// Violations of the message ordering rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("tool calls still awaiting results: {0:?}")]
    PendingToolCalls(Vec<String>),

    #[error("tool result for unknown or already answered call: {0}")]
    UnexpectedToolResult(String),

    #[error("tool message carries no result")]
    MissingToolResult,
}

/// Ordered sequence of messages exchanged with the model.
///
/// Every tool message must answer a distinct call of the latest assistant
/// message, and nothing else may be appended until all of that message's
/// calls are answered.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    unanswered: Vec<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// A conversation opened by one user message.
    pub fn from_user(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(text)],
            unanswered: Vec::new(),
        }
    }

    /// Append a message, enforcing call/result correlation.
    pub fn push(&mut self, message: Message) -> Result<(), ConversationError> {
        match message.role {
            Role::User | Role::Assistant => {
                if !self.unanswered.is_empty() {
                    return Err(ConversationError::PendingToolCalls(self.unanswered.clone()));
                }
                if message.role == Role::Assistant {
                    self.unanswered = message
                        .tool_calls()
                        .into_iter()
                        .map(|call| call.id.clone())
                        .collect();
                }
            }
            Role::Tool => {
                let result = message
                    .tool_result()
                    .ok_or(ConversationError::MissingToolResult)?;
                let position = self
                    .unanswered
                    .iter()
                    .position(|id| *id == result.tool_call_id)
                    .ok_or_else(|| {
                        ConversationError::UnexpectedToolResult(result.tool_call_id.clone())
                    })?;
                self.unanswered.remove(position);
            }
        }

        self.messages.push(message);
        Ok(())
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> Result<(), ConversationError> {
        self.push(Message::user(text))
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Calls of the latest assistant message that have no result yet.
    pub fn pending_calls(&self) -> Vec<ToolCall> {
        if self.unanswered.is_empty() {
            return Vec::new();
        }
        let Some(assistant) = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
        else {
            return Vec::new();
        };

        let mut outstanding = self.unanswered.clone();
        assistant
            .tool_calls()
            .into_iter()
            .filter(|call| {
                match outstanding.iter().position(|id| *id == call.id) {
                    Some(i) => {
                        outstanding.remove(i);
                        true
                    }
                    None => false,
                }
            })
            .cloned()
            .collect()
    }

    /// Text of the most recent assistant message.
    pub fn last_assistant_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(Message::text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolResult;
    use serde_json::json;

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "add", json!({"a": 1, "b": 2}))
    }

    #[test]
    fn results_must_follow_their_calls() {
        let mut conversation = Conversation::from_user("add things");
        conversation
            .push(Message::assistant_with_calls("", vec![call("a"), call("b")]))
            .unwrap();

        assert_eq!(conversation.pending_calls().len(), 2);

        // No new model turn while calls are unanswered.
        let err = conversation.push(Message::assistant("done")).unwrap_err();
        assert!(matches!(err, ConversationError::PendingToolCalls(ids) if ids.len() == 2));

        conversation
            .push(Message::tool(ToolResult::success(&call("b"), "3")))
            .unwrap();
        assert_eq!(conversation.pending_calls(), vec![call("a")]);

        conversation
            .push(Message::tool(ToolResult::success(&call("a"), "3")))
            .unwrap();
        assert!(conversation.pending_calls().is_empty());

        conversation.push(Message::assistant("3 and 3")).unwrap();
        assert_eq!(conversation.len(), 5);
        assert_eq!(conversation.last_assistant_text().as_deref(), Some("3 and 3"));
    }

    #[test]
    fn uncorrelated_results_are_rejected() {
        let mut conversation = Conversation::from_user("hi");
        conversation
            .push(Message::assistant_with_calls("", vec![call("a")]))
            .unwrap();

        let err = conversation
            .push(Message::tool(ToolResult::success(&call("zzz"), "x")))
            .unwrap_err();
        assert_eq!(err, ConversationError::UnexpectedToolResult("zzz".into()));

        conversation
            .push(Message::tool(ToolResult::success(&call("a"), "x")))
            .unwrap();
        let err = conversation
            .push(Message::tool(ToolResult::success(&call("a"), "x")))
            .unwrap_err();
        assert_eq!(err, ConversationError::UnexpectedToolResult("a".into()));
    }
}
