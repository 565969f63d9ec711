//! Message and message-log domain types.
//!
//! These are the value objects that flow through a session:
//! the user states a task → the agent thinks (assistant message, possibly
//! with tool calls) → each tool answers (tool message) → repeat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, Some(content.into()))
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(content.into()))
    }

    /// Create an assistant message that proposes tool calls.
    ///
    /// Empty content is stored as `None`.
    pub fn assistant_with_calls(content: Option<String>, tool_calls: Vec<MessageToolCall>) -> Self {
        let mut msg = Self::new(Role::Assistant, content.filter(|c| !c.trim().is_empty()));
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, Some(content.into()))
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, Some(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// The content as a string slice, empty when absent.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Whether the message carries non-blank text.
    pub fn has_text(&self) -> bool {
        !self.text().trim().is_empty()
    }

    /// Whether this assistant message invoked the named tool.
    pub fn calls_tool(&self, name: &str) -> bool {
        self.tool_calls.iter().any(|tc| tc.name == name)
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,
}

/// The ordered, append-only record of one session's conversation.
///
/// `push` enforces the message invariants: every message carries content or
/// tool calls, and a tool message answers a tool call proposed earlier in
/// the log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    /// Create a new empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, rejecting ones that break the log invariants.
    pub fn push(&mut self, message: Message) -> Result<(), Error> {
        if !message.has_text() && message.tool_calls.is_empty() {
            return Err(Error::InvalidMessage(format!(
                "{:?} message has neither content nor tool calls",
                message.role
            )));
        }

        if message.role == Role::Tool {
            let Some(call_id) = message.tool_call_id.as_deref() else {
                return Err(Error::InvalidMessage(
                    "tool message without tool_call_id".into(),
                ));
            };
            let answered = self
                .messages
                .iter()
                .filter(|m| m.role == Role::Assistant)
                .any(|m| m.tool_calls.iter().any(|tc| tc.id == call_id));
            if !answered {
                return Err(Error::InvalidMessage(format!(
                    "tool message references unknown call '{call_id}'"
                )));
            }
        }

        self.messages.push(message);
        Ok(())
    }

    /// All messages in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The last `n` messages (fewer if the log is shorter).
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// The most recent user message, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop every message (fresh log for the next task).
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.messages.iter().map(|m| m.text().len() / 4).sum()
    }
}
