//! Model request/event types for todoloop.
//!
//! These types model the data shapes exchanged with a streaming chat model:
//! the turn request, the typed events a turn emits, token usage, tool
//! definitions, and provider errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
    Developer,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
            MessageRole::Developer => write!(f, "developer"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "tool" => Ok(MessageRole::Tool),
            "developer" => Ok(MessageRole::Developer),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A structured request, emitted by the model, to invoke a tool by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    /// Correlation id assigned by the model; echoed on the tool result.
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

impl ActionCall {
    /// Canonical form of the call input.
    ///
    /// Raw JSON strings are parsed first. `serde_json::Map` keeps keys
    /// sorted at every level, so inputs that differ only in key order or surrounding
    /// whitespace normalize to the same bytes.
    pub fn normalized_input(&self) -> String {
        match &self.input {
            serde_json::Value::String(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(parsed) => parsed.to_string(),
                Err(_) => raw.trim().to_string(),
            },
            other => other.to_string(),
        }
    }
}

/// Token usage reported when a model turn completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Accumulate another usage report into this one.
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A tool the model may request, with a JSON schema for its input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A single message in a turn request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMessage {
    pub role: MessageRole,
    pub content: String,
    /// Set on tool results: the id of the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_call_id: Option<String>,
    /// Set on assistant messages that requested tools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_calls: Vec<ActionCall>,
}

impl TurnMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            action_call_id: None,
            action_calls: Vec::new(),
        }
    }

    /// A tool-role result answering the call with the given id.
    pub fn tool_result(action_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            action_call_id: Some(action_call_id.into()),
            action_calls: Vec::new(),
        }
    }
}

/// Request for one streaming model turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub model: String,
    pub messages: Vec<TurnMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    /// Id of the persisted user message this turn answers.
    pub user_message_id: Uuid,
}

/// Events emitted during one streaming model turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// The provider accepted the turn and assigned message identifiers.
    TurnStarted {
        user_message_id: Uuid,
        assistant_message_id: Uuid,
    },

    /// A fragment of assistant text.
    MessageDelta { text: String },

    /// The model wants a tool invoked.
    ActionRequested {
        id: String,
        name: String,
        input: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_text: Option<String>,
    },

    /// The turn has finished.
    TurnCompleted {
        assistant_message_id: Uuid,
        completed_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
}

/// Errors from model provider operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
