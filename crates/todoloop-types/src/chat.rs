//! Conversation, message, and summary types for todoloop.
//!
//! A conversation is a sequence of turns. Every message persisted while
//! handling one user input shares a turn id and carries a sequence number
//! that starts at 0 and increases by one per message within that turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

pub use crate::llm::{ActionCall, MessageRole, TokenUsage};

/// Who set the conversation title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleSource {
    Auto,
    User,
}

impl fmt::Display for TitleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TitleSource::Auto => write!(f, "auto"),
            TitleSource::User => write!(f, "user"),
        }
    }
}

impl FromStr for TitleSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(TitleSource::Auto),
            "user" => Ok(TitleSource::User),
            other => Err(format!("invalid title source: '{other}'")),
        }
    }
}

/// Lifecycle state of a chat message.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (state IN ('pending', 'completed', 'failed'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageState {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageState::Pending => write!(f, "pending"),
            MessageState::Completed => write!(f, "completed"),
            MessageState::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for MessageState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(MessageState::Pending),
            "completed" => Ok(MessageState::Completed),
            "failed" => Ok(MessageState::Failed),
            other => Err(format!("invalid message state: '{other}'")),
        }
    }
}

/// A conversation between a user and the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub title_source: TitleSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// A new conversation titled after the first user message.
    pub fn from_first_message(first_message: &str, max_title_chars: usize, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            title: derive_title(first_message, max_title_chars),
            title_source: TitleSource::Auto,
            created_at: now,
            updated_at: now,
            last_message_at: None,
        }
    }
}

/// Derive a conversation title from the first user message.
///
/// Collapses whitespace and cuts at `max_chars` characters, appending an
/// ellipsis when the message was longer.
pub fn derive_title(message: &str, max_chars: usize) -> String {
    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

/// A single persisted message.
///
/// Messages are immutable once created; corrections are new messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub turn_id: Uuid,
    pub turn_sequence: u32,
    pub role: MessageRole,
    pub content: String,
    pub state: MessageState,
    pub error: Option<String>,
    pub usage: Option<TokenUsage>,
    /// Set on tool results: the call this message answers.
    pub action_call_id: Option<String>,
    /// Set on assistant messages that requested tools.
    #[serde(default)]
    pub action_calls: Vec<ActionCall>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rolling natural-language compression of earlier turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: Uuid,
    pub summary: String,
    pub updated_at: DateTime<Utc>,
}

/// Marker key that tool results use to signal failure.
///
/// Tool failures are reported as JSON content of the form
/// `{"error": {"code": ..., "details": ..., "example": ...}}`.
pub const TOOL_ERROR_KEY: &str = "error";

/// Whether tool-result content signals an error.
pub fn content_signals_error(content: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(serde_json::Value::Object(map)) => map
            .get(TOOL_ERROR_KEY)
            .is_some_and(|value| !value.is_null()),
        _ => false,
    }
}
