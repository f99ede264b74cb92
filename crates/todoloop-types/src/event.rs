//! Caller-facing events emitted while a turn runs.
//!
//! `ChatEvent` re-tags the model's turn events for UI consumption so a
//! front end can render incremental progress.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::TokenUsage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// The model accepted a cycle of the turn.
    TurnStarted {
        conversation_id: Uuid,
        turn_id: Uuid,
        user_message_id: Uuid,
        assistant_message_id: Uuid,
    },

    /// A chunk of assistant text, for live display.
    MessageDelta { text: String },

    /// A tool is about to run.
    ActionStarted {
        call_id: String,
        name: String,
        display_text: String,
    },

    /// A tool finished; `failed` mirrors the persisted message state.
    ActionCompleted {
        call_id: String,
        name: String,
        message_id: Uuid,
        failed: bool,
    },

    /// The turn produced its final assistant message.
    TurnCompleted {
        assistant_message_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },

    /// The tool loop was stopped and a fallback reply was stored instead.
    TurnHalted { message_id: Uuid, content: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_event_serde_tag() {
        let event = ChatEvent::ActionStarted {
            call_id: "call-1".to_string(),
            name: "list_todos".to_string(),
            display_text: "Looking at your todos".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"action_started\""));
        let parsed: ChatEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_turn_completed_omits_missing_usage() {
        let event = ChatEvent::TurnCompleted {
            assistant_message_id: Uuid::now_v7(),
            usage: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("usage"));
    }
}
