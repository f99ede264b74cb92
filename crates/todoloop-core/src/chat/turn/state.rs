//! Per-cycle state machine over the model's turn events.
//!
//! One `CycleMachine` consumes the events of a single model invocation. It
//! performs no I/O: each accepted event yields a [`Reaction`] for the
//! orchestrator to act on, and out-of-order events are rejected.
//!
//! ```text
//! AwaitingTurnStart --TurnStarted--> Streaming --ActionRequested--> AwaitingToolResult
//!                                      |  ^ MessageDelta                |  ^ ActionRequested
//!                                      |                                |    MessageDelta
//!                                      +--TurnCompleted--> Completed <--+
//! any state --fail()--> Failed
//! ```

use todoloop_types::llm::{ActionCall, TokenUsage, TurnEvent};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    AwaitingTurnStart,
    Streaming,
    AwaitingToolResult,
    Completed,
    Failed,
}

impl std::fmt::Display for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CycleState::AwaitingTurnStart => "awaiting_turn_start",
            CycleState::Streaming => "streaming",
            CycleState::AwaitingToolResult => "awaiting_tool_result",
            CycleState::Completed => "completed",
            CycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// An event arrived that the current state does not accept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unexpected {event} while {state}")]
pub struct ProtocolViolation {
    pub state: CycleState,
    pub event: &'static str,
}

/// What the orchestrator should do in response to an accepted event.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    Started {
        user_message_id: Uuid,
        assistant_message_id: Uuid,
    },
    Delta(String),
    ActionRequested {
        call: ActionCall,
        display_text: Option<String>,
    },
    Completed,
}

/// Everything a finished cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub assistant_message_id: Uuid,
    pub content: String,
    pub calls: Vec<ActionCall>,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug)]
pub struct CycleMachine {
    state: CycleState,
    assistant_message_id: Option<Uuid>,
    content: String,
    calls: Vec<ActionCall>,
    usage: Option<TokenUsage>,
}

impl Default for CycleMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleMachine {
    pub fn new() -> Self {
        Self {
            state: CycleState::AwaitingTurnStart,
            assistant_message_id: None,
            content: String::new(),
            calls: Vec::new(),
            usage: None,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// The assistant message id once the turn has started.
    pub fn assistant_message_id(&self) -> Option<Uuid> {
        self.assistant_message_id
    }

    /// Text streamed so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Replace the provider-assigned assistant id (e.g. when it was already
    /// used earlier in the turn).
    pub fn assign_assistant_id(&mut self, id: Uuid) {
        self.assistant_message_id = Some(id);
    }

    pub fn apply(&mut self, event: TurnEvent) -> Result<Reaction, ProtocolViolation> {
        use CycleState::*;

        match (self.state, event) {
            (
                AwaitingTurnStart,
                TurnEvent::TurnStarted {
                    user_message_id,
                    assistant_message_id,
                },
            ) => {
                self.state = Streaming;
                self.assistant_message_id = Some(assistant_message_id);
                Ok(Reaction::Started {
                    user_message_id,
                    assistant_message_id,
                })
            }
            (Streaming | AwaitingToolResult, TurnEvent::MessageDelta { text }) => {
                self.content.push_str(&text);
                Ok(Reaction::Delta(text))
            }
            (
                Streaming | AwaitingToolResult,
                TurnEvent::ActionRequested {
                    id,
                    name,
                    input,
                    display_text,
                },
            ) => {
                self.state = AwaitingToolResult;
                let call = ActionCall { id, name, input };
                self.calls.push(call.clone());
                Ok(Reaction::ActionRequested { call, display_text })
            }
            (Streaming | AwaitingToolResult, TurnEvent::TurnCompleted { usage, .. }) => {
                self.state = Completed;
                self.usage = usage;
                Ok(Reaction::Completed)
            }
            (state, event) => {
                self.state = Failed;
                Err(ProtocolViolation {
                    state,
                    event: event_name(&event),
                })
            }
        }
    }

    /// Mark the cycle failed, keeping the partial content for the failure record.
    pub fn fail(&mut self) {
        self.state = CycleState::Failed;
    }

    /// Close the cycle once the stream has ended.
    ///
    /// Fails unless a `TurnCompleted` event was seen. The machine keeps its
    /// content, so a later persistence failure can still be recorded.
    pub fn finish(&mut self) -> Result<CycleOutcome, ProtocolViolation> {
        match (self.state, self.assistant_message_id) {
            (CycleState::Completed, Some(assistant_message_id)) => Ok(CycleOutcome {
                assistant_message_id,
                content: self.content.clone(),
                calls: self.calls.clone(),
                usage: self.usage,
            }),
            (state, _) => {
                self.state = CycleState::Failed;
                Err(ProtocolViolation {
                    state,
                    event: "end of stream",
                })
            }
        }
    }
}

fn event_name(event: &TurnEvent) -> &'static str {
    match event {
        TurnEvent::TurnStarted { .. } => "turn_started",
        TurnEvent::MessageDelta { .. } => "message_delta",
        TurnEvent::ActionRequested { .. } => "action_requested",
        TurnEvent::TurnCompleted { .. } => "turn_completed",
    }
}
