//! Conversation-turn orchestrator.
//!
//! `TurnOrchestrator::execute` drives one user input to completion:
//!
//! 1. Resolve (or create) the conversation and build the model context from
//!    the summary and the recent history window.
//! 2. Persist the user message (sequence 0).
//! 3. Loop: stream a model cycle through a [`state::CycleMachine`]; if the
//!    cycle requested tools, persist the assistant request, run each tool,
//!    persist each result and feed it back. Stop on a plain reply or when
//!    the [`loop_guard::LoopGuard`] halts the loop.
//! 4. Persist the final assistant message (or the halt apology).
//!
//! Every message is written by the per-turn writer in its own transaction
//! together with its outbox record. An error while a model cycle is open is
//! recorded as a `failed` assistant message before it is returned.

pub mod loop_guard;
mod persist;
pub mod sink;
pub mod state;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use todoloop_types::chat::{
    ChatMessage, Conversation, ConversationSummary, MessageState, content_signals_error,
};
use todoloop_types::config::{ChatConfig, OutboxConfig};
use todoloop_types::error::{RepositoryError, SinkError};
use todoloop_types::event::ChatEvent;
use todoloop_types::llm::{ActionCall, LlmError, MessageRole, TokenUsage, TurnMessage, TurnRequest};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::llm::ChatModel;
use crate::repository::{
    ChatMessageRepository, ConversationRepository, SummaryRepository, Transaction, UnitOfWork,
};
use crate::tool::{ToolRegistry, tool_error_summary};

use loop_guard::{GuardVerdict, HaltReason, LoopGuard};
use persist::TurnWriter;
use state::{CycleMachine, ProtocolViolation, Reaction};

pub use sink::{EventSink, NullSink};

/// Assistant reply persisted when the tool loop is halted.
pub const HALT_MESSAGE: &str = "Sorry, I could not process your request. Please try again.";

/// Prefix of the developer message that carries the conversation summary.
pub const SUMMARY_PREFIX: &str = "Summary of earlier conversation:";

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    /// Continue an existing conversation instead of starting a new one.
    pub conversation_id: Option<Uuid>,
    /// Overrides the configured sampling temperature.
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The model produced a final reply.
    Completed { assistant_message_id: Uuid },
    /// The loop guard stopped the tool loop; the apology was persisted.
    Halted { message_id: Uuid, reason: HaltReason },
}

/// What a successful turn did.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSummary {
    pub conversation_id: Uuid,
    pub turn_id: Uuid,
    pub user_message_id: Uuid,
    pub outcome: TurnOutcome,
    /// Model invocations made.
    pub cycles: u32,
    pub messages_persisted: u32,
    /// Usage summed over every cycle that reported it.
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("conversation not found: {0}")]
    ConversationNotFound(Uuid),

    #[error(transparent)]
    Model(#[from] LlmError),

    #[error("model protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("persistence error: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("turn cancelled")]
    Cancelled,
}

/// Identifiers threaded through every event of a turn.
#[derive(Debug, Clone, Copy)]
struct TurnIds {
    conversation_id: Uuid,
    turn_id: Uuid,
    user_message_id: Uuid,
}

/// Drives conversation turns against a model, a tool registry and a store.
pub struct TurnOrchestrator<U, R> {
    uow: U,
    model: Arc<dyn ChatModel>,
    tools: R,
    clock: Arc<dyn Clock>,
    config: ChatConfig,
    outbox_max_retries: u32,
}

impl<U: UnitOfWork, R: ToolRegistry> TurnOrchestrator<U, R> {
    pub fn new(uow: U, model: Arc<dyn ChatModel>, tools: R, clock: Arc<dyn Clock>) -> Self {
        Self {
            uow,
            model,
            tools,
            clock,
            config: ChatConfig::default(),
            outbox_max_retries: OutboxConfig::default().max_retries,
        }
    }

    /// Use the given loop settings and stamp outbox records with `outbox_max_retries`.
    pub fn with_config(mut self, config: ChatConfig, outbox_max_retries: u32) -> Self {
        self.config = config;
        self.outbox_max_retries = outbox_max_retries.max(1);
        self
    }

    /// Run one user turn to completion.
    ///
    /// A halted tool loop is a successful outcome. The user message, once
    /// persisted, is never retracted, whatever happens afterwards.
    pub async fn execute<S: EventSink>(
        &self,
        cancel: &CancellationToken,
        user_message: &str,
        model_name: &str,
        sink: &mut S,
        options: TurnOptions,
    ) -> Result<TurnSummary, TurnError> {
        let content = user_message.trim();
        if content.is_empty() {
            return Err(TurnError::Validation("user message must not be blank".to_string()));
        }
        let model_name = model_name.trim();
        if model_name.is_empty() {
            return Err(TurnError::Validation("model name must not be empty".to_string()));
        }

        let turn_id = Uuid::now_v7();
        let span = info_span!(
            "chat_turn",
            %turn_id,
            model = model_name,
            provider = self.model.name(),
            conversation_id = tracing::field::Empty,
        );
        self.run_turn(cancel, content, model_name, sink, options, turn_id)
            .instrument(span)
            .await
    }

    async fn run_turn<S: EventSink>(
        &self,
        cancel: &CancellationToken,
        content: &str,
        model_name: &str,
        sink: &mut S,
        options: TurnOptions,
        turn_id: Uuid,
    ) -> Result<TurnSummary, TurnError> {
        let (conversation, mut context, history_ids) =
            cancellable(cancel, self.prepare(&options, content)).await?;
        tracing::Span::current().record("conversation_id", tracing::field::display(conversation.id));

        let mut writer = TurnWriter::new(
            &self.uow,
            self.clock.as_ref(),
            conversation.id,
            turn_id,
            self.outbox_max_retries,
        );
        let user = writer.draft(Uuid::now_v7(), MessageRole::User, content);
        let user = cancellable(cancel, writer.persist(user)).await?;
        context.push(TurnMessage::new(MessageRole::User, content));

        let ids = TurnIds {
            conversation_id: conversation.id,
            turn_id,
            user_message_id: user.id,
        };
        let tools = self.tools.definitions();
        let mut guard = LoopGuard::new(self.config.max_tool_cycles);
        let mut used_ids = history_ids;
        used_ids.insert(user.id);
        let mut usage: Option<TokenUsage> = None;

        loop {
            let cycle = guard.begin_cycle();
            debug!(cycle, context_messages = context.len(), "invoking model");

            let request = TurnRequest {
                model: model_name.to_string(),
                messages: context.clone(),
                stream: true,
                temperature: options.temperature.or(self.config.temperature),
                max_tokens: options.max_tokens.or(self.config.max_tokens),
                tools: tools.clone(),
                user_message_id: user.id,
            };

            let mut machine = CycleMachine::new();
            let streamed = self
                .stream_cycle(cancel, request, &mut machine, sink, &mut used_ids, ids)
                .await;
            let finished = match streamed {
                Ok(()) => machine.finish().map_err(TurnError::from),
                Err(error) => Err(error),
            };
            let outcome = match finished {
                Ok(outcome) => outcome,
                Err(error) => return Err(self.fail_cycle(&mut writer, &mut machine, error).await),
            };
            if let Some(cycle_usage) = &outcome.usage {
                usage.get_or_insert_with(TokenUsage::default).add(cycle_usage);
            }

            if outcome.calls.is_empty() {
                let mut reply = writer.draft(
                    outcome.assistant_message_id,
                    MessageRole::Assistant,
                    outcome.content.clone(),
                );
                reply.usage = outcome.usage;
                let reply = match cancellable(cancel, writer.persist(reply)).await {
                    Ok(reply) => reply,
                    Err(error) => return Err(self.fail_cycle(&mut writer, &mut machine, error).await),
                };
                sink.emit(ChatEvent::TurnCompleted {
                    assistant_message_id: reply.id,
                    usage: outcome.usage,
                })
                .await?;

                info!(cycles = cycle, messages = writer.persisted(), "turn completed");
                return Ok(TurnSummary {
                    conversation_id: conversation.id,
                    turn_id,
                    user_message_id: user.id,
                    outcome: TurnOutcome::Completed {
                        assistant_message_id: reply.id,
                    },
                    cycles: cycle,
                    messages_persisted: writer.persisted(),
                    usage,
                });
            }

            if let GuardVerdict::Halt(reason) = guard.check(&outcome.calls) {
                warn!(cycles = cycle, %reason, "halting tool loop");
                let apology = writer.draft(outcome.assistant_message_id, MessageRole::Assistant, HALT_MESSAGE);
                let apology = match cancellable(cancel, writer.persist(apology)).await {
                    Ok(apology) => apology,
                    Err(error) => return Err(self.fail_cycle(&mut writer, &mut machine, error).await),
                };
                sink.emit(ChatEvent::TurnHalted {
                    message_id: apology.id,
                    content: apology.content.clone(),
                })
                .await?;

                return Ok(TurnSummary {
                    conversation_id: conversation.id,
                    turn_id,
                    user_message_id: user.id,
                    outcome: TurnOutcome::Halted {
                        message_id: apology.id,
                        reason,
                    },
                    cycles: cycle,
                    messages_persisted: writer.persisted(),
                    usage,
                });
            }

            let mut request_message = writer.draft(
                outcome.assistant_message_id,
                MessageRole::Assistant,
                outcome.content.clone(),
            );
            request_message.action_calls = outcome.calls.clone();
            request_message.usage = outcome.usage;
            if let Err(error) = cancellable(cancel, writer.persist(request_message)).await {
                return Err(self.fail_cycle(&mut writer, &mut machine, error).await);
            }
            context.push(TurnMessage {
                role: MessageRole::Assistant,
                content: outcome.content,
                action_call_id: None,
                action_calls: outcome.calls.clone(),
            });

            for call in &outcome.calls {
                self.run_tool(cancel, call, &mut writer, &mut context, sink).await?;
            }
        }
    }

    /// Resolve the conversation and load the model context, along with the
    /// ids of the loaded history so a provider id reused from an earlier
    /// turn is replaced.
    async fn prepare(
        &self,
        options: &TurnOptions,
        first_message: &str,
    ) -> Result<(Conversation, Vec<TurnMessage>, HashSet<Uuid>), TurnError> {
        let mut tx = self.uow.begin().await?;
        let conversation = match options.conversation_id {
            Some(id) => tx
                .conversations()
                .get(&id)
                .await?
                .ok_or(TurnError::ConversationNotFound(id))?,
            None => {
                let conversation = Conversation::from_first_message(
                    first_message,
                    self.config.title_max_chars,
                    self.clock.now(),
                );
                tx.conversations().create(&conversation).await?;
                debug!(conversation_id = %conversation.id, title = %conversation.title, "created conversation");
                conversation
            }
        };
        let summary = tx.summaries().get(&conversation.id).await?;
        let history = tx
            .chat_messages()
            .list_recent(&conversation.id, self.config.history_window)
            .await?;
        tx.commit().await?;

        let context = build_context(summary.as_ref(), &history);
        let history_ids = history.iter().map(|m| m.id).collect();
        Ok((conversation, context, history_ids))
    }

    /// Consume one model stream, surfacing each accepted event to the sink.
    async fn stream_cycle<S: EventSink>(
        &self,
        cancel: &CancellationToken,
        request: TurnRequest,
        machine: &mut CycleMachine,
        sink: &mut S,
        used_ids: &mut HashSet<Uuid>,
        ids: TurnIds,
    ) -> Result<(), TurnError> {
        let mut stream = self.model.stream_turn(request);
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TurnError::Cancelled),
                item = stream.next() => item,
            };
            let Some(item) = item else {
                return Ok(());
            };

            match machine.apply(item?)? {
                Reaction::Started {
                    user_message_id,
                    assistant_message_id,
                } => {
                    if user_message_id != ids.user_message_id {
                        debug!(%user_message_id, "provider reported a different user message id");
                    }
                    let assistant_message_id = if used_ids.insert(assistant_message_id) {
                        assistant_message_id
                    } else {
                        let fresh = Uuid::now_v7();
                        used_ids.insert(fresh);
                        machine.assign_assistant_id(fresh);
                        fresh
                    };
                    sink.emit(ChatEvent::TurnStarted {
                        conversation_id: ids.conversation_id,
                        turn_id: ids.turn_id,
                        user_message_id: ids.user_message_id,
                        assistant_message_id,
                    })
                    .await?;
                }
                Reaction::Delta(text) => {
                    sink.emit(ChatEvent::MessageDelta { text }).await?;
                }
                Reaction::ActionRequested { call, display_text } => {
                    let status = self.tools.status_message(&call.name);
                    let display_text = if status.trim().is_empty() {
                        display_text.unwrap_or_else(|| call.name.clone())
                    } else {
                        status
                    };
                    sink.emit(ChatEvent::ActionStarted {
                        call_id: call.id,
                        name: call.name,
                        display_text,
                    })
                    .await?;
                }
                Reaction::Completed => return Ok(()),
            }
        }
    }

    /// Execute one tool call, persist its result and surface completion.
    ///
    /// The result is durable before the sink sees it.
    async fn run_tool<S: EventSink>(
        &self,
        cancel: &CancellationToken,
        call: &ActionCall,
        writer: &mut TurnWriter<'_, U>,
        context: &mut Vec<TurnMessage>,
        sink: &mut S,
    ) -> Result<(), TurnError> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TurnError::Cancelled),
            result = self.tools.execute(call, context) => result,
        };
        if result.role != MessageRole::Tool || result.action_call_id.as_deref() != Some(call.id.as_str()) {
            debug!(tool = %call.name, "normalizing tool result role and call id");
        }

        let failed = content_signals_error(&result.content);
        let mut message = writer.draft(Uuid::now_v7(), MessageRole::Tool, result.content.clone());
        message.action_call_id = Some(call.id.clone());
        if failed {
            message.state = MessageState::Failed;
            message.error = tool_error_summary(&result.content);
        }
        let message = cancellable(cancel, writer.persist(message)).await?;
        debug!(tool = %call.name, call_id = %call.id, failed, "tool result persisted");

        context.push(TurnMessage::tool_result(call.id.clone(), result.content));
        sink.emit(ChatEvent::ActionCompleted {
            call_id: call.id.clone(),
            name: call.name.clone(),
            message_id: message.id,
            failed,
        })
        .await?;
        Ok(())
    }

    /// Record the open cycle's assistant message as `failed`, then hand the
    /// error back. Cancellation leaves no record.
    async fn fail_cycle(
        &self,
        writer: &mut TurnWriter<'_, U>,
        machine: &mut CycleMachine,
        error: TurnError,
    ) -> TurnError {
        machine.fail();
        if matches!(error, TurnError::Cancelled) {
            info!("turn cancelled");
            return error;
        }

        let id = machine.assistant_message_id().unwrap_or_else(Uuid::now_v7);
        let mut record: ChatMessage = writer.draft(id, MessageRole::Assistant, machine.content());
        record.state = MessageState::Failed;
        record.error = Some(error.to_string());

        let mut persisted = writer.persist(record.clone()).await;
        if let Err(RepositoryError::Conflict(_)) = &persisted {
            // The id is taken by a message outside this turn's view.
            record.id = Uuid::now_v7();
            persisted = writer.persist(record).await;
        }
        match persisted {
            Ok(_) => warn!(error = %error, "turn failed"),
            Err(record_error) => warn!(
                error = %error,
                record_error = %record_error,
                "turn failed and the failure record could not be persisted"
            ),
        }
        error
    }
}

/// Await `future` unless the turn is cancelled first.
///
/// Dropping an in-flight persistence future drops its transaction, which
/// rolls it back.
async fn cancellable<T, E>(
    cancel: &CancellationToken,
    future: impl Future<Output = Result<T, E>>,
) -> Result<T, TurnError>
where
    TurnError: From<E>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TurnError::Cancelled),
        result = future => result.map_err(TurnError::from),
    }
}

/// Model context: summary (as a developer message) followed by history.
///
/// Failed assistant messages are skipped, as are tool results left at the
/// start of the window without the request that produced them.
fn build_context(summary: Option<&ConversationSummary>, history: &[ChatMessage]) -> Vec<TurnMessage> {
    let mut context = Vec::with_capacity(history.len() + 2);
    if let Some(summary) = summary.filter(|s| !s.summary.trim().is_empty()) {
        context.push(TurnMessage::new(
            MessageRole::Developer,
            format!("{SUMMARY_PREFIX}\n{}", summary.summary.trim()),
        ));
    }

    let usable = history
        .iter()
        .filter(|m| !(m.role == MessageRole::Assistant && m.state == MessageState::Failed))
        .skip_while(|m| m.role == MessageRole::Tool);
    context.extend(usable.map(|m| TurnMessage {
        role: m.role,
        content: m.content.clone(),
        action_call_id: m.action_call_id.clone(),
        action_calls: m.action_calls.clone(),
    }));
    context
}
