//! `todoloop chat`: run one turn against the offline echo model.
//!
//! No provider adapter ships with the binary. `EchoModel` answers locally so
//! a turn can be driven end to end: the messages and their outbox records
//! land in the database, ready for `todoloop relay`.
//!
//! `/add <title>` asks for `create_todo`, `/todos` asks for `list_todos`,
//! anything else is echoed back.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use console::style;
use futures_util::stream;
use todoloop_core::chat::{TurnOptions, TurnOrchestrator, TurnOutcome, TurnSummary};
use todoloop_core::clock::{Clock, SystemClock};
use todoloop_core::llm::{ChatModel, TurnStream};
use todoloop_core::tool::TodoToolRegistry;
use todoloop_types::event::ChatEvent;
use todoloop_types::llm::{MessageRole, TurnEvent, TurnRequest};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::state::AppState;

const ECHO_MODEL: &str = "echo";
const EVENT_BUFFER: usize = 64;

/// Offline model: echoes the user, or requests a todo tool for slash commands.
pub struct EchoModel;

impl EchoModel {
    fn reply(request: &TurnRequest) -> Vec<TurnEvent> {
        let Some(last) = request.messages.last() else {
            return vec![TurnEvent::MessageDelta {
                text: "Nothing to echo.".to_string(),
            }];
        };

        if last.role == MessageRole::Tool {
            return vec![TurnEvent::MessageDelta {
                text: format!("Tool result: {}", last.content),
            }];
        }

        let content = last.content.trim();
        if let Some(title) = content.strip_prefix("/add ").map(str::trim).filter(|t| !t.is_empty()) {
            return vec![TurnEvent::ActionRequested {
                id: format!("call_{}", Uuid::now_v7().simple()),
                name: "create_todo".to_string(),
                input: serde_json::json!({ "title": title }),
                display_text: None,
            }];
        }
        if content == "/todos" {
            return vec![TurnEvent::ActionRequested {
                id: format!("call_{}", Uuid::now_v7().simple()),
                name: "list_todos".to_string(),
                input: serde_json::json!({}),
                display_text: None,
            }];
        }

        content
            .split_inclusive(' ')
            .map(|word| TurnEvent::MessageDelta {
                text: word.to_string(),
            })
            .collect()
    }
}

impl ChatModel for EchoModel {
    fn name(&self) -> &str {
        ECHO_MODEL
    }

    fn stream_turn(&self, request: TurnRequest) -> TurnStream {
        let assistant_message_id = Uuid::now_v7();
        let mut events = vec![TurnEvent::TurnStarted {
            user_message_id: request.user_message_id,
            assistant_message_id,
        }];
        events.extend(Self::reply(&request));
        events.push(TurnEvent::TurnCompleted {
            assistant_message_id,
            completed_at: Utc::now(),
            usage: None,
        });
        Box::pin(stream::iter(events.into_iter().map(Ok)))
    }
}

pub async fn run_chat(
    state: &AppState,
    message: &str,
    conversation_id: Option<Uuid>,
    json: bool,
) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tools = TodoToolRegistry::new(state.uow.clone(), clock.clone());
    let orchestrator = TurnOrchestrator::new(state.uow.clone(), Arc::new(EchoModel), tools, clock)
        .with_config(state.config.chat.clone(), state.config.outbox.max_retries);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let (mut tx, rx) = mpsc::channel(EVENT_BUFFER);
    let printer = tokio::spawn(print_events(rx, json));
    let options = TurnOptions {
        conversation_id,
        ..TurnOptions::default()
    };
    let result = orchestrator
        .execute(&cancel, message, ECHO_MODEL, &mut tx, options)
        .await;
    drop(tx);
    let _ = printer.await;

    print_summary(&result?, json)
}

/// Prints events until the orchestrator drops its sender.
async fn print_events(mut rx: mpsc::Receiver<ChatEvent>, json: bool) {
    while let Some(event) = rx.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to encode event"),
            }
            continue;
        }
        match event {
            ChatEvent::TurnStarted { .. } => print!("  {} ", style("◆").magenta()),
            ChatEvent::MessageDelta { text } => print!("{text}"),
            ChatEvent::ActionStarted { display_text, .. } => {
                println!("{}", style(format!("[{display_text}]")).dim());
            }
            ChatEvent::ActionCompleted { name, failed, .. } => {
                let mark = if failed { style("✗").red() } else { style("✓").green() };
                println!("  {mark} {name}");
            }
            ChatEvent::TurnCompleted { .. } => println!(),
            ChatEvent::TurnHalted { content, .. } => println!("{}", style(content).yellow()),
        }
    }
}

fn print_summary(summary: &TurnSummary, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "conversation_id": summary.conversation_id,
            "turn_id": summary.turn_id,
            "halted": matches!(summary.outcome, TurnOutcome::Halted { .. }),
            "cycles": summary.cycles,
            "messages_persisted": summary.messages_persisted,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} messages in {} cycle(s), conversation {}",
        style("Saved").bold(),
        summary.messages_persisted,
        summary.cycles,
        style(summary.conversation_id).dim()
    );
    println!();
    Ok(())
}
