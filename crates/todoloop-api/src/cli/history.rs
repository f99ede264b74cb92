//! Conversation browsing: `todoloop conversations`, `todoloop history <id>`.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use todoloop_core::repository::{ChatMessageRepository, ConversationRepository, Transaction};
use todoloop_types::chat::{ChatMessage, MessageRole, MessageState};
use uuid::Uuid;

use crate::state::AppState;

const PREVIEW_CHARS: usize = 60;

pub async fn list_conversations(state: &AppState, limit: u32, json: bool) -> Result<()> {
    let mut tx = state.uow.begin_read().await?;
    let conversations = tx.conversations().list(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conversations)?);
        return Ok(());
    }

    if conversations.is_empty() {
        println!();
        println!("  {} No conversations yet.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Id").fg(Color::White),
        Cell::new("Title").fg(Color::White),
        Cell::new("Last message").fg(Color::White),
    ]);

    for conversation in &conversations {
        let last = conversation
            .last_message_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(conversation.id).fg(Color::DarkGrey),
            Cell::new(&conversation.title).fg(Color::Cyan),
            Cell::new(last).fg(Color::White),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub async fn show_history(state: &AppState, conversation_id: Uuid, json: bool) -> Result<()> {
    let mut tx = state.uow.begin_read().await?;
    let conversation = tx
        .conversations()
        .get(&conversation_id)
        .await?
        .with_context(|| format!("Conversation '{conversation_id}' not found"))?;
    let messages = tx.chat_messages().list_by_conversation(&conversation_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Time").fg(Color::White),
        Cell::new("Turn").fg(Color::White),
        Cell::new("#").fg(Color::White),
        Cell::new("Role").fg(Color::White),
        Cell::new("Content").fg(Color::White),
    ]);

    let mut turn_labels: Vec<Uuid> = Vec::new();
    for message in &messages {
        let turn = match turn_labels.iter().position(|t| *t == message.turn_id) {
            Some(index) => index + 1,
            None => {
                turn_labels.push(message.turn_id);
                turn_labels.len()
            }
        };
        table.add_row(vec![
            Cell::new(message.created_at.format("%H:%M:%S").to_string()).fg(Color::DarkGrey),
            Cell::new(turn),
            Cell::new(message.turn_sequence),
            role_cell(message),
            Cell::new(preview(message)),
        ]);
    }

    println!();
    println!("  {}", style(&conversation.title).cyan().bold());
    println!();
    println!("{table}");
    println!();
    println!(
        "  {} message{} in {} turn{}",
        style(messages.len()).bold(),
        if messages.len() == 1 { "" } else { "s" },
        style(turn_labels.len()).bold(),
        if turn_labels.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

fn role_cell(message: &ChatMessage) -> Cell {
    if message.state == MessageState::Failed {
        return Cell::new(format!("{} (failed)", message.role)).fg(Color::Red);
    }
    let color = match message.role {
        MessageRole::User => Color::Green,
        MessageRole::Assistant => Color::Cyan,
        MessageRole::Tool => Color::Yellow,
        MessageRole::Developer => Color::DarkGrey,
    };
    Cell::new(message.role).fg(color)
}

/// One-line preview; tool calls and errors are shown when there is no text.
fn preview(message: &ChatMessage) -> String {
    let text = if !message.content.trim().is_empty() {
        message.content.split_whitespace().collect::<Vec<_>>().join(" ")
    } else if !message.action_calls.is_empty() {
        let names: Vec<&str> = message.action_calls.iter().map(|c| c.name.as_str()).collect();
        format!("→ {}", names.join(", "))
    } else {
        message.error.clone().unwrap_or_default()
    };

    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use todoloop_types::llm::ActionCall;

    fn message(content: &str) -> ChatMessage {
        let now = Utc::now();
        ChatMessage {
            id: Uuid::now_v7(),
            conversation_id: Uuid::now_v7(),
            turn_id: Uuid::now_v7(),
            turn_sequence: 0,
            role: MessageRole::Assistant,
            content: content.to_string(),
            state: MessageState::Completed,
            error: None,
            usage: None,
            action_call_id: None,
            action_calls: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn preview_truncates_long_content() {
        let long = "word ".repeat(40);
        let shown = preview(&message(&long));
        assert_eq!(shown.chars().count(), PREVIEW_CHARS);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn preview_falls_back_to_action_calls() {
        let mut m = message("");
        m.action_calls = vec![ActionCall {
            id: "call-1".to_string(),
            name: "list_todos".to_string(),
            input: serde_json::json!({}),
        }];
        assert_eq!(preview(&m), "→ list_todos");
    }
}
