//! `todoloop outbox stats|list`.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use todoloop_core::repository::{OutboxRepository, Transaction};
use todoloop_types::outbox::OutboxStatus;

use crate::state::AppState;

pub async fn show_stats(state: &AppState, json: bool) -> Result<()> {
    let mut tx = state.uow.begin_read().await?;
    let stats = tx.outbox().stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("Outbox").bold());
    println!("    {:<11}{}", "pending", style(stats.pending).yellow());
    println!("    {:<11}{}", "processing", stats.processing);
    println!("    {:<11}{}", "processed", style(stats.processed).green());
    println!("    {:<11}{}", "failed", style(stats.failed).red());
    println!();
    Ok(())
}

pub async fn list_events(state: &AppState, status: OutboxStatus, limit: u32, json: bool) -> Result<()> {
    let mut tx = state.uow.begin_read().await?;
    let events = tx.outbox().list_by_status(status, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    if events.is_empty() {
        println!();
        println!("  {} No {status} outbox events.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Created").fg(Color::White),
        Cell::new("Message").fg(Color::White),
        Cell::new("Role").fg(Color::White),
        Cell::new("Retries").fg(Color::White),
        Cell::new("Last error").fg(Color::White),
    ]);

    for event in &events {
        table.add_row(vec![
            Cell::new(event.created_at.format("%Y-%m-%d %H:%M:%S").to_string()).fg(Color::DarkGrey),
            Cell::new(event.payload.chat_message_id),
            Cell::new(event.payload.role),
            Cell::new(format!("{}/{}", event.retry_count, event.max_retries)),
            Cell::new(event.last_error.as_deref().unwrap_or("-")).fg(Color::Red),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
