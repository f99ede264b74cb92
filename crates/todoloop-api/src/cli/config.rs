//! `todoloop config show`.

use anyhow::Result;
use console::style;
use todoloop_infra::config::{CONFIG_FILE, read_config, resolve_database_url};

use crate::state::AppState;

pub async fn show_config(state: &AppState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&state.config)?);
        return Ok(());
    }

    // Surface a malformed file that the lenient loader replaced with defaults.
    let source = match read_config(&state.data_dir).await {
        Ok(Some(_)) => format!("{}", state.data_dir.join(CONFIG_FILE).display()),
        Ok(None) => "defaults (no config file)".to_string(),
        Err(e) => format!("defaults ({e})"),
    };
    let config = &state.config;

    println!();
    println!("  {} {}", style("Config:").bold(), source);
    println!(
        "  {} {}",
        style("Database:").bold(),
        resolve_database_url(config, &state.data_dir)
    );
    println!();
    println!("  {}", style("[chat]").cyan());
    println!("    max_tool_cycles = {}", config.chat.max_tool_cycles);
    println!("    history_window  = {}", config.chat.history_window);
    println!("    title_max_chars = {}", config.chat.title_max_chars);
    if let Some(temperature) = config.chat.temperature {
        println!("    temperature     = {temperature}");
    }
    if let Some(max_tokens) = config.chat.max_tokens {
        println!("    max_tokens      = {max_tokens}");
    }
    println!("  {}", style("[outbox]").cyan());
    println!("    batch_size       = {}", config.outbox.batch_size);
    println!("    max_retries      = {}", config.outbox.max_retries);
    println!("    poll_interval_ms = {}", config.outbox.poll_interval_ms);
    println!("    retention        = {}", config.outbox.retention);
    println!();
    Ok(())
}
