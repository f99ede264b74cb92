//! todoloop CLI entry point.
//!
//! Binary name: `todoloop`
//!
//! Parses CLI arguments, initializes tracing, the database and config, then
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;

use cli::{Cli, Commands, ConfigCommand, OutboxCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    todoloop_observe::init_tracing(cli.log_format, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    todoloop_observe::shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init().await?;

    match cli.command {
        Commands::Chat {
            message,
            conversation,
        } => cli::chat::run_chat(&state, &message, conversation, cli.json).await?,

        Commands::Relay { once } => cli::relay::run_relay(&state, once, cli.json).await?,

        Commands::Conversations { limit } => {
            cli::history::list_conversations(&state, limit, cli.json).await?;
        }

        Commands::History { conversation_id } => {
            cli::history::show_history(&state, conversation_id, cli.json).await?;
        }

        Commands::Outbox { command } => match command {
            OutboxCommand::Stats => cli::outbox::show_stats(&state, cli.json).await?,
            OutboxCommand::List { status, limit } => {
                cli::outbox::list_events(&state, status, limit, cli.json).await?;
            }
        },

        Commands::Config { command } => match command {
            ConfigCommand::Show => cli::config::show_config(&state, cli.json).await?,
        },
    }

    state.uow.pool().close().await;
    Ok(())
}
