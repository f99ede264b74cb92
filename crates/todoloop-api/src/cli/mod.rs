//! CLI command definitions for the `todoloop` binary.

pub mod chat;
pub mod config;
pub mod history;
pub mod outbox;
pub mod relay;

use clap::{Parser, Subcommand};
use todoloop_observe::LogFormat;
use todoloop_types::outbox::OutboxStatus;
use uuid::Uuid;

/// Chat with the offline echo model, inspect conversations and run the outbox relay.
#[derive(Parser)]
#[command(name = "todoloop", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log line format (pretty or json).
    #[arg(long, global = true, default_value = "pretty", env = "TODOLOOP_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one turn against the offline echo model.
    Chat {
        message: String,

        /// Continue an existing conversation.
        #[arg(long)]
        conversation: Option<Uuid>,
    },

    /// Publish pending outbox events to the event bus.
    Relay {
        /// Run a single pass and exit.
        #[arg(long)]
        once: bool,
    },

    /// List recent conversations.
    #[command(alias = "ls")]
    Conversations {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Show every message of a conversation.
    History {
        conversation_id: Uuid,
    },

    /// Inspect the outbox.
    Outbox {
        #[command(subcommand)]
        command: OutboxCommand,
    },

    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum OutboxCommand {
    /// Count records per status.
    Stats,

    /// List records with the given status.
    List {
        #[arg(long, default_value = "failed", value_parser = parse_status)]
        status: OutboxStatus,

        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration.
    Show,
}

fn parse_status(s: &str) -> Result<OutboxStatus, String> {
    s.parse()
}
