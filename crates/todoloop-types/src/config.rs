//! Global configuration types for todoloop.
//!
//! `AppConfig` represents the top-level `config.toml` that tunes the turn
//! loop and the outbox relay. All fields have sensible defaults.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration, loaded from `{data_dir}/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Overrides the default `sqlite://{data_dir}/todoloop.db` location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub outbox: OutboxConfig,
}

impl AppConfig {
    /// Raise out-of-range values to their minimums.
    pub fn clamped(mut self) -> Self {
        self.chat.max_tool_cycles = self.chat.max_tool_cycles.max(1);
        self.chat.title_max_chars = self.chat.title_max_chars.max(1);
        self.outbox.batch_size = self.outbox.batch_size.max(1);
        self.outbox.max_retries = self.outbox.max_retries.max(1);
        self.outbox.poll_interval_ms = self.outbox.poll_interval_ms.max(10);
        self
    }
}

/// Turn loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum model invocations per user turn.
    #[serde(default = "default_max_tool_cycles")]
    pub max_tool_cycles: u32,

    /// Number of most recent messages sent to the model as history.
    #[serde(default = "default_history_window")]
    pub history_window: u32,

    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_max_tool_cycles() -> u32 {
    7
}

fn default_history_window() -> u32 {
    20
}

fn default_title_max_chars() -> usize {
    60
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_tool_cycles: default_max_tool_cycles(),
            history_window: default_history_window(),
            title_max_chars: default_title_max_chars(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// What the relay does with a record once it has been published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    #[default]
    MarkProcessed,
    Delete,
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionPolicy::MarkProcessed => write!(f, "mark_processed"),
            RetentionPolicy::Delete => write!(f, "delete"),
        }
    }
}

impl FromStr for RetentionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mark_processed" => Ok(RetentionPolicy::MarkProcessed),
            "delete" => Ok(RetentionPolicy::Delete),
            other => Err(format!("invalid retention policy: '{other}'")),
        }
    }
}

/// Outbox relay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// Records claimed per relay pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Publish attempts before a record is marked failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub retention: RetentionPolicy,
}

fn default_batch_size() -> u32 {
    100
}

fn default_max_retries() -> u32 {
    5
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

impl OutboxConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            poll_interval_ms: default_poll_interval_ms(),
            retention: RetentionPolicy::default(),
        }
    }
}
