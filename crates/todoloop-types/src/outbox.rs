//! Transactional outbox records and the domain events they carry.
//!
//! An `OutboxEvent` is written in the same transaction as the domain change
//! it announces and later published by the relay. The payload is kept
//! minimal: consumers fetch the full message by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::chat::ChatMessage;
use crate::llm::MessageRole;

/// Delivery status of an outbox record.
///
/// `Processing` only exists inside a relay transaction: rows are claimed as
/// part of the fetch and always resolved to another status before commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboxStatus::Pending => write!(f, "pending"),
            OutboxStatus::Processing => write!(f, "processing"),
            OutboxStatus::Processed => write!(f, "processed"),
            OutboxStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OutboxStatus::Pending),
            "processing" => Ok(OutboxStatus::Processing),
            "processed" => Ok(OutboxStatus::Processed),
            "failed" => Ok(OutboxStatus::Failed),
            other => Err(format!("invalid outbox status: '{other}'")),
        }
    }
}

/// Kind of domain event carried by an outbox record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxEventType {
    ChatMessageSent,
}

impl fmt::Display for OutboxEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboxEventType::ChatMessageSent => write!(f, "chat_message_sent"),
        }
    }
}

impl FromStr for OutboxEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat_message_sent" => Ok(OutboxEventType::ChatMessageSent),
            other => Err(format!("invalid outbox event type: '{other}'")),
        }
    }
}

/// Payload references announced to the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxPayload {
    pub conversation_id: Uuid,
    pub chat_message_id: Uuid,
    pub role: MessageRole,
}

/// A record waiting to be (or already) published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub event_type: OutboxEventType,
    pub payload: OutboxPayload,
    pub status: OutboxStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    /// The "message sent" record announcing a freshly persisted message.
    pub fn chat_message_sent(message: &ChatMessage, max_retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: OutboxEventType::ChatMessageSent,
            payload: OutboxPayload {
                conversation_id: message.conversation_id,
                chat_message_id: message.id,
                role: message.role,
            },
            status: OutboxStatus::Pending,
            retry_count: 0,
            max_retries,
            last_error: None,
            created_at: now,
        }
    }

    /// The event published to the bus for this record.
    pub fn to_domain_event(&self) -> DomainEvent {
        DomainEvent {
            outbox_id: self.id,
            event_type: self.event_type,
            conversation_id: self.payload.conversation_id,
            chat_message_id: self.payload.chat_message_id,
            role: self.payload.role,
            occurred_at: self.created_at,
        }
    }
}

/// What downstream consumers receive from the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Lets idempotent consumers deduplicate redeliveries.
    pub outbox_id: Uuid,
    pub event_type: OutboxEventType,
    pub conversation_id: Uuid,
    pub chat_message_id: Uuid,
    pub role: MessageRole,
    pub occurred_at: DateTime<Utc>,
}

/// Per-status record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxStats {
    pub pending: u64,
    pub processing: u64,
    pub processed: u64,
    pub failed: u64,
}
