//! Todo items managed by the assistant's tools.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    pub fn new(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            title: title.into(),
            description: None,
            due_at: None,
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filter for listing todos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoFilter {
    /// `Some(false)` lists open todos only; `None` lists everything.
    pub completed: Option<bool>,
    pub limit: Option<u32>,
}
