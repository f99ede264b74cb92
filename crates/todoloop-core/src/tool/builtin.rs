//! Built-in tools over the todo store: `list_todos` and `create_todo`.
//!
//! Each call runs in its own transaction. Arguments may arrive as a JSON
//! object or as a raw JSON string, depending on the provider.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use todoloop_types::llm::{ActionCall, ToolDefinition, TurnMessage};
use todoloop_types::todo::{Todo, TodoFilter};
use tracing::debug;

use super::registry::{ToolRegistry, tool_error};
use crate::clock::Clock;
use crate::repository::{TodoRepository, Transaction, UnitOfWork};

pub const LIST_TODOS: &str = "list_todos";
pub const CREATE_TODO: &str = "create_todo";

const DEFAULT_LIST_LIMIT: u32 = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListTodosArgs {
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateTodoArgs {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    due_at: Option<DateTime<Utc>>,
}

/// Registry exposing the todo tools backed by a unit of work.
pub struct TodoToolRegistry<U> {
    uow: U,
    clock: Arc<dyn Clock>,
}

impl<U: UnitOfWork> TodoToolRegistry<U> {
    pub fn new(uow: U, clock: Arc<dyn Clock>) -> Self {
        Self { uow, clock }
    }

    async fn list_todos(&self, input: Value) -> String {
        let args: ListTodosArgs = match parse_args(input) {
            Ok(args) => args,
            Err(details) => {
                return tool_error(
                    "invalid_arguments",
                    details,
                    Some(json!({"completed": false, "limit": 10})),
                );
            }
        };
        let filter = TodoFilter {
            completed: args.completed,
            limit: Some(args.limit.unwrap_or(DEFAULT_LIST_LIMIT)),
        };

        let todos = async {
            let mut tx = self.uow.begin().await?;
            let todos = tx.todos().list(&filter).await?;
            tx.commit().await?;
            Ok::<_, todoloop_types::error::RepositoryError>(todos)
        }
        .await;

        match todos {
            Ok(todos) => json!({
                "count": todos.len(),
                "todos": todos.iter().map(todo_json).collect::<Vec<_>>(),
            })
            .to_string(),
            Err(e) => tool_error("storage_error", e, None),
        }
    }

    async fn create_todo(&self, input: Value) -> String {
        let args: CreateTodoArgs = match parse_args(input) {
            Ok(args) => args,
            Err(details) => {
                return tool_error(
                    "invalid_arguments",
                    details,
                    Some(json!({"title": "Buy milk", "due_at": "2025-01-31T17:00:00Z"})),
                );
            }
        };
        let title = args.title.trim();
        if title.is_empty() {
            return tool_error(
                "invalid_arguments",
                "title must not be blank",
                Some(json!({"title": "Buy milk"})),
            );
        }

        let mut todo = Todo::new(title, self.clock.now());
        todo.description = args.description.filter(|d| !d.trim().is_empty());
        todo.due_at = args.due_at;

        let created = async {
            let mut tx = self.uow.begin().await?;
            tx.todos().create(&todo).await?;
            tx.commit().await
        }
        .await;

        match created {
            Ok(()) => json!({ "todo": todo_json(&todo) }).to_string(),
            Err(e) => tool_error("storage_error", e, None),
        }
    }
}

impl<U: UnitOfWork> ToolRegistry for TodoToolRegistry<U> {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: LIST_TODOS.to_string(),
                description: "List the user's todos, optionally filtered by completion.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "completed": {"type": "boolean"},
                        "limit": {"type": "integer", "minimum": 1}
                    },
                    "additionalProperties": false
                }),
            },
            ToolDefinition {
                name: CREATE_TODO.to_string(),
                description: "Create a todo with a title and optional description and due date.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "description": {"type": "string"},
                        "due_at": {"type": "string", "format": "date-time"}
                    },
                    "required": ["title"],
                    "additionalProperties": false
                }),
            },
        ]
    }

    fn status_message(&self, name: &str) -> String {
        match name {
            LIST_TODOS => "Checking your todos...".to_string(),
            CREATE_TODO => "Adding a new todo...".to_string(),
            other => format!("Running {other}..."),
        }
    }

    async fn execute(&self, call: &ActionCall, _history: &[TurnMessage]) -> TurnMessage {
        debug!(tool = %call.name, call_id = %call.id, "executing tool");
        let content = match call.name.as_str() {
            LIST_TODOS => self.list_todos(call.input.clone()).await,
            CREATE_TODO => self.create_todo(call.input.clone()).await,
            other => tool_error(
                "unknown_tool",
                format!("no tool named '{other}'; available tools: {LIST_TODOS}, {CREATE_TODO}"),
                None,
            ),
        };
        TurnMessage::tool_result(call.id.clone(), content)
    }
}

/// Decode tool arguments; `null` and empty strings count as `{}`.
fn parse_args<T: serde::de::DeserializeOwned>(input: Value) -> Result<T, String> {
    let value = match input {
        Value::Null => json!({}),
        Value::String(raw) if raw.trim().is_empty() => json!({}),
        Value::String(raw) => {
            serde_json::from_str(&raw).map_err(|e| format!("arguments are not valid JSON: {e}"))?
        }
        other => other,
    };
    serde_json::from_value(value).map_err(|e| format!("invalid arguments: {e}"))
}

fn todo_json(todo: &Todo) -> Value {
    json!({
        "id": todo.id,
        "title": todo.title,
        "description": todo.description,
        "due_at": todo.due_at,
        "completed": todo.completed,
    })
}
