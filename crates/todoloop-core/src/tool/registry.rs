//! The `ToolRegistry` trait.
//!
//! Tool execution never fails from the caller's point of view: a registry
//! always answers with a tool-role message, and problems are reported as
//! structured error content the model can read and react to.

use serde_json::{Value, json};
use todoloop_types::chat::TOOL_ERROR_KEY;
use todoloop_types::llm::{ActionCall, ToolDefinition, TurnMessage};

pub trait ToolRegistry: Send + Sync {
    /// Definitions advertised to the model on every request.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Human-readable progress text shown while the tool runs.
    fn status_message(&self, name: &str) -> String;

    /// Run a call and return its tool-role result message.
    ///
    /// `history` is the context sent to the model so far.
    fn execute(
        &self,
        call: &ActionCall,
        history: &[TurnMessage],
    ) -> impl std::future::Future<Output = TurnMessage> + Send;
}

/// Structured error content for a failed tool call.
///
/// `{"error": {"code": ..., "details": ..., "example": ...}}`; `example` is
/// omitted when there is no valid payload to suggest.
pub fn tool_error(code: &str, details: impl std::fmt::Display, example: Option<Value>) -> String {
    let mut error = json!({
        "code": code,
        "details": details.to_string(),
    });
    if let Some(example) = example {
        error["example"] = example;
    }
    json!({ TOOL_ERROR_KEY: error }).to_string()
}

/// One-line description of an error payload, e.g. `invalid_arguments: missing title`.
pub fn tool_error_summary(content: &str) -> Option<String> {
    let value: Value = serde_json::from_str(content).ok()?;
    let error = value.get(TOOL_ERROR_KEY)?;
    if error.is_null() {
        return None;
    }
    let code = error.get("code").and_then(Value::as_str).unwrap_or("tool_error");
    Some(match error.get("details").and_then(Value::as_str) {
        Some(details) => format!("{code}: {details}"),
        None => code.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use todoloop_types::chat::content_signals_error;

    #[test]
    fn tool_error_is_detected_as_error_content() {
        let content = tool_error("invalid_arguments", "missing title", Some(json!({"title": "Buy milk"})));
        assert!(content_signals_error(&content));

        let value: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["error"]["code"], "invalid_arguments");
        assert_eq!(value["error"]["example"]["title"], "Buy milk");
    }

    #[test]
    fn tool_error_without_example_omits_field() {
        let content = tool_error("unknown_tool", "no tool named 'x'", None);
        let value: Value = serde_json::from_str(&content).unwrap();
        assert!(value["error"].get("example").is_none());
    }

    #[test]
    fn summary_reads_code_and_details() {
        let content = tool_error("storage_error", "disk full", None);
        assert_eq!(tool_error_summary(&content).as_deref(), Some("storage_error: disk full"));
        assert_eq!(tool_error_summary(r#"{"todos":[]}"#), None);
        assert_eq!(tool_error_summary("not json"), None);
    }
}
