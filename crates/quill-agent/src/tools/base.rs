//! Tool trait — the contract every executor the host supplies implements.
//!
//! The loop only knows a tool by its name, its approval policy and its
//! `execute` method. Everything else (filesystem access, search indexes, ...)
//! lives behind this trait.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use quill_core::types::ToolDefinition;

// ─────────────────────────────────────────────
// ToolResult
// ─────────────────────────────────────────────

/// Outcome of one tool execution, as the model will see it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            error: Some(error.into()),
        }
    }

    /// Text handed back to the model: the content on success, the error otherwise.
    pub fn display_text(&self) -> &str {
        if self.success {
            &self.content
        } else {
            self.error.as_deref().unwrap_or(&self.content)
        }
    }
}

// ─────────────────────────────────────────────
// ToolContext
// ─────────────────────────────────────────────

/// Per-task information handed to every executor.
#[derive(Clone, Debug, Default)]
pub struct ToolContext {
    pub workspace_path: PathBuf,
    pub active_note: Option<String>,
    pub mode: String,
    /// Fires when the task is aborted; long-running tools should stop early.
    pub cancel: CancellationToken,
}

// ─────────────────────────────────────────────
// Tool trait
// ─────────────────────────────────────────────

/// Every agent tool implements this trait.
///
/// The registry exposes `to_definition()` to the LLM and dispatches calls
/// to `execute()`. An `Err` (or a panic) becomes a failure [`ToolResult`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// Canonical name used by the LLM (e.g. `"read_note"`).
    fn name(&self) -> &str;

    /// Human-readable description shown to the LLM.
    fn description(&self) -> &str;

    /// JSON Schema of the parameters: `{"type": "object", "properties": {...}}`.
    fn parameters(&self) -> Value;

    /// Whether a human must approve each call. Tools are gated unless they opt out.
    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        params: HashMap<String, Value>,
        ctx: &ToolContext,
    ) -> anyhow::Result<ToolResult>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }
}

// ─────────────────────────────────────────────
// Param helpers
// ─────────────────────────────────────────────

/// Extract a required `String` param, returning a user-friendly error.
pub fn require_string(params: &HashMap<String, Value>, key: &str) -> anyhow::Result<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {key}"))
}

/// Extract an optional `String` param.
pub fn optional_string(params: &HashMap<String, Value>, key: &str) -> Option<String> {
    params.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Extract an optional non-negative integer param. Numeric strings are accepted
/// because text-parsed calls carry every value as a string.
pub fn optional_usize(params: &HashMap<String, Value>, key: &str) -> Option<usize> {
    match params.get(key)? {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Extract an optional boolean param (defaults to `false` if absent).
pub fn optional_bool(params: &HashMap<String, Value>, key: &str) -> bool {
    match params.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_string_present() {
        let mut params = HashMap::new();
        params.insert("path".into(), json!("inbox/today.md"));
        assert_eq!(require_string(&params, "path").unwrap(), "inbox/today.md");
    }

    #[test]
    fn test_require_string_missing() {
        let params = HashMap::new();
        let err = require_string(&params, "path").unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameter: path");
    }

    #[test]
    fn test_require_string_wrong_type() {
        let mut params = HashMap::new();
        params.insert("path".into(), json!(42));
        assert!(require_string(&params, "path").is_err());
    }

    #[test]
    fn test_optional_usize_accepts_text_numbers() {
        let mut params = HashMap::new();
        params.insert("offset".into(), json!(10));
        params.insert("length".into(), json!(" 250 "));
        params.insert("bad".into(), json!(-3));
        assert_eq!(optional_usize(&params, "offset"), Some(10));
        assert_eq!(optional_usize(&params, "length"), Some(250));
        assert_eq!(optional_usize(&params, "bad"), None);
        assert_eq!(optional_usize(&params, "missing"), None);
    }

    #[test]
    fn test_optional_bool() {
        let mut params = HashMap::new();
        params.insert("recursive".into(), json!(true));
        params.insert("text".into(), json!("TRUE"));
        assert!(optional_bool(&params, "recursive"));
        assert!(optional_bool(&params, "text"));
        assert!(!optional_bool(&params, "missing"));
    }

    #[test]
    fn test_tool_result_display_text() {
        assert_eq!(ToolResult::ok("fine").display_text(), "fine");
        assert_eq!(ToolResult::fail("broken").display_text(), "broken");
    }

    #[tokio::test]
    async fn test_defaults_gate_and_definition() {
        struct DummyTool;

        #[async_trait]
        impl Tool for DummyTool {
            fn name(&self) -> &str {
                "dummy"
            }
            fn description(&self) -> &str {
                "A test tool"
            }
            fn parameters(&self) -> Value {
                json!({
                    "type": "object",
                    "properties": { "msg": { "type": "string" } },
                    "required": ["msg"]
                })
            }
            async fn execute(
                &self,
                _params: HashMap<String, Value>,
                _ctx: &ToolContext,
            ) -> anyhow::Result<ToolResult> {
                Ok(ToolResult::ok("ok"))
            }
        }

        assert!(DummyTool.requires_approval());
        let def = DummyTool.to_definition();
        assert_eq!(def.function.name, "dummy");
        assert_eq!(def.tool_type, "function");

        let result = DummyTool
            .execute(HashMap::new(), &ToolContext::default())
            .await
            .unwrap();
        assert!(result.success);
    }
}
