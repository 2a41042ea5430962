//! Tool Registry — name → executor map with alias repair and a per-call
//! failure boundary.
//!
//! Models regularly call tools by the names they know from coding agents
//! (`read_file`, `write_file`, ...). The static alias table maps those onto the
//! canonical note tools before lookup.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use quill_core::types::ToolDefinition;

use super::base::{Tool, ToolContext, ToolResult};

/// Common mis-names → canonical tool names.
const TOOL_ALIASES: &[(&str, &str)] = &[
    ("read_file", "read_note"),
    ("open_note", "read_note"),
    ("write_file", "create_note"),
    ("write_note", "create_note"),
    ("create_file", "create_note"),
    ("edit_file", "edit_note"),
    ("update_note", "edit_note"),
    ("replace_in_file", "edit_note"),
    ("list_files", "list_notes"),
    ("list_dir", "list_notes"),
    ("list_directory", "list_notes"),
    ("search_files", "search_notes"),
    ("search", "search_notes"),
    ("delete_file", "delete_note"),
    ("remove_note", "delete_note"),
    ("move_file", "move_note"),
    ("rename_note", "move_note"),
    ("rename_file", "move_note"),
    ("grep", "grep_search"),
    ("read_output", "read_cached_output"),
    ("get_cached_output", "read_cached_output"),
];

fn alias_target(name: &str) -> Option<&'static str> {
    TOOL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
}

/// Every alias name, for parsers that need to recognize them in text.
pub fn alias_names() -> impl Iterator<Item = &'static str> {
    TOOL_ALIASES.iter().map(|(alias, _)| *alias)
}

// ─────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────

/// Stores tools keyed by canonical name and dispatches calls.
///
/// Owns `Arc<dyn Tool>` so a call can be moved onto its own task.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Overwrites any previous tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        info!(tool = tool.name(), "registered tool");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Map a requested name onto a registered canonical name.
    ///
    /// Tries the name as given, then lower-cased, each time directly and via
    /// the alias table. Unknown names come back unchanged.
    pub fn resolve_name(&self, name: &str) -> String {
        let trimmed = name.trim();
        let lowered = trimmed.to_lowercase();
        for candidate in [trimmed, lowered.as_str()] {
            if self.tools.contains_key(candidate) {
                return candidate.to_string();
            }
            if let Some(target) = alias_target(candidate) {
                return target.to_string();
            }
        }
        trimmed.to_string()
    }

    /// Alias-resolving lookup.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(&self.resolve_name(name))
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Approval policy of a tool. Unknown tools are treated as gated.
    pub fn requires_approval(&self, name: &str) -> bool {
        self.get(name).map_or(true, |tool| tool.requires_approval())
    }

    /// Names of all registered tools, sorted for determinism.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// LLM-facing definitions for all registered tools.
    pub fn get_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    /// Definitions restricted to `allowed` (a mode's tool list), in that order.
    /// Names that are not registered are skipped.
    pub fn definitions_for(&self, allowed: &[String]) -> Vec<ToolDefinition> {
        allowed
            .iter()
            .filter_map(|name| self.tools.get(name.as_str()))
            .map(|tool| tool.to_definition())
            .collect()
    }

    /// Execute a tool by (possibly aliased) name.
    ///
    /// Never fails: unknown names, `Err` returns, panics and cancellation all
    /// come back as a failure [`ToolResult`] the model can read.
    pub async fn execute(
        &self,
        name: &str,
        params: HashMap<String, Value>,
        ctx: &ToolContext,
    ) -> ToolResult {
        let canonical = self.resolve_name(name);
        let tool = match self.tools.get(&canonical) {
            Some(t) => Arc::clone(t),
            None => {
                warn!(tool = name, "tool not found");
                return ToolResult::fail(format!(
                    "Error: Tool '{name}' not found. Available tools: {}",
                    self.tool_names().join(", ")
                ));
            }
        };

        let task_ctx = ctx.clone();
        let handle = tokio::spawn(async move { tool.execute(params, &task_ctx).await });
        let abort = handle.abort_handle();

        let joined = tokio::select! {
            joined = handle => joined,
            _ = ctx.cancel.cancelled() => {
                abort.abort();
                warn!(tool = %canonical, "tool execution cancelled");
                return ToolResult::fail(format!("Tool '{canonical}' was cancelled"));
            }
        };

        match joined {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(tool = %canonical, error = %e, "tool execution failed");
                ToolResult::fail(format!("Error executing {canonical}: {e}"))
            }
            Err(join_err) => {
                warn!(tool = %canonical, error = %join_err, "tool panicked");
                ToolResult::fail(format!("Error executing {canonical}: tool crashed ({join_err})"))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
