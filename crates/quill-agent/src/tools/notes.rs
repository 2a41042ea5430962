//! Note tools — read, list, create and edit notes inside the workspace.
//!
//! Every path is relative to `ToolContext::workspace_path` and may not leave it.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::base::{optional_bool, optional_string, optional_usize, require_string, Tool, ToolContext, ToolResult};

const DEFAULT_LIST_DEPTH: usize = 3;

// ─────────────────────────────────────────────
// Shared path helper
// ─────────────────────────────────────────────

/// Resolve a workspace-relative note path.
///
/// Leading separators are ignored so `/inbox.md` means `<workspace>/inbox.md`.
/// `..` may not climb above the workspace root.
fn resolve_note_path(workspace: &Path, path: &str) -> anyhow::Result<PathBuf> {
    let rel = path.trim().trim_start_matches(['/', '\\']);
    let mut resolved = workspace.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(rel).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    anyhow::bail!("Access denied: path '{path}' is outside the workspace");
                }
                resolved.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                anyhow::bail!("Access denied: path '{path}' is outside the workspace");
            }
        }
    }
    Ok(resolved)
}

// ─────────────────────────────────────────────
// ReadNoteTool
// ─────────────────────────────────────────────

/// Returns a note with line numbers so later edits can be located.
pub struct ReadNoteTool;

#[async_trait]
impl Tool for ReadNoteTool {
    fn name(&self) -> &str {
        "read_note"
    }

    fn description(&self) -> &str {
        "Read a note. Returns the content with line numbers."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Note path relative to the workspace root"
                }
            },
            "required": ["path"]
        })
    }

    fn requires_approval(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        params: HashMap<String, Value>,
        ctx: &ToolContext,
    ) -> anyhow::Result<ToolResult> {
        let path_str = require_string(&params, "path")?;
        let path = resolve_note_path(&ctx.workspace_path, &path_str)?;

        if !path.is_file() {
            return Ok(ToolResult::fail(format!("Note not found: {path_str}")));
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {path_str}: {e}"))?;

        let numbered = content
            .lines()
            .enumerate()
            .map(|(i, line)| format!("{:4} | {}", i + 1, line))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolResult::ok(numbered))
    }
}

// ─────────────────────────────────────────────
// ListNotesTool
// ─────────────────────────────────────────────

/// Lists files and folders under a workspace directory.
pub struct ListNotesTool;

#[async_trait]
impl Tool for ListNotesTool {
    fn name(&self) -> &str {
        "list_notes"
    }

    fn description(&self) -> &str {
        "List files and folders in a workspace directory, optionally recursively."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory relative to the workspace root; empty or '.' for the root"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "List sub-directories too (default false)"
                },
                "max_depth": {
                    "type": "integer",
                    "description": "Maximum depth when recursive (default 3)"
                }
            },
            "required": []
        })
    }

    fn requires_approval(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        params: HashMap<String, Value>,
        ctx: &ToolContext,
    ) -> anyhow::Result<ToolResult> {
        let path_str = optional_string(&params, "path").unwrap_or_else(|| ".".into());
        let dir = resolve_note_path(&ctx.workspace_path, &path_str)?;
        if !dir.is_dir() {
            return Ok(ToolResult::fail(format!("Not a directory: {path_str}")));
        }

        let max_depth = if optional_bool(&params, "recursive") {
            optional_usize(&params, "max_depth").unwrap_or(DEFAULT_LIST_DEPTH).max(1)
        } else {
            1
        };

        let mut lines = Vec::new();
        list_dir(&dir, 0, max_depth, &mut lines)?;
        if lines.is_empty() {
            return Ok(ToolResult::ok(format!("Directory {path_str} is empty")));
        }
        Ok(ToolResult::ok(lines.join("\n")))
    }
}

fn list_dir(dir: &Path, depth: usize, max_depth: usize, out: &mut Vec<String>) -> anyhow::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| anyhow::anyhow!("Failed to list {}: {e}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .collect();
    entries.sort_by_key(|entry| entry.file_name());

    let indent = "  ".repeat(depth);
    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();
        if path.is_dir() {
            out.push(format!("{indent}{name}/"));
            if depth + 1 < max_depth {
                list_dir(&path, depth + 1, max_depth, out)?;
            }
        } else {
            out.push(format!("{indent}{name}"));
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────
// CreateNoteTool
// ─────────────────────────────────────────────

/// Creates a new note. Refuses to overwrite.
pub struct CreateNoteTool;

#[async_trait]
impl Tool for CreateNoteTool {
    fn name(&self) -> &str {
        "create_note"
    }

    fn description(&self) -> &str {
        "Create a new note. Fails if the file already exists. Parent folders are created."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "New note path relative to the workspace root, ending in .md"
                },
                "content": {
                    "type": "string",
                    "description": "Note content"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(
        &self,
        params: HashMap<String, Value>,
        ctx: &ToolContext,
    ) -> anyhow::Result<ToolResult> {
        let path_str = require_string(&params, "path")?;
        let content = require_string(&params, "content")?;
        let path = resolve_note_path(&ctx.workspace_path, &path_str)?;

        if path.exists() {
            return Ok(ToolResult::fail(format!("File already exists: {path_str}")));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create directory {}: {e}", parent.display()))?;
        }

        tokio::fs::write(&path, &content)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write {path_str}: {e}"))?;
        Ok(ToolResult::ok(format!("Successfully created {path_str}")))
    }
}

// ─────────────────────────────────────────────
// EditNoteTool
// ─────────────────────────────────────────────

/// Replaces the first exact occurrence of `old_string` in a note.
pub struct EditNoteTool;

#[async_trait]
impl Tool for EditNoteTool {
    fn name(&self) -> &str {
        "edit_note"
    }

    fn description(&self) -> &str {
        "Edit an existing note by exact string replacement. `old_string` must match \
         the file content exactly; include enough context to make it unique."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Note path relative to the workspace root"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(
        &self,
        params: HashMap<String, Value>,
        ctx: &ToolContext,
    ) -> anyhow::Result<ToolResult> {
        let path_str = require_string(&params, "path")?;
        let old_string = require_string(&params, "old_string")?;
        let new_string = require_string(&params, "new_string")?;
        let path = resolve_note_path(&ctx.workspace_path, &path_str)?;

        if !path.is_file() {
            return Ok(ToolResult::fail(format!("Note not found: {path_str}")));
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {path_str}: {e}"))?;

        if old_string.is_empty() {
            return Ok(ToolResult::fail("Edit failed: old_string must not be empty"));
        }
        if !content.contains(&old_string) {
            let hint = if content.contains(old_string.trim()) {
                "It matches after trimming; check leading/trailing whitespace and newlines."
            } else if content.to_lowercase().contains(&old_string.to_lowercase()) {
                "It matches ignoring case; check capitalization."
            } else {
                "The note may have changed; read it again before editing."
            };
            return Ok(ToolResult::fail(format!(
                "Edit failed: old_string not found in {path_str}. {hint}"
            )));
        }

        let updated = content.replacen(&old_string, &new_string, 1);
        tokio::fs::write(&path, updated)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write {path_str}: {e}"))?;
        Ok(ToolResult::ok(format!("Successfully edited {path_str}")))
    }
}
