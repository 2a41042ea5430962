//! Shared CLI helpers — path expansion, event printing, outcome rendering.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use colored::Colorize;
use serde_json::json;

use quill_agent::tools::{ListNotesTool, Tool, ToolContext, ToolResult};
use quill_agent::{AgentMode, AgentState, AgentStatus, ToolCall};
use quill_core::types::Role;
use quill_core::utils::truncate_string;

const COMPLETION_MARKER: &str = "[TASK_COMPLETED]";

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Recursive listing of the workspace for the system prompt, if it has any entries.
pub async fn workspace_tree(workspace: &Path) -> Option<String> {
    let ctx = ToolContext {
        workspace_path: workspace.to_path_buf(),
        ..Default::default()
    };
    let params = HashMap::from([("recursive".to_string(), json!(true))]);
    match ListNotesTool.execute(params, &ctx).await {
        Ok(result) if result.success && !result.content.starts_with("Directory ") => {
            Some(result.content)
        }
        _ => None,
    }
}

// ─────────────────────────────────────────────
// Printing
// ─────────────────────────────────────────────

/// Print the banner shown at REPL start.
pub fn print_banner(mode: &AgentMode, workspace: &Path) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "Quill".cyan().bold(), version.dimmed());
    println!(
        "{}",
        format!("mode: {} | workspace: {}", mode.slug, workspace.display()).dimmed()
    );
    println!("{}", "Type a task, or \"exit\" to quit.".dimmed());
    println!();
}

/// One-line rendering of a tool call: `name(key=value, ...)`.
pub fn describe_call(call: &ToolCall) -> String {
    let mut params: Vec<_> = call.params.iter().collect();
    params.sort_by(|a, b| a.0.cmp(b.0));
    let args = params
        .into_iter()
        .map(|(k, v)| {
            let value = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
            format!("{k}={}", truncate_string(&value.replace('\n', " "), 40))
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{}({args})", call.name)
}

pub fn print_tool_call(call: &ToolCall) {
    eprintln!("  {} {}", "→".cyan(), describe_call(call).dimmed());
}

pub fn print_tool_result(tool: &str, result: &ToolResult) {
    if result.success {
        eprintln!("  {} {}", "✓".green(), tool.dimmed());
    } else {
        let error = truncate_string(result.display_text(), 200);
        eprintln!("  {} {}: {}", "✗".red(), tool, error);
    }
}

pub fn print_auto_approved(call: &ToolCall) {
    eprintln!("  {} {}", "auto-approved".yellow(), describe_call(call));
}

pub fn print_approval_prompt(call: &ToolCall) {
    eprint!("  {} {} [y/N] ", "Allow".yellow().bold(), describe_call(call));
    let _ = std::io::stderr().flush();
}

/// Only an explicit yes approves.
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// The text to show the user for a finished (or paused) task.
pub fn outcome_text(state: &AgentState) -> String {
    match state.status {
        AgentStatus::Error => state
            .last_error
            .clone()
            .unwrap_or_else(|| "unknown error".to_string()),
        AgentStatus::Aborted => "(aborted)".to_string(),
        AgentStatus::WaitingUser => last_text(state, Role::User).unwrap_or_default(),
        _ => last_text(state, Role::Assistant)
            .map(|text| {
                text.strip_prefix(COMPLETION_MARKER)
                    .unwrap_or(&text)
                    .trim()
                    .to_string()
            })
            .unwrap_or_default(),
    }
}

fn last_text(state: &AgentState, role: Role) -> Option<String> {
    state
        .messages
        .iter()
        .rev()
        .find(|m| m.role() == role)
        .map(|m| m.text())
}

/// Print the outcome of a task run.
pub fn print_outcome(state: &AgentState) {
    let text = outcome_text(state);
    println!();
    match state.status {
        AgentStatus::Error => println!("{} {text}", "Error:".red().bold()),
        AgentStatus::Aborted => println!("{}", text.dimmed()),
        AgentStatus::WaitingUser => {
            let question = text.strip_prefix("[Question for the user]\n").unwrap_or(&text);
            println!("{}", "Quill asks".cyan().bold());
            println!("{question}");
        }
        _ => {
            println!("{}", "Quill".cyan().bold());
            if text.is_empty() {
                println!("{}", "(no response)".dimmed());
            } else {
                println!("{text}");
            }
        }
    }
    println!();
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
