//! Interactive REPL and the task driver shared with single-shot mode.
//!
//! Uses `rustyline` for readline-style editing with persistent history.
//! While a task runs, approval requests arrive over a channel fed by an
//! event listener and are answered on stdin from a blocking task.

use std::sync::{Arc, Weak};

use anyhow::{Context, Result};
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tokio::sync::mpsc;
use tracing::debug;

use quill_agent::modes::load_workspace_instructions;
use quill_agent::{AgentEvent, AgentLoop, AgentState, AgentStatus, EventKind, TaskContext, ToolCall};

use crate::helpers;
use crate::AgentOptions;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

// ─────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────

/// One agent plus the terminal plumbing around it.
pub struct Session {
    agent: Arc<AgentLoop>,
    options: AgentOptions,
    approvals: mpsc::UnboundedReceiver<ToolCall>,
}

impl Session {
    pub fn new(agent: Arc<AgentLoop>, options: AgentOptions) -> Self {
        let (tx, approvals) = mpsc::unbounded_channel();
        subscribe_printer(&agent);
        subscribe_approvals(&agent, tx);
        Self {
            agent,
            options,
            approvals,
        }
    }

    async fn task_context(&self) -> TaskContext {
        let mut ctx = TaskContext::new(self.options.workspace.clone()).with_mode(self.options.mode.clone());
        ctx.intent = self.options.intent;
        ctx.file_tree = helpers::workspace_tree(&self.options.workspace).await;
        ctx.instructions = load_workspace_instructions(&self.options.workspace);
        ctx
    }

    /// Run one task to a terminal or waiting status.
    ///
    /// Approval requests are answered while the task runs; Ctrl-C aborts it.
    pub async fn run_task(&mut self, text: String) -> Result<AgentState> {
        let ctx = self.task_context().await;
        let mut runner = {
            let agent = Arc::clone(&self.agent);
            tokio::spawn(async move { agent.start_task(text, ctx, None).await })
        };

        loop {
            tokio::select! {
                joined = &mut runner => {
                    return joined.context("agent task panicked");
                }
                Some(call) = self.approvals.recv() => {
                    let approved = if self.options.auto_approve {
                        helpers::print_auto_approved(&call);
                        true
                    } else {
                        ask_approval(call).await
                    };
                    self.agent.approve_tool_call(approved);
                }
                _ = tokio::signal::ctrl_c() => {
                    eprintln!();
                    self.agent.abort();
                }
            }
        }
    }
}

/// Print tool activity as it happens.
fn subscribe_printer(agent: &AgentLoop) {
    let _sub = agent.on(None, |event| match event {
        AgentEvent::ToolCall { call, .. } => helpers::print_tool_call(call),
        AgentEvent::ToolResult { tool, result, .. } => helpers::print_tool_result(tool, result),
        AgentEvent::Error { message, .. } => debug!(error = %message, "agent error"),
        _ => {}
    });
}

/// Forward every approval wait to the session.
fn subscribe_approvals(agent: &Arc<AgentLoop>, tx: mpsc::UnboundedSender<ToolCall>) {
    let weak: Weak<AgentLoop> = Arc::downgrade(agent);
    let _sub = agent.on(Some(EventKind::StatusChange), move |event| {
        let AgentEvent::StatusChange { to: AgentStatus::WaitingApproval, .. } = event else {
            return;
        };
        let pending = weak.upgrade().and_then(|agent| agent.get_state().pending_tool);
        if let Some(call) = pending {
            let _ = tx.send(call);
        }
    });
}

/// Prompt on stdin without blocking the runtime. Read errors deny.
async fn ask_approval(call: ToolCall) -> bool {
    tokio::task::spawn_blocking(move || {
        helpers::print_approval_prompt(&call);
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(_) => helpers::is_yes(&line),
            Err(_) => false,
        }
    })
    .await
    .unwrap_or(false)
}

// ─────────────────────────────────────────────
// REPL
// ─────────────────────────────────────────────

/// Run the interactive REPL loop.
pub async fn run(mut session: Session) -> Result<()> {
    helpers::print_banner(&session.options.mode, &session.options.workspace);

    let mut editor = create_editor()?;

    loop {
        let input = match editor.readline("You: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) => break,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }

        if is_exit_command(trimmed) {
            println!("\nGoodbye!");
            break;
        }

        let _ = editor.add_history_entry(&input);

        // A pending ask_user question is answered by this line: the next
        // task keeps the history, so the model sees question and answer.
        debug!(input = trimmed, "starting task");
        match session.run_task(trimmed.to_string()).await {
            Ok(state) => helpers::print_outcome(&state),
            Err(e) => eprintln!("\nError: {e:#}\n"),
        }
    }

    save_history(&mut editor);

    Ok(())
}

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }

    Ok(editor)
}

fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

fn history_path() -> std::path::PathBuf {
    quill_core::utils::get_data_path().join("history").join("cli_history")
}

fn is_exit_command(input: &str) -> bool {
    let lower = input.to_lowercase();
    EXIT_COMMANDS.contains(&lower.as_str())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
