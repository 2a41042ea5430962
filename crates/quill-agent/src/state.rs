//! Session state and the manager that owns it.
//!
//! The agent loop is the only writer. Observers get events and cloned
//! snapshots; they never touch the state itself. Events are emitted after
//! the state lock is released, so a listener may call back into the manager.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use quill_core::types::{Message, UsageInfo};
use quill_providers::LlmRequestConfig;

use crate::events::{AgentEvent, EventEmitter};
use crate::parser::ToolCall;

// ─────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Running,
    WaitingApproval,
    WaitingUser,
    Completed,
    Error,
    Aborted,
}

impl AgentStatus {
    /// Completed, error and aborted only change when a task is (re)started.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentStatus::Completed | AgentStatus::Error | AgentStatus::Aborted
        )
    }

    pub fn is_waiting(self) -> bool {
        matches!(self, AgentStatus::WaitingApproval | AgentStatus::WaitingUser)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Running => "running",
            AgentStatus::WaitingApproval => "waiting_approval",
            AgentStatus::WaitingUser => "waiting_user",
            AgentStatus::Completed => "completed",
            AgentStatus::Error => "error",
            AgentStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Token counters accumulated over the whole session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, usage: &UsageInfo) {
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.total_tokens += u64::from(usage.total_tokens);
    }
}

/// The mutable state of one agent session.
#[derive(Clone, Debug, Default)]
pub struct AgentState {
    pub status: AgentStatus,
    pub messages: Vec<Message>,
    pub current_task: Option<String>,
    pub pending_tool: Option<ToolCall>,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
    pub llm_config: Option<LlmRequestConfig>,
    pub request_start_time: Option<DateTime<Utc>>,
    pub request_count: u64,
    pub token_usage: TokenUsage,
}

// ─────────────────────────────────────────────
// StateManager
// ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct StateManager {
    state: Mutex<AgentState>,
    events: EventEmitter,
}

impl StateManager {
    pub fn new(events: EventEmitter) -> Self {
        Self {
            state: Mutex::new(AgentState::default()),
            events,
        }
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Run `f` under the lock, then emit whatever events it queued.
    fn update<R>(&self, f: impl FnOnce(&mut AgentState, &mut Vec<AgentEvent>) -> R) -> R {
        let mut queued = Vec::new();
        let out = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            f(&mut state, &mut queued)
        };
        for event in &queued {
            self.events.emit(event);
        }
        out
    }

    fn read<R>(&self, f: impl FnOnce(&AgentState) -> R) -> R {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&state)
    }

    pub fn snapshot(&self) -> AgentState {
        self.read(Clone::clone)
    }

    pub fn status(&self) -> AgentStatus {
        self.read(|s| s.status)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.read(|s| s.messages.clone())
    }

    pub fn llm_config(&self) -> Option<LlmRequestConfig> {
        self.read(|s| s.llm_config.clone())
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.read(|s| s.consecutive_errors)
    }

    // ────────────── Status ──────────────

    /// Move to `to`. A terminal status is never left this way; returns
    /// whether the status changed.
    pub fn set_status(&self, to: AgentStatus) -> bool {
        self.update(|state, events| {
            let from = state.status;
            if from == to || from.is_terminal() {
                return false;
            }
            state.status = to;
            debug!(from = %from, to = %to, "status change");
            events.push(AgentEvent::status_change(from, to));
            true
        })
    }

    /// Move to `to` even from a terminal status. Only task (re)starts do this.
    pub fn restart(&self, to: AgentStatus) {
        self.update(|state, events| {
            let from = state.status;
            state.status = to;
            if from != to {
                debug!(from = %from, to = %to, "status restart");
                events.push(AgentEvent::status_change(from, to));
            }
        })
    }

    /// Fatal stop: records the message and moves to `error`.
    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|state, events| {
            state.last_error = Some(message.clone());
            events.push(AgentEvent::error(message));
            let from = state.status;
            if !from.is_terminal() {
                state.status = AgentStatus::Error;
                events.push(AgentEvent::status_change(from, AgentStatus::Error));
            }
        })
    }

    // ────────────── Messages ──────────────

    /// Install the prompts for a new task.
    ///
    /// With existing history (more than the system message) the history is
    /// kept, the system message is rewritten and the task appended. Otherwise
    /// the history becomes exactly `[system, task]`.
    pub fn begin_task(
        &self,
        system_prompt: String,
        task_message: Message,
        task_text: String,
        llm_config: Option<LlmRequestConfig>,
    ) {
        self.update(|state, events| {
            let system = Message::system(system_prompt);
            if state.messages.len() > 1 {
                match state.messages.first_mut() {
                    Some(first @ Message::System { .. }) => *first = system,
                    _ => state.messages.insert(0, system),
                }
            } else {
                state.messages = vec![system.clone()];
                events.push(AgentEvent::message_added(system));
            }
            state.messages.push(task_message.clone());
            events.push(AgentEvent::message_added(task_message));

            state.current_task = Some(task_text);
            state.pending_tool = None;
            state.consecutive_errors = 0;
            state.last_error = None;
            state.llm_config = llm_config;
        });
        self.restart(AgentStatus::Running);
    }

    pub fn add_message(&self, message: Message) {
        self.update(|state, events| {
            state.messages.push(message.clone());
            events.push(AgentEvent::message_added(message));
        })
    }

    /// Replace the whole history (e.g. a host restoring a saved session).
    pub fn set_messages(&self, messages: Vec<Message>) {
        self.update(|state, _| state.messages = messages)
    }

    // ────────────── Bookkeeping ──────────────

    pub fn set_pending_tool(&self, call: Option<ToolCall>) {
        self.update(|state, _| state.pending_tool = call)
    }

    pub fn increment_errors(&self) -> u32 {
        self.update(|state, _| {
            state.consecutive_errors += 1;
            state.consecutive_errors
        })
    }

    pub fn reset_errors(&self) {
        self.update(|state, _| state.consecutive_errors = 0)
    }

    pub fn set_llm_config(&self, config: Option<LlmRequestConfig>) {
        self.update(|state, _| state.llm_config = config)
    }

    /// Mark the start of an LLM request.
    pub fn begin_request(&self) -> u64 {
        self.update(|state, _| {
            state.request_start_time = Some(Utc::now());
            state.request_count += 1;
            state.request_count
        })
    }

    pub fn record_usage(&self, usage: Option<UsageInfo>) {
        if let Some(usage) = usage {
            self.update(|state, _| state.token_usage.add(&usage));
        }
    }

    pub fn emit(&self, event: AgentEvent) {
        self.events.emit(&event);
    }
}
