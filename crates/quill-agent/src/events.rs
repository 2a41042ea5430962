//! Agent events and the listener registry the host subscribes through.
//!
//! Listeners run synchronously on the emitting task, after every state lock
//! has been released. A panicking listener is logged and skipped; the others
//! still receive the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use tracing::warn;

use quill_core::types::Message;

use crate::parser::ToolCall;
use crate::state::AgentStatus;
use crate::tools::ToolResult;

/// Everything observable about a running task.
#[derive(Clone, Debug)]
pub enum AgentEvent {
    MessageAdded {
        message: Message,
        timestamp: DateTime<Utc>,
    },
    ToolCall {
        call: ToolCall,
        timestamp: DateTime<Utc>,
    },
    ToolResult {
        tool: String,
        result: ToolResult,
        timestamp: DateTime<Utc>,
    },
    StatusChange {
        from: AgentStatus,
        to: AgentStatus,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
    Complete {
        result: String,
        timestamp: DateTime<Utc>,
    },
}

/// Event type used to filter subscriptions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageAdded,
    ToolCall,
    ToolResult,
    StatusChange,
    Error,
    Complete,
}

impl AgentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AgentEvent::MessageAdded { .. } => EventKind::MessageAdded,
            AgentEvent::ToolCall { .. } => EventKind::ToolCall,
            AgentEvent::ToolResult { .. } => EventKind::ToolResult,
            AgentEvent::StatusChange { .. } => EventKind::StatusChange,
            AgentEvent::Error { .. } => EventKind::Error,
            AgentEvent::Complete { .. } => EventKind::Complete,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AgentEvent::MessageAdded { timestamp, .. }
            | AgentEvent::ToolCall { timestamp, .. }
            | AgentEvent::ToolResult { timestamp, .. }
            | AgentEvent::StatusChange { timestamp, .. }
            | AgentEvent::Error { timestamp, .. }
            | AgentEvent::Complete { timestamp, .. } => *timestamp,
        }
    }

    pub fn message_added(message: Message) -> Self {
        AgentEvent::MessageAdded {
            message,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_call(call: ToolCall) -> Self {
        AgentEvent::ToolCall {
            call,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_result(tool: impl Into<String>, result: ToolResult) -> Self {
        AgentEvent::ToolResult {
            tool: tool.into(),
            result,
            timestamp: Utc::now(),
        }
    }

    pub fn status_change(from: AgentStatus, to: AgentStatus) -> Self {
        AgentEvent::StatusChange {
            from,
            to,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        AgentEvent::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn complete(result: impl Into<String>) -> Self {
        AgentEvent::Complete {
            result: result.into(),
            timestamp: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────
// Emitter
// ─────────────────────────────────────────────

type Callback = Arc<dyn Fn(&AgentEvent) + Send + Sync>;

struct Listener {
    id: u64,
    /// `None` receives every event.
    kind: Option<EventKind>,
    callback: Callback,
}

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<Listener>>,
}

impl Listeners {
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Listener>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fan-out of [`AgentEvent`]s to subscribed callbacks.
#[derive(Clone, Default)]
pub struct EventEmitter {
    inner: Arc<Listeners>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one kind of event, or to all of them with `None`.
    pub fn on<F>(&self, kind: Option<EventKind>, callback: F) -> Subscription
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().push(Listener {
            id,
            kind,
            callback: Arc::new(callback),
        });
        Subscription {
            id,
            listeners: Arc::downgrade(&self.inner),
        }
    }

    pub fn emit(&self, event: &AgentEvent) {
        let kind = event.kind();
        let targets: Vec<(u64, Callback)> = self
            .inner
            .lock()
            .iter()
            .filter(|l| l.kind.map_or(true, |k| k == kind))
            .map(|l| (l.id, Arc::clone(&l.callback)))
            .collect();

        for (id, callback) in targets {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                warn!(listener = id, event = ?kind, "event listener panicked");
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Handle returned by [`EventEmitter::on`]. Dropping it keeps the listener;
/// call [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().retain(|l| l.id != self.id);
        }
    }
}
