//! Quill Agent — the loop that turns a task into LLM calls and note edits.
//!
//! This crate contains:
//! - **agent_loop**: the orchestrator (LLM call → parse → approve → execute → repeat)
//! - **state** / **events**: session state and the listener registry hosts observe
//! - **parser** / **decision**: tool-call extraction and the plain-text stop rule
//! - **prompt** / **modes**: system prompt and task message construction
//! - **tools**: Tool trait, registry, note tools and the cached-output reader
//! - **output_cache**: long tool outputs kept out of the conversation

pub mod agent_loop;
pub mod decision;
pub mod error;
pub mod events;
pub mod modes;
pub mod output_cache;
pub mod parser;
pub mod prompt;
pub mod retrieval;
pub mod state;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use agent_loop::{AgentLoop, LoopSettings};
pub use error::AgentError;
pub use events::{AgentEvent, EventEmitter, EventKind, Subscription};
pub use modes::{AgentMode, RagResult, SkillContext, TaskContext, TaskInput, TaskIntent};
pub use output_cache::OutputCache;
pub use parser::{MessageParser, ToolCall};
pub use prompt::PromptBuilder;
pub use retrieval::Retriever;
pub use state::{AgentState, AgentStatus, StateManager};
pub use tools::{Tool, ToolContext, ToolRegistry, ToolResult};
