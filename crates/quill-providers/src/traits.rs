//! LLM Provider trait — the call capability the agent loop is written against.
//!
//! Every backend implements [`LlmProvider`]. Calls take a cancellation token
//! and must return [`ProviderError::Cancelled`] when it fires, so the loop can
//! tell an abort apart from a real failure.

use async_trait::async_trait;
use quill_core::types::{LlmResponse, Message, ToolDefinition};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Per-call generation settings. Also used as the per-task config override.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequestConfig {
    /// Model to use; `None` means the provider's default model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Options for a single chat call.
#[derive(Clone, Copy, Debug)]
pub struct ChatOptions<'a> {
    /// Fires when the caller aborts; in-flight calls must stop promptly.
    pub cancel: &'a CancellationToken,
    /// Function-calling definitions to expose, if any.
    pub tools: Option<&'a [ToolDefinition]>,
}

impl<'a> ChatOptions<'a> {
    pub fn new(cancel: &'a CancellationToken) -> Self {
        Self { cancel, tools: None }
    }

    pub fn with_tools(mut self, tools: &'a [ToolDefinition]) -> Self {
        self.tools = Some(tools);
        self
    }
}

/// Why an LLM call did not produce a response.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The cancellation token fired. Not a failure of the backend.
    #[error("request cancelled")]
    Cancelled,
    #[error("request failed: {0}")]
    Request(String),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled)
    }
}

/// Trait that all LLM providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request.
    ///
    /// # Arguments
    /// * `messages` — Full conversation history.
    /// * `options`  — Cancellation token and optional tool definitions.
    /// * `config`   — Model, temperature, max_tokens.
    ///
    /// Token usage is reported in `LlmResponse::usage` when the backend provides it.
    async fn chat(
        &self,
        messages: &[Message],
        options: ChatOptions<'_>,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse, ProviderError>;

    /// The default model for this provider instance.
    fn default_model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
