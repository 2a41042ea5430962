//! Configuration schema.
//!
//! Hierarchy: `Config` → `AgentDefaults`, `ProviderConfig`, `ToolsConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.quill/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agent: AgentDefaults,
    pub provider: ProviderConfig,
    pub tools: ToolsConfig,
}

// ─────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────

/// Agent loop settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentDefaults {
    /// Notes workspace directory.
    pub workspace: String,
    /// Mode slug used when none is given (`editor`, `researcher`, ...).
    pub mode: String,
    /// LLM model identifier.
    pub model: String,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Failed or tool-less turns tolerated in a row before the loop gives up.
    pub max_consecutive_errors: u32,
    /// Tool output longer than this (in characters) is cached and summarized.
    pub long_output_threshold: usize,
    /// Length guidance given to the summarization call.
    pub summary_guidance_chars: usize,
    /// Characters kept when summarization fails.
    pub truncate_fallback_chars: usize,
    /// Shortest task text that triggers retrieval.
    pub rag_min_query_chars: usize,
    /// Number of retrieved notes folded into the task context.
    pub rag_limit: usize,
    /// LLM calls allowed per run (0 = unlimited).
    pub max_turns: u32,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: "~/.quill/workspace".to_string(),
            mode: "editor".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            max_consecutive_errors: 3,
            long_output_threshold: 4000,
            summary_guidance_chars: 300,
            truncate_fallback_chars: 2000,
            rag_min_query_chars: 5,
            rag_limit: 5,
            max_turns: 50,
        }
    }
}

// ─────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────

/// Connection settings for the OpenAI-compatible LLM endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub api_key: String,
    /// Custom API base URL (defaults to the OpenAI endpoint).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() || self.api_base.is_some()
    }
}

// ─────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolsConfig {
    /// Approve every gated tool call without asking.
    pub auto_approve: bool,
}
