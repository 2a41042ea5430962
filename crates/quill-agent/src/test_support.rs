//! Test doubles shared by the loop tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use quill_core::types::{LlmResponse, Message, NativeToolCall, ToolDefinition, UsageInfo};
use quill_providers::{ChatOptions, LlmProvider, LlmRequestConfig, ProviderError};

use crate::modes::RagResult;
use crate::retrieval::Retriever;
use crate::tools::{Tool, ToolContext, ToolResult};

pub(crate) fn native_call(name: &str, args: Value) -> NativeToolCall {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let id = NEXT.fetch_add(1, Ordering::Relaxed);
    NativeToolCall::new(format!("call_{id}"), name, args.to_string())
}

// ─────────────────────────────────────────────
// ScriptedProvider
// ─────────────────────────────────────────────

enum Step {
    Reply(LlmResponse),
    Fail(String),
    Hang,
}

#[derive(Default)]
struct Recorded {
    messages: Vec<Message>,
    tool_names: Vec<String>,
    model: Option<String>,
}

/// Replays a script for tool-bearing calls; calls without tools are
/// summarization requests and get the configured summary.
pub(crate) struct ScriptedProvider {
    script: Mutex<VecDeque<Step>>,
    /// Used once the script runs out.
    fallback: Mutex<Option<Step>>,
    summary: Option<String>,
    usage: Option<UsageInfo>,
    calls: AtomicUsize,
    summaries: AtomicUsize,
    last: Mutex<Recorded>,
}

impl ScriptedProvider {
    pub(crate) fn new(replies: Vec<LlmResponse>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().map(Step::Reply).collect()),
            fallback: Mutex::new(None),
            summary: Some("summary".to_string()),
            usage: None,
            calls: AtomicUsize::new(0),
            summaries: AtomicUsize::new(0),
            last: Mutex::new(Recorded::default()),
        }
    }

    /// Every call waits until it is cancelled.
    pub(crate) fn hanging() -> Self {
        let provider = Self::new(Vec::new());
        *provider.fallback.lock().unwrap() = Some(Step::Hang);
        provider
    }

    /// Every scripted call fails with `message` once the script is empty.
    pub(crate) fn failing_chat(self, message: &str) -> Self {
        *self.fallback.lock().unwrap() = Some(Step::Fail(message.to_string()));
        self
    }

    pub(crate) fn with_summary(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_string());
        self
    }

    pub(crate) fn failing_summaries(mut self) -> Self {
        self.summary = None;
        self
    }

    pub(crate) fn with_usage(mut self, usage: UsageInfo) -> Self {
        self.usage = Some(usage);
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn summary_calls(&self) -> usize {
        self.summaries.load(Ordering::SeqCst)
    }

    pub(crate) fn last_messages(&self) -> Vec<Message> {
        self.last.lock().unwrap().messages.clone()
    }

    pub(crate) fn last_tool_names(&self) -> Vec<String> {
        self.last.lock().unwrap().tool_names.clone()
    }

    pub(crate) fn last_model(&self) -> Option<String> {
        self.last.lock().unwrap().model.clone()
    }

    fn next_step(&self) -> Step {
        if let Some(step) = self.script.lock().unwrap().pop_front() {
            return step;
        }
        match &*self.fallback.lock().unwrap() {
            Some(Step::Hang) => Step::Hang,
            Some(Step::Fail(msg)) => Step::Fail(msg.clone()),
            _ => Step::Reply(LlmResponse::text("(no more replies)")),
        }
    }

    fn with_recorded_usage(&self, mut response: LlmResponse) -> LlmResponse {
        if response.usage.is_none() {
            response.usage = self.usage;
        }
        response
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(
        &self,
        messages: &[Message],
        options: ChatOptions<'_>,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse, ProviderError> {
        let Some(tools) = options.tools else {
            self.summaries.fetch_add(1, Ordering::SeqCst);
            return match &self.summary {
                Some(text) => Ok(self.with_recorded_usage(LlmResponse::text(text.clone()))),
                None => Err(ProviderError::Request("summarizer offline".into())),
            };
        };

        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Recorded {
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|t| ToolDefinition::name(t).to_string()).collect(),
            model: config.model.clone(),
        };

        match self.next_step() {
            Step::Reply(response) => Ok(self.with_recorded_usage(response)),
            Step::Fail(message) => Err(ProviderError::Request(message)),
            Step::Hang => {
                options.cancel.cancelled().await;
                Err(ProviderError::Cancelled)
            }
        }
    }

    fn default_model(&self) -> &str {
        "scripted"
    }

    fn display_name(&self) -> &str {
        "Scripted"
    }
}

// ─────────────────────────────────────────────
// RecordingTool
// ─────────────────────────────────────────────

/// A tool that returns a fixed outcome and counts its invocations.
pub(crate) struct RecordingTool {
    name: String,
    output: Result<String, String>,
    approval: bool,
    calls: AtomicUsize,
    last_params: Mutex<Option<HashMap<String, Value>>>,
}

impl RecordingTool {
    pub(crate) fn ok(name: &str, output: &str) -> Arc<Self> {
        Arc::new(Self::build(name, Ok(output.to_string())))
    }

    pub(crate) fn failing(name: &str, error: &str) -> Arc<Self> {
        Arc::new(Self::build(name, Err(error.to_string())))
    }

    fn build(name: &str, output: Result<String, String>) -> Self {
        Self {
            name: name.to_string(),
            output,
            approval: false,
            calls: AtomicUsize::new(0),
            last_params: Mutex::new(None),
        }
    }

    /// The same tool, but requiring approval.
    pub(crate) fn gated(self: Arc<Self>) -> Arc<Self> {
        let mut tool = Self::build(&self.name, self.output.clone());
        tool.approval = true;
        Arc::new(tool)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_params(&self) -> Option<HashMap<String, Value>> {
        self.last_params.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "test tool"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    fn requires_approval(&self) -> bool {
        self.approval
    }

    async fn execute(
        &self,
        params: HashMap<String, Value>,
        _ctx: &ToolContext,
    ) -> anyhow::Result<ToolResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(params);
        Ok(match &self.output {
            Ok(content) => ToolResult::ok(content.clone()),
            Err(error) => ToolResult::fail(error.clone()),
        })
    }
}

// ─────────────────────────────────────────────
// StaticRetriever
// ─────────────────────────────────────────────

pub(crate) struct StaticRetriever {
    results: Option<Vec<RagResult>>,
    searches: AtomicUsize,
}

impl StaticRetriever {
    pub(crate) fn new(results: Vec<RagResult>) -> Self {
        Self {
            results: Some(results),
            searches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            results: None,
            searches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    fn is_ready(&self) -> bool {
        true
    }

    async fn search(&self, _query: &str, limit: usize) -> anyhow::Result<Vec<RagResult>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        match &self.results {
            Some(results) => Ok(results.iter().take(limit).cloned().collect()),
            None => Err(anyhow::anyhow!("index unavailable")),
        }
    }
}
