//! Agent loop — drives LLM calls, tool calls and approvals until a task
//! reaches a terminal status.
//!
//! One `AgentLoop` serves one session. All methods take `&self`, so a host
//! keeps it in an `Arc`: one task awaits [`AgentLoop::start_task`] while
//! another calls [`AgentLoop::abort`] or [`AgentLoop::approve_tool_call`].

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use quill_core::config::AgentDefaults;
use quill_core::types::{Message, ToolDefinition};
use quill_core::utils::{char_len, head_chars, truncate_string};
use quill_providers::{ChatOptions, LlmProvider, LlmRequestConfig};

use crate::decision::{allows_plain_text_stop, clean_reply, strip_thinking};
use crate::error::AgentError;
use crate::events::{AgentEvent, EventKind, Subscription};
use crate::modes::{AgentMode, TaskContext, TaskInput};
use crate::output_cache::OutputCache;
use crate::parser::{render_tool_calls_as_text, MessageParser, ToolCall, ToolCallSource};
use crate::prompt::PromptBuilder;
use crate::retrieval::Retriever;
use crate::state::{AgentState, AgentStatus, StateManager};
use crate::tools::cache_read::{ReadCachedOutputTool, READ_CACHED_OUTPUT};
use crate::tools::control::{control_definitions, ASK_USER, ATTEMPT_COMPLETION, COMPLETION_MARKER};
use crate::tools::{ToolContext, ToolRegistry, ToolResult};

/// Appended to a failed tool result so the model diagnoses before retrying.
const REFLECTION_PROMPT: &str = "The tool call failed. Think about why (wrong path, stale \
content, missing parameter), then fix the call and try again, or choose another tool.";

/// Sent when a reply neither used a tool nor was an acceptable final answer.
const USE_TOOL_PROMPT: &str = "You did not use a tool. To work on the notes you must call one \
of the available tools. If the task is finished, call attempt_completion with the result; if \
you need information from the user, call ask_user.";

/// Identical tool batches tolerated in a row before the turn counts as a failure.
const MAX_REPEATED_BATCHES: u32 = 3;

/// Upper bound on the tool output sent to the summarization call.
const SUMMARY_INPUT_CHARS: usize = 16_000;

// ─────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────

/// Loop tuning knobs. Built from `AgentDefaults` in the host.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopSettings {
    pub max_consecutive_errors: u32,
    pub long_output_threshold: usize,
    pub summary_guidance_chars: usize,
    pub truncate_fallback_chars: usize,
    pub rag_min_query_chars: usize,
    pub rag_limit: usize,
    /// LLM calls allowed per run; 0 disables the cap.
    pub max_turns: u32,
    /// Request settings used when a task brings no override.
    pub request: LlmRequestConfig,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&AgentDefaults::default())
    }
}

impl From<&AgentDefaults> for LoopSettings {
    fn from(d: &AgentDefaults) -> Self {
        Self {
            max_consecutive_errors: d.max_consecutive_errors.max(1),
            long_output_threshold: d.long_output_threshold,
            summary_guidance_chars: d.summary_guidance_chars,
            truncate_fallback_chars: d.truncate_fallback_chars,
            rag_min_query_chars: d.rag_min_query_chars,
            rag_limit: d.rag_limit,
            max_turns: d.max_turns,
            request: LlmRequestConfig {
                model: Some(d.model.clone()),
                max_tokens: d.max_tokens,
                temperature: d.temperature,
            },
        }
    }
}

/// Per-run values derived from the task context.
struct RunScope {
    ctx: TaskContext,
    definitions: Vec<ToolDefinition>,
    tool_ctx: ToolContext,
}

/// Tracks identical consecutive tool batches.
#[derive(Default)]
struct RepeatTracker {
    last: Option<String>,
    count: u32,
}

impl RepeatTracker {
    fn observe(&mut self, calls: &[ToolCall]) -> u32 {
        let signature = calls
            .iter()
            .map(ToolCall::signature)
            .collect::<Vec<_>>()
            .join("|");
        if self.last.as_deref() == Some(signature.as_str()) {
            self.count += 1;
        } else {
            self.last = Some(signature);
            self.count = 1;
        }
        self.count
    }
}

/// What the batch handler decided about the rest of the batch.
enum CallOutcome {
    Continue,
    Stop,
}

// ─────────────────────────────────────────────
// AgentLoop
// ─────────────────────────────────────────────

pub struct AgentLoop {
    provider: Arc<dyn LlmProvider>,
    tools: ToolRegistry,
    parser: MessageParser,
    cache: Arc<OutputCache>,
    retriever: Option<Arc<dyn Retriever>>,
    prompts: PromptBuilder,
    settings: LoopSettings,
    state: StateManager,
    /// Token of the current run; replaced on every start/continue.
    cancel: Mutex<CancellationToken>,
    /// Single-slot approval rendezvous.
    approval: Mutex<Option<oneshot::Sender<bool>>>,
    /// Whether the loop registered the cache reader itself (and may rebind it).
    owns_cache_reader: bool,
}

impl AgentLoop {
    /// Create a loop over `tools`, using the process-wide output cache.
    ///
    /// A `read_cached_output` tool bound to the cache is registered unless
    /// the host supplied its own.
    pub fn new(provider: Arc<dyn LlmProvider>, tools: ToolRegistry) -> Self {
        let owns_cache_reader = !tools.has(READ_CACHED_OUTPUT);
        let mut agent = Self {
            provider,
            parser: MessageParser::default(),
            tools,
            cache: OutputCache::shared(),
            retriever: None,
            prompts: PromptBuilder::new(),
            settings: LoopSettings::default(),
            state: StateManager::default(),
            cancel: Mutex::new(CancellationToken::new()),
            approval: Mutex::new(None),
            owns_cache_reader,
        };
        agent.bind_cache_reader();
        info!(
            provider = agent.provider.display_name(),
            tools = agent.tools.len(),
            "agent loop initialized"
        );
        agent
    }

    pub fn with_cache(mut self, cache: Arc<OutputCache>) -> Self {
        self.cache = cache;
        self.bind_cache_reader();
        self
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self.bind_cache_reader();
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_prompt_builder(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    fn bind_cache_reader(&mut self) {
        if self.owns_cache_reader {
            self.tools.register(Arc::new(ReadCachedOutputTool::new(
                Arc::clone(&self.cache),
                self.settings.long_output_threshold,
            )));
        }
        self.parser = MessageParser::for_registry(&self.tools);
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn cache(&self) -> &Arc<OutputCache> {
        &self.cache
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    // ────────────── Public operations ──────────────

    /// Run a new task to a terminal or waiting status and return the final state.
    pub async fn start_task(
        &self,
        input: impl Into<TaskInput>,
        ctx: TaskContext,
        config: Option<LlmRequestConfig>,
    ) -> AgentState {
        let input = input.into();
        let cancel = self.reset_cancel();
        let mut ctx = ctx;

        self.enrich_with_retrieval(&input.text, &mut ctx).await;

        let run = self.run_scope(ctx, &cancel);
        let system_prompt = self.prompts.build_system_prompt(&run.ctx, &run.definitions);
        let task_message = self.prompts.build_task_message(&input, &run.ctx);

        info!(
            mode = %run.ctx.mode.slug,
            intent = ?run.ctx.intent,
            tools = run.definitions.len(),
            "starting task"
        );
        self.state
            .begin_task(system_prompt, task_message, input.text.clone(), config);

        self.drive(&run, &cancel).await;
        self.state.snapshot()
    }

    /// Resume against the current history without adding a task message.
    pub async fn continue_loop(
        &self,
        ctx: TaskContext,
        config: Option<LlmRequestConfig>,
    ) -> AgentState {
        let cancel = self.reset_cancel();
        if config.is_some() {
            self.state.set_llm_config(config);
        }
        let run = self.run_scope(ctx, &cancel);

        info!(messages = self.state.messages().len(), "continuing loop");
        self.state.reset_errors();
        self.state.restart(AgentStatus::Running);

        self.drive(&run, &cancel).await;
        if self.state.status() == AgentStatus::Running {
            self.state.set_status(AgentStatus::Completed);
        }
        self.state.snapshot()
    }

    /// Append a user-role nudge, e.g. after a request timed out.
    pub fn add_timeout_hint(&self, hint: impl Into<String>) {
        self.state.add_message(Message::user(hint));
    }

    /// Cancel the current run. A pending approval resolves as denied.
    pub fn abort(&self) {
        info!("abort requested");
        self.lock_cancel().cancel();
        self.resolve_approval(false);
        self.state.set_pending_tool(None);
        self.state.set_status(AgentStatus::Aborted);
    }

    /// Resolve the pending approval. No-op when nothing is waiting.
    pub fn approve_tool_call(&self, approved: bool) {
        if !self.resolve_approval(approved) {
            debug!(approved, "no approval pending");
        }
    }

    pub fn set_messages(&self, messages: Vec<Message>) {
        self.state.set_messages(messages);
    }

    pub fn get_state(&self) -> AgentState {
        self.state.snapshot()
    }

    /// Subscribe to loop events; `None` receives all kinds.
    pub fn on<F>(&self, kind: Option<EventKind>, callback: F) -> Subscription
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        self.state.events().on(kind, callback)
    }

    // ────────────── Run setup ──────────────

    fn lock_cancel(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn reset_cancel(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.lock_cancel() = token.clone();
        token
    }

    fn run_scope(&self, ctx: TaskContext, cancel: &CancellationToken) -> RunScope {
        let definitions = self.definitions_for(&ctx.mode);
        let tool_ctx = ToolContext {
            workspace_path: ctx.workspace_path.clone(),
            active_note: ctx.active_note.clone(),
            mode: ctx.mode.slug.clone(),
            cancel: cancel.clone(),
        };
        RunScope {
            ctx,
            definitions,
            tool_ctx,
        }
    }

    /// The mode's registered tools followed by the control tools.
    fn definitions_for(&self, mode: &AgentMode) -> Vec<ToolDefinition> {
        let mut defs = self.tools.definitions_for(&mode.tools);
        defs.extend(control_definitions());
        defs
    }

    async fn enrich_with_retrieval(&self, text: &str, ctx: &mut TaskContext) {
        if char_len(text.trim()) < self.settings.rag_min_query_chars {
            return;
        }
        let Some(retriever) = self.retriever.as_ref() else {
            return;
        };
        if !retriever.is_ready() {
            debug!("retriever not ready, skipping enrichment");
            return;
        }

        match retriever.search(text, self.settings.rag_limit).await {
            Ok(results) if !results.is_empty() => {
                debug!(results = results.len(), "retrieved related notes");
                ctx.rag_results.get_or_insert_with(Vec::new).extend(results);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "retrieval failed, continuing without related notes"),
        }
    }

    // ────────────── Main loop ──────────────

    async fn drive(&self, run: &RunScope, cancel: &CancellationToken) {
        let mut turns: u32 = 0;
        let mut repeats = RepeatTracker::default();

        loop {
            if cancel.is_cancelled() {
                self.mark_aborted();
                break;
            }
            if self.state.status() != AgentStatus::Running {
                break;
            }
            if self.settings.max_turns > 0 && turns >= self.settings.max_turns {
                warn!(turns, "turn limit reached");
                self.state.set_error(format!(
                    "Stopped after {turns} LLM calls without completing the task"
                ));
                break;
            }
            turns += 1;

            debug!(iteration = turns, "LLM call");
            if let Err(e) = self.iterate(run, cancel, &mut repeats).await {
                self.handle_error(e, cancel);
            }
        }

        debug!(status = %self.state.status(), turns, "loop exited");
    }

    async fn iterate(
        &self,
        run: &RunScope,
        cancel: &CancellationToken,
        repeats: &mut RepeatTracker,
    ) -> Result<(), AgentError> {
        self.state.begin_request();
        let messages = self.state.messages();
        let config = self.request_config();

        let options = ChatOptions::new(cancel).with_tools(&run.definitions);
        let response = self.provider.chat(&messages, options, &config).await?;
        self.state.record_usage(response.usage);

        let parsed = self.parser.parse(&response);
        let assistant_text = match &parsed.source {
            ToolCallSource::Structured(_) => {
                let rendered = render_tool_calls_as_text(&parsed.tool_calls);
                if response.content.trim().is_empty() {
                    rendered
                } else {
                    format!("{}\n\n{rendered}", response.content.trim_end())
                }
            }
            ToolCallSource::TextParsed(text) => text.clone(),
        };
        self.state.add_message(Message::assistant(assistant_text));

        if !parsed.tool_calls.is_empty() {
            let count = repeats.observe(&parsed.tool_calls);
            if count >= MAX_REPEATED_BATCHES {
                return Err(AgentError::RepeatedToolCalls {
                    tool: parsed.tool_calls[0].name.clone(),
                    count,
                });
            }
            return self.handle_tool_calls(parsed.tool_calls, run, cancel).await;
        }

        // Fences are stripped only for the stop heuristic; the reply keeps its code.
        let reply = strip_thinking(&response.content).trim().to_string();

        if parsed.completed {
            let result = reply.replace(COMPLETION_MARKER, "").trim().to_string();
            self.complete(result);
            return Ok(());
        }

        if !reply.is_empty()
            && allows_plain_text_stop(&clean_reply(&reply), &run.ctx.mode, run.ctx.intent)
        {
            self.state
                .add_message(Message::assistant(format!("{COMPLETION_MARKER} {reply}")));
            self.complete(reply);
            return Ok(());
        }

        let errors = self.state.increment_errors();
        warn!(errors, "reply used no tool");
        if errors >= self.settings.max_consecutive_errors {
            self.state.set_error(format!(
                "The model replied {errors} times in a row without using a tool"
            ));
        } else {
            self.state.add_message(Message::user(USE_TOOL_PROMPT));
        }
        Ok(())
    }

    /// Shared failure path for one iteration.
    fn handle_error(&self, err: AgentError, cancel: &CancellationToken) {
        if err.is_cancelled() || cancel.is_cancelled() {
            self.mark_aborted();
            return;
        }

        let errors = self.state.increment_errors();
        warn!(error = %err, errors, "loop iteration failed");
        if errors >= self.settings.max_consecutive_errors {
            self.state.set_error(err.to_string());
        } else {
            self.state.add_message(Message::user(format!(
                "Error: {err}\n\nPlease adjust your approach and continue."
            )));
        }
    }

    fn request_config(&self) -> LlmRequestConfig {
        self.state
            .llm_config()
            .unwrap_or_else(|| self.settings.request.clone())
    }

    fn complete(&self, result: String) {
        self.state.set_pending_tool(None);
        if self.state.set_status(AgentStatus::Completed) {
            info!("task completed");
            self.state.emit(AgentEvent::complete(result));
        }
    }

    fn mark_aborted(&self) {
        self.state.set_pending_tool(None);
        if self.state.set_status(AgentStatus::Aborted) {
            info!("task aborted");
        }
    }

    // ────────────── Tool batch ──────────────

    async fn handle_tool_calls(
        &self,
        calls: Vec<ToolCall>,
        run: &RunScope,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        for call in calls {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            self.state.emit(AgentEvent::tool_call(call.clone()));

            let outcome = match call.name.as_str() {
                ATTEMPT_COMPLETION => self.handle_completion(&call),
                ASK_USER => self.handle_ask_user(&call),
                _ => self.handle_tool(&call, run, cancel).await?,
            };
            if let CallOutcome::Stop = outcome {
                break;
            }
        }

        let status = self.state.status();
        if !status.is_terminal() && status != AgentStatus::WaitingUser {
            self.state.set_status(AgentStatus::Running);
            self.state.set_pending_tool(None);
        }
        Ok(())
    }

    fn handle_completion(&self, call: &ToolCall) -> CallOutcome {
        let result = call
            .params
            .get("result")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if !result.is_empty() {
            self.state
                .add_message(Message::assistant(format!("{COMPLETION_MARKER} {result}")));
        }
        self.complete(result);
        CallOutcome::Stop
    }

    fn handle_ask_user(&self, call: &ToolCall) -> CallOutcome {
        let question = call
            .params
            .get("question")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        let options: Vec<String> = match call.params.get("options") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect(),
            _ => Vec::new(),
        };

        let mut block = format!("[Question for the user]\n{question}");
        if !options.is_empty() {
            block.push_str("\n\nOptions:");
            for (i, option) in options.iter().enumerate() {
                block.push_str(&format!("\n{}. {option}", i + 1));
            }
        }

        self.state.add_message(Message::user(block));
        self.state.set_pending_tool(None);
        self.state.reset_errors();
        self.state.set_status(AgentStatus::WaitingUser);
        CallOutcome::Stop
    }

    async fn handle_tool(
        &self,
        call: &ToolCall,
        run: &RunScope,
        cancel: &CancellationToken,
    ) -> Result<CallOutcome, AgentError> {
        let canonical = self.tools.resolve_name(&call.name);

        // Unknown names skip the gate and fail in the registry.
        if self.tools.has(&canonical) && self.tools.requires_approval(&canonical) {
            let approved = self.await_approval(call, cancel).await;
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            self.state.set_pending_tool(None);
            self.state.set_status(AgentStatus::Running);
            if !approved {
                info!(tool = %canonical, "tool call denied");
                self.state.add_message(Message::user(format!(
                    "The user denied the {canonical} call. Do not retry it unchanged; \
                     choose another approach or ask the user."
                )));
                return Ok(CallOutcome::Continue);
            }
        }

        info!(tool = %canonical, "executing tool call");
        let mut result = self
            .tools
            .execute(&canonical, call.params.clone(), &run.tool_ctx)
            .await;
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        if result.success
            && canonical != ATTEMPT_COMPLETION
            && canonical != READ_CACHED_OUTPUT
            && char_len(&result.content) > self.settings.long_output_threshold
        {
            result.content = self
                .compress_long_output(&canonical, call, &result.content, cancel)
                .await?;
        }

        debug!(tool = %canonical, success = result.success, chars = result.content.len(), "tool result");
        self.state
            .emit(AgentEvent::tool_result(canonical.clone(), result.clone()));
        self.state
            .add_message(Message::user(format_tool_result(&canonical, &result)));

        if result.success {
            self.state.reset_errors();
            return Ok(CallOutcome::Continue);
        }

        let errors = self.state.increment_errors();
        if errors >= self.settings.max_consecutive_errors {
            self.state.set_error(format!(
                "Tool {canonical} failed {errors} times in a row: {}",
                result.display_text()
            ));
            return Ok(CallOutcome::Stop);
        }
        Ok(CallOutcome::Continue)
    }

    /// Publish the pending call and wait for a verdict. Abort counts as denial.
    async fn await_approval(&self, call: &ToolCall, cancel: &CancellationToken) -> bool {
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = self.approval.lock().unwrap_or_else(|p| p.into_inner());
            debug_assert!(slot.is_none(), "only one approval may be pending");
            if let Some(stale) = slot.replace(tx) {
                warn!("replacing a stale approval wait");
                let _ = stale.send(false);
            }
        }

        self.state.set_pending_tool(Some(call.clone()));
        self.state.set_status(AgentStatus::WaitingApproval);
        info!(tool = %call.name, "waiting for approval");

        let approved = tokio::select! {
            verdict = rx => verdict.unwrap_or(false),
            _ = cancel.cancelled() => false,
        };
        self.approval
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        approved
    }

    fn resolve_approval(&self, approved: bool) -> bool {
        let sender = self
            .approval
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        match sender {
            Some(tx) => {
                let _ = tx.send(approved);
                true
            }
            None => false,
        }
    }

    // ────────────── Long output ──────────────

    /// Cache `content` and return a short summary plus the cache notice.
    async fn compress_long_output(
        &self,
        tool: &str,
        call: &ToolCall,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let id = self.cache.cache(tool, content, Some(call.signature()));
        let limit = self.settings.truncate_fallback_chars;

        let summary = match self.summarize(tool, content, cancel).await {
            Ok(s) if !s.trim().is_empty() => truncate_string(s.trim(), limit),
            Ok(_) => truncate_string(content, limit),
            Err(e) if e.is_cancelled() => return Err(AgentError::Cancelled),
            Err(e) => {
                warn!(tool, error = %e, "summarization failed, truncating instead");
                truncate_string(content, limit)
            }
        };

        info!(tool, id = %id, original = char_len(content), "long tool output cached");
        Ok(format!(
            "{summary}\n\n[long output cached: {id}; call the {READ_CACHED_OUTPUT} tool or \
             reference \"{id}\" for the full text; do not re-invoke the original read tool]"
        ))
    }

    /// Isolated LLM call: no history, no tools.
    async fn summarize(
        &self,
        tool: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let guidance = self.settings.summary_guidance_chars;
        let messages = vec![
            Message::system(format!(
                "You condense tool output for an assistant with limited context. Reply with \
                 a plain-text summary of at most {guidance} characters that keeps names, \
                 paths, numbers and headings the assistant may need."
            )),
            Message::user(format!(
                "Output of the {tool} tool:\n\n{}",
                head_chars(content, SUMMARY_INPUT_CHARS)
            )),
        ];

        let response = self
            .provider
            .chat(&messages, ChatOptions::new(cancel), &self.request_config())
            .await?;
        self.state.record_usage(response.usage);
        Ok(response.content)
    }
}

/// How a tool outcome is written into the conversation.
fn format_tool_result(tool: &str, result: &ToolResult) -> String {
    if result.success {
        format!("[{tool} result]\n{}", result.content)
    } else {
        format!(
            "[{tool} failed]\n{}\n\n{REFLECTION_PROMPT}",
            result.display_text()
        )
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::{RagResult, TaskIntent};
    use crate::test_support::{native_call, RecordingTool, ScriptedProvider, StaticRetriever};
    use quill_core::types::{LlmResponse, UsageInfo};
    use serde_json::json;
    use std::sync::Weak;
    use std::time::Duration;

    fn chat_ctx() -> TaskContext {
        TaskContext::new("/v").with_intent(TaskIntent::Chat)
    }

    fn agent_with(provider: Arc<ScriptedProvider>, tools: Vec<Arc<RecordingTool>>) -> AgentLoop {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        AgentLoop::new(provider, registry).with_cache(Arc::new(OutputCache::new()))
    }

    fn completion(result: &str) -> LlmResponse {
        LlmResponse::with_tool_calls(
            "",
            vec![native_call("attempt_completion", json!({ "result": result }))],
        )
    }

    // ── Scenario A ──

    #[tokio::test]
    async fn test_plain_chat_reply_completes() {
        let provider = Arc::new(ScriptedProvider::new(vec![LlmResponse::text(
            "Hi! How can I help with your notes today?",
        )]));
        let agent = agent_with(provider.clone(), vec![]);

        let state = agent.start_task("hello", chat_ctx(), None).await;

        assert_eq!(state.status, AgentStatus::Completed);
        assert_eq!(state.messages.len(), 4);
        assert_eq!(state.messages[0].role(), quill_core::types::Role::System);
        assert!(state.messages[1].text().contains("hello"));
        assert_eq!(state.messages[2].text(), "Hi! How can I help with your notes today?");
        assert!(state.messages[3].text().starts_with("[TASK_COMPLETED]"));
        assert_eq!(provider.call_count(), 1);
    }

    // ── Scenario B ──

    #[tokio::test]
    async fn test_structured_completion_skips_registry() {
        let provider = Arc::new(ScriptedProvider::new(vec![completion("done")]));
        let spy = RecordingTool::ok("attempt_completion", "should never run");
        let agent = agent_with(provider, vec![spy.clone()]);

        let completed = Arc::new(Mutex::new(None));
        let c = completed.clone();
        let _sub = agent.on(Some(EventKind::Complete), move |e| {
            if let AgentEvent::Complete { result, .. } = e {
                *c.lock().unwrap() = Some(result.clone());
            }
        });

        let state = agent.start_task("finish up", chat_ctx(), None).await;

        assert_eq!(state.status, AgentStatus::Completed);
        let last = state.messages.last().unwrap();
        assert_eq!(last.text(), "[TASK_COMPLETED] done");
        assert!(state.messages[2].text().contains("<attempt_completion>\n<result>done</result>"));
        assert_eq!(spy.calls(), 0);
        assert_eq!(completed.lock().unwrap().as_deref(), Some("done"));
    }

    // ── Scenario C ──

    #[tokio::test]
    async fn test_denied_approval_skips_execution() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            LlmResponse::with_tool_calls(
                "",
                vec![native_call("create_note", json!({"path": "a.md", "content": "x"}))],
            ),
            completion("gave up"),
        ]));
        let gated = RecordingTool::ok("create_note", "created").gated();
        let agent = Arc::new(agent_with(provider, vec![gated.clone()]));

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let (seen, weak): (_, Weak<AgentLoop>) = (statuses.clone(), Arc::downgrade(&agent));
        let _sub = agent.on(Some(EventKind::StatusChange), move |e| {
            if let AgentEvent::StatusChange { to, .. } = e {
                seen.lock().unwrap().push(*to);
                if *to == AgentStatus::WaitingApproval {
                    if let Some(agent) = weak.upgrade() {
                        agent.approve_tool_call(false);
                    }
                }
            }
        });

        let state = agent
            .start_task("make a note", TaskContext::new("/v"), None)
            .await;

        assert_eq!(gated.calls(), 0);
        assert!(state
            .messages
            .iter()
            .any(|m| m.text().contains("denied the create_note call")));
        let statuses = statuses.lock().unwrap();
        let waiting = statuses
            .iter()
            .position(|s| *s == AgentStatus::WaitingApproval)
            .unwrap();
        assert_eq!(statuses[waiting + 1], AgentStatus::Running);
        assert_eq!(state.status, AgentStatus::Completed);
        assert!(state.pending_tool.is_none());
    }

    #[tokio::test]
    async fn test_approval_from_another_task_executes_tool() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            LlmResponse::with_tool_calls("", vec![native_call("create_note", json!({"path": "a.md"}))]),
            completion("created"),
        ]));
        let gated = RecordingTool::ok("create_note", "Successfully created a.md").gated();
        let agent = Arc::new(agent_with(provider, vec![gated.clone()]));

        let runner = {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move { agent.start_task("new note", TaskContext::new("/v"), None).await })
        };

        while agent.get_state().status != AgentStatus::WaitingApproval {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(agent.get_state().pending_tool.unwrap().name, "create_note");
        agent.approve_tool_call(true);

        let state = runner.await.unwrap();
        assert_eq!(gated.calls(), 1);
        assert_eq!(state.status, AgentStatus::Completed);
        assert!(state
            .messages
            .iter()
            .any(|m| m.text().starts_with("[create_note result]\nSuccessfully created a.md")));
    }

    #[tokio::test]
    async fn test_abort_during_approval_counts_as_denial() {
        let provider = Arc::new(ScriptedProvider::new(vec![LlmResponse::with_tool_calls(
            "",
            vec![native_call("create_note", json!({}))],
        )]));
        let gated = RecordingTool::ok("create_note", "x").gated();
        let agent = Arc::new(agent_with(provider.clone(), vec![gated.clone()]));

        let runner = {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move { agent.start_task("note", TaskContext::new("/v"), None).await })
        };
        while agent.get_state().status != AgentStatus::WaitingApproval {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        agent.abort();

        let state = runner.await.unwrap();
        assert_eq!(state.status, AgentStatus::Aborted);
        assert_eq!(gated.calls(), 0);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_approve_without_pending_is_noop() {
        let agent = agent_with(Arc::new(ScriptedProvider::new(vec![])), vec![]);
        agent.approve_tool_call(true);
        agent.approve_tool_call(false);
        assert_eq!(agent.get_state().status, AgentStatus::Idle);
    }

    // ── Scenario D ──

    #[tokio::test]
    async fn test_long_output_is_cached_and_summarized() {
        let body = "x".repeat(5000);
        let provider = Arc::new(
            ScriptedProvider::new(vec![
                LlmResponse::with_tool_calls("", vec![native_call("read_note", json!({"path": "big.md"}))]),
                completion("read it"),
            ])
            .with_summary("A very long run of x characters."),
        );
        let reader = RecordingTool::ok("read_note", &body);
        let agent = agent_with(provider.clone(), vec![reader]);

        let state = agent.start_task("read big.md", chat_ctx(), None).await;

        let result_msg = state
            .messages
            .iter()
            .find(|m| m.text().starts_with("[read_note result]"))
            .unwrap()
            .text();
        assert!(result_msg.contains("A very long run of x characters."));
        assert!(result_msg.contains("[long output cached: read_note-"));
        assert!(char_len(&result_msg) < 4000 + 300);

        assert_eq!(agent.cache().len(), 1);
        let id = result_msg
            .split("[long output cached: ")
            .nth(1)
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        assert_eq!(agent.cache().get(id).unwrap().content, body);
        assert_eq!(provider.summary_calls(), 1);
    }

    #[tokio::test]
    async fn test_summary_failure_falls_back_to_truncation() {
        let body = "y".repeat(5000);
        let provider = Arc::new(
            ScriptedProvider::new(vec![
                LlmResponse::with_tool_calls("", vec![native_call("read_note", json!({"path": "big.md"}))]),
                completion("ok"),
            ])
            .failing_summaries(),
        );
        let agent = agent_with(provider, vec![RecordingTool::ok("read_note", &body)]);

        let state = agent.start_task("read", chat_ctx(), None).await;

        let result_msg = state
            .messages
            .iter()
            .find(|m| m.text().starts_with("[read_note result]"))
            .unwrap()
            .text();
        assert!(result_msg.contains(&format!("{}...", "y".repeat(1997))));
        assert!(!result_msg.contains(&"y".repeat(2001)));
        assert_eq!(state.status, AgentStatus::Completed);
    }

    #[tokio::test]
    async fn test_cache_reader_output_is_not_recached() {
        let cache = Arc::new(OutputCache::new());
        let id = cache.cache("read_note", &"z".repeat(9000), None);
        let provider = Arc::new(ScriptedProvider::new(vec![
            LlmResponse::with_tool_calls(
                "",
                vec![native_call("read_cached_output", json!({"id": id, "length": 6000}))],
            ),
            completion("ok"),
        ]));
        let agent = AgentLoop::new(provider.clone(), ToolRegistry::new()).with_cache(cache.clone());

        let state = agent.start_task("page it", chat_ctx(), None).await;

        assert_eq!(cache.len(), 1);
        assert_eq!(provider.summary_calls(), 0);
        assert!(state
            .messages
            .iter()
            .any(|m| m.text().contains(&"z".repeat(6000))));
    }

    // ── Scenario E ──

    #[tokio::test]
    async fn test_three_tool_failures_stop_with_error() {
        let call = |n: u32| {
            LlmResponse::with_tool_calls("", vec![native_call("read_note", json!({ "path": format!("{n}.md") }))])
        };
        let provider = Arc::new(ScriptedProvider::new(vec![call(1), call(2), call(3), call(4)]));
        let failing = RecordingTool::failing("read_note", "disk on fire");
        let agent = agent_with(provider.clone(), vec![failing.clone()]);

        let errors_seen = Arc::new(Mutex::new(Vec::new()));
        let agent = Arc::new(agent);
        let (seen, weak) = (errors_seen.clone(), Arc::downgrade(&agent));
        let _sub = agent.on(Some(EventKind::ToolResult), move |_| {
            if let Some(agent) = weak.upgrade() {
                seen.lock().unwrap().push(agent.get_state().consecutive_errors);
            }
        });

        let state = agent.start_task("read notes", chat_ctx(), None).await;

        assert_eq!(state.status, AgentStatus::Error);
        assert!(state.last_error.as_deref().unwrap().contains("disk on fire"));
        assert_eq!(provider.call_count(), 3);
        assert_eq!(failing.calls(), 3);
        assert!(state.consecutive_errors <= 3);
        assert!(errors_seen.lock().unwrap().iter().all(|n| *n < 3));
        let failures = state
            .messages
            .iter()
            .filter(|m| m.text().contains("Think about why"))
            .count();
        assert_eq!(failures, 3);
    }

    #[tokio::test]
    async fn test_success_resets_error_budget() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            LlmResponse::with_tool_calls("", vec![native_call("edit_note", json!({"n": 1}))]),
            LlmResponse::with_tool_calls("", vec![native_call("edit_note", json!({"n": 2}))]),
            LlmResponse::with_tool_calls("", vec![native_call("list_notes", json!({}))]),
            LlmResponse::with_tool_calls("", vec![native_call("edit_note", json!({"n": 3}))]),
            LlmResponse::with_tool_calls("", vec![native_call("edit_note", json!({"n": 4}))]),
            completion("finally"),
        ]));
        let agent = agent_with(
            provider,
            vec![
                RecordingTool::failing("edit_note", "no match"),
                RecordingTool::ok("list_notes", "a.md"),
            ],
        );

        let state = agent.start_task("fix", chat_ctx(), None).await;
        assert_eq!(state.status, AgentStatus::Completed);
    }

    // ── Plain-text turns ──

    #[tokio::test]
    async fn test_action_mode_long_text_is_corrected_then_errors() {
        let long = "I will now restructure the note into three clear sections with headings.";
        let provider = Arc::new(ScriptedProvider::new(vec![
            LlmResponse::text(long),
            LlmResponse::text(long),
            LlmResponse::text(long),
            LlmResponse::text("never reached"),
        ]));
        let agent = agent_with(provider.clone(), vec![]);

        let ctx = TaskContext::new("/v").with_intent(TaskIntent::Edit);
        let state = agent.start_task("restructure inbox.md", ctx, None).await;

        assert_eq!(state.status, AgentStatus::Error);
        assert_eq!(provider.call_count(), 3);
        let nudges = state
            .messages
            .iter()
            .filter(|m| m.text() == USE_TOOL_PROMPT)
            .count();
        assert_eq!(nudges, 2);
    }

    #[tokio::test]
    async fn test_code_only_chat_reply_completes() {
        let code = "```python\nprint('hi')\n```";
        let provider = Arc::new(ScriptedProvider::new(vec![
            LlmResponse::text(code),
            LlmResponse::text("second"),
        ]));
        let agent = agent_with(provider.clone(), vec![]);

        let completed = Arc::new(Mutex::new(None));
        let c = completed.clone();
        let _sub = agent.on(Some(EventKind::Complete), move |e| {
            if let AgentEvent::Complete { result, .. } = e {
                *c.lock().unwrap() = Some(result.clone());
            }
        });

        let state = agent
            .start_task("give me a python hello world", chat_ctx(), None)
            .await;

        assert_eq!(state.status, AgentStatus::Completed);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(state.consecutive_errors, 0);
        assert!(!state.messages.iter().any(|m| m.text() == USE_TOOL_PROMPT));
        assert_eq!(
            state.messages.last().unwrap().text(),
            format!("[TASK_COMPLETED] {code}")
        );
        assert_eq!(completed.lock().unwrap().as_deref(), Some(code));
    }

    #[tokio::test]
    async fn test_thinking_only_reply_is_not_an_answer() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            LlmResponse::text("<thinking>what do they want?</thinking>"),
            LlmResponse::text("Hello there."),
        ]));
        let agent = agent_with(provider.clone(), vec![]);

        let state = agent.start_task("hello", chat_ctx(), None).await;

        assert_eq!(state.status, AgentStatus::Completed);
        assert_eq!(provider.call_count(), 2);
        assert_eq!(state.messages.last().unwrap().text(), "[TASK_COMPLETED] Hello there.");
    }

    #[tokio::test]
    async fn test_marker_inside_code_block_does_not_complete() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            LlmResponse::text(
                "Quote the marker like this:\n```\n[TASK_COMPLETED] done\n```\nThat is all I will say on the subject of markers for now.",
            ),
            completion("done"),
        ]));
        let agent = agent_with(provider.clone(), vec![]);

        let ctx = TaskContext::new("/v").with_intent(TaskIntent::Edit);
        let state = agent.start_task("explain the marker", ctx, None).await;

        assert_eq!(provider.call_count(), 2);
        assert!(state.messages.iter().any(|m| m.text() == USE_TOOL_PROMPT));
        assert_eq!(state.status, AgentStatus::Completed);
    }

    #[tokio::test]
    async fn test_text_parsed_tool_call_and_marker() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            LlmResponse::text("<read_file>\n<path>inbox.md</path>\n</read_file>"),
            LlmResponse::text("[TASK_COMPLETED] Inbox has one item."),
        ]));
        let reader = RecordingTool::ok("read_note", "   1 | milk");
        let agent = agent_with(provider, vec![reader.clone()]);

        let state = agent
            .start_task("what's in my inbox?", TaskContext::new("/v"), None)
            .await;

        assert_eq!(reader.calls(), 1);
        assert_eq!(reader.last_params().unwrap()["path"], json!("inbox.md"));
        assert_eq!(state.status, AgentStatus::Completed);
        assert_eq!(state.messages.last().unwrap().text(), "[TASK_COMPLETED] Inbox has one item.");
    }

    #[tokio::test]
    async fn test_ask_user_waits_and_next_task_keeps_history() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            LlmResponse::with_tool_calls(
                "",
                vec![native_call(
                    "ask_user",
                    json!({"question": "Which folder?", "options": ["inbox", "archive"]}),
                )],
            ),
            completion("moved"),
        ]));
        let agent = agent_with(provider, vec![]);

        let state = agent.start_task("file this", TaskContext::new("/v"), None).await;
        assert_eq!(state.status, AgentStatus::WaitingUser);
        let question = state.messages.last().unwrap().text();
        assert!(question.contains("Which folder?"));
        assert!(question.contains("1. inbox\n2. archive"));

        let before = state.messages.len();
        let state = agent.start_task("archive", TaskContext::new("/v"), None).await;
        assert_eq!(state.status, AgentStatus::Completed);
        assert!(state.messages.len() > before + 1);
        assert!(state.messages[before].text().contains("archive"));
    }

    // ── Failures, cancellation, limits ──

    #[tokio::test]
    async fn test_provider_errors_retry_then_fail() {
        let provider = Arc::new(ScriptedProvider::new(vec![]).failing_chat("upstream 502"));
        let agent = agent_with(provider.clone(), vec![]);

        let state = agent.start_task("hello", chat_ctx(), None).await;

        assert_eq!(state.status, AgentStatus::Error);
        assert!(state.last_error.unwrap().contains("upstream 502"));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_abort_during_llm_call() {
        let provider = Arc::new(ScriptedProvider::hanging());
        let agent = Arc::new(agent_with(provider, vec![]));

        let runner = {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move { agent.start_task("hello", chat_ctx(), None).await })
        };
        while agent.get_state().request_count == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        agent.abort();

        let state = runner.await.unwrap();
        assert_eq!(state.status, AgentStatus::Aborted);
        assert_eq!(state.consecutive_errors, 0);
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn test_abort_after_completion_keeps_completed() {
        let provider = Arc::new(ScriptedProvider::new(vec![completion("done")]));
        let agent = agent_with(provider, vec![]);
        agent.start_task("x", chat_ctx(), None).await;
        agent.abort();
        assert_eq!(agent.get_state().status, AgentStatus::Completed);
    }

    #[tokio::test]
    async fn test_repeated_batches_count_as_failure() {
        let same = || LlmResponse::with_tool_calls("", vec![native_call("list_notes", json!({"path": "."}))]);
        let provider = Arc::new(ScriptedProvider::new(vec![same(), same(), same(), completion("ok")]));
        let lister = RecordingTool::ok("list_notes", "a.md");
        let agent = agent_with(provider, vec![lister.clone()]);

        let state = agent.start_task("list", chat_ctx(), None).await;

        assert_eq!(lister.calls(), 2);
        assert!(state
            .messages
            .iter()
            .any(|m| m.text().contains("repeated 3 times")));
        assert_eq!(state.status, AgentStatus::Completed);
    }

    #[tokio::test]
    async fn test_turn_limit() {
        let provider = Arc::new(ScriptedProvider::new(
            (0..5)
                .map(|n| LlmResponse::with_tool_calls("", vec![native_call("list_notes", json!({ "n": n }))]))
                .collect(),
        ));
        let settings = LoopSettings {
            max_turns: 2,
            ..LoopSettings::default()
        };
        let agent = agent_with(provider.clone(), vec![RecordingTool::ok("list_notes", "a")])
            .with_settings(settings);

        let state = agent.start_task("loop", chat_ctx(), None).await;
        assert_eq!(state.status, AgentStatus::Error);
        assert!(state.last_error.unwrap().contains("2 LLM calls"));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_soft_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            LlmResponse::with_tool_calls("", vec![native_call("teleport_note", json!({}))]),
            completion("ok"),
        ]));
        let agent = agent_with(provider, vec![RecordingTool::ok("read_note", "x")]);

        let state = agent.start_task("go", chat_ctx(), None).await;
        let failure = state
            .messages
            .iter()
            .find(|m| m.text().starts_with("[teleport_note failed]"))
            .unwrap()
            .text();
        assert!(failure.contains("Available tools: read_cached_output, read_note"));
        assert_eq!(state.status, AgentStatus::Completed);
    }

    // ── Context, continuation, accounting ──

    #[tokio::test]
    async fn test_retrieval_enriches_long_queries_only() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            LlmResponse::text("Ownership means one owner."),
            LlmResponse::text("Hi."),
        ]));
        let retriever = Arc::new(StaticRetriever::new(vec![RagResult {
            file_path: "rust/ownership.md".into(),
            content: "Each value has one owner.".into(),
            score: 0.8,
            heading: None,
        }]));
        let agent = agent_with(provider, vec![]).with_retriever(retriever.clone());

        let state = agent.start_task("explain ownership", chat_ctx(), None).await;
        assert!(state.messages[1].text().contains("rust/ownership.md"));

        agent.set_messages(Vec::new());
        let state = agent.start_task("hi", chat_ctx(), None).await;
        assert!(!state.messages[1].text().contains("related_notes"));
        assert_eq!(retriever.searches(), 1);
    }

    #[tokio::test]
    async fn test_retrieval_failure_is_swallowed() {
        let provider = Arc::new(ScriptedProvider::new(vec![LlmResponse::text("fine")]));
        let agent = agent_with(provider, vec![]).with_retriever(Arc::new(StaticRetriever::failing()));

        let state = agent.start_task("search my notes", chat_ctx(), None).await;
        assert_eq!(state.status, AgentStatus::Completed);
    }

    #[tokio::test]
    async fn test_continue_loop_after_timeout_hint() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            LlmResponse::text("Hello."),
            LlmResponse::text("Still here."),
        ]));
        let agent = agent_with(provider.clone(), vec![]);
        agent.start_task("hi there", chat_ctx(), None).await;

        agent.add_timeout_hint("The last request timed out; answer briefly.");
        let state = agent.continue_loop(chat_ctx(), None).await;

        assert_eq!(state.status, AgentStatus::Completed);
        assert_eq!(provider.call_count(), 2);
        let last_request = provider.last_messages();
        assert_eq!(
            last_request.last().unwrap().text(),
            "The last request timed out; answer briefly."
        );
    }

    #[tokio::test]
    async fn test_instructions_and_skills_reach_system_prompt() {
        let provider = Arc::new(ScriptedProvider::new(vec![LlmResponse::text("Noted.")]));
        let agent = agent_with(provider.clone(), vec![]);
        let ctx = chat_ctx()
            .with_instructions("Dates are ISO 8601.")
            .with_skill(crate::modes::SkillContext::new("tags", "Tag every note."));

        agent.start_task("hi", ctx, None).await;

        let system = provider.last_messages()[0].text();
        assert!(system.contains("# Workspace Instructions\n\nDates are ISO 8601."));
        assert!(system.contains("# Skill: tags (tags)"));
    }

    #[tokio::test]
    async fn test_usage_accumulates_including_summaries() {
        let usage = UsageInfo {
            prompt_tokens: 100,
            completion_tokens: 10,
            total_tokens: 110,
        };
        let provider = Arc::new(
            ScriptedProvider::new(vec![
                LlmResponse::with_tool_calls("", vec![native_call("read_note", json!({"path": "big.md"}))]),
                completion("ok"),
            ])
            .with_usage(usage)
            .with_summary("short"),
        );
        let agent = agent_with(provider, vec![RecordingTool::ok("read_note", &"q".repeat(4500))]);

        let state = agent.start_task("read", chat_ctx(), None).await;
        assert_eq!(state.request_count, 2);
        assert_eq!(state.token_usage.total_tokens, 330);
    }

    #[tokio::test]
    async fn test_mode_limits_exposed_tools() {
        let provider = Arc::new(ScriptedProvider::new(vec![LlmResponse::text("ok")]));
        let agent = agent_with(
            provider.clone(),
            vec![
                RecordingTool::ok("read_note", "x"),
                RecordingTool::ok("move_note", "x").gated(),
            ],
        );

        let ctx = chat_ctx().with_mode(AgentMode::writer());
        agent.start_task("hello", ctx, None).await;

        let names = provider.last_tool_names();
        assert_eq!(
            names,
            vec!["read_note", "read_cached_output", "ask_user", "attempt_completion"]
        );
    }

    #[tokio::test]
    async fn test_config_override_reaches_provider() {
        let provider = Arc::new(ScriptedProvider::new(vec![LlmResponse::text("ok")]));
        let agent = agent_with(provider.clone(), vec![]);
        let config = LlmRequestConfig {
            model: Some("tiny-model".into()),
            max_tokens: 256,
            temperature: 0.0,
        };

        let state = agent.start_task("hello", chat_ctx(), Some(config)).await;
        assert_eq!(provider.last_model().as_deref(), Some("tiny-model"));
        assert_eq!(state.llm_config.unwrap().max_tokens, 256);
    }

    #[test]
    fn test_settings_from_defaults() {
        let mut defaults = AgentDefaults::default();
        defaults.max_consecutive_errors = 0;
        let settings = LoopSettings::from(&defaults);
        assert_eq!(settings.max_consecutive_errors, 1);
        assert_eq!(settings.long_output_threshold, 4000);
        assert_eq!(settings.request.model.as_deref(), Some("gpt-4o-mini"));
    }
}
