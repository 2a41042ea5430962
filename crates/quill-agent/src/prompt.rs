//! Prompt builder — turns a [`TaskContext`] into the system prompt and the
//! first user message of a task.
//!
//! Output depends only on its inputs (no clock, no filesystem), so the same
//! context and mode always produce the same prompt. Optional sections are
//! left out when their data is absent; the host loads the workspace
//! instructions file into the context beforehand.

use quill_core::types::{ContentPart, Message, ToolDefinition};
use quill_core::utils::truncate_string;

use crate::modes::{RagResult, SkillContext, TaskContext, TaskInput};
use crate::tools::control::{ASK_USER, ATTEMPT_COMPLETION, COMPLETION_MARKER};

/// Characters of each retrieved note shown to the model.
const RAG_SNIPPET_CHARS: usize = 600;

/// Builds the system prompt and first user message for the agent loop.
#[derive(Clone, Debug, Default)]
pub struct PromptBuilder {
    /// Extra rules appended after the built-in ones.
    extra_rules: Vec<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.extra_rules.push(rule.into());
        self
    }

    // ────────────── System prompt ──────────────

    /// Build the system prompt for `ctx` given the tools the model can call.
    pub fn build_system_prompt(&self, ctx: &TaskContext, tools: &[ToolDefinition]) -> String {
        let mut parts: Vec<String> = Vec::new();

        parts.push(format!("# Role\n\n{}", ctx.mode.role_definition));
        parts.push(self.build_tool_section(tools));

        let mut workspace = format!(
            "# Workspace\n\n- **Path**: `{}`\n- **Mode**: {}",
            ctx.workspace_path.display(),
            ctx.mode.name
        );
        if let Some(note) = ctx.active_note.as_deref().filter(|n| !n.is_empty()) {
            workspace.push_str(&format!("\n- **Active note**: `{note}`"));
        }
        parts.push(workspace);

        if let Some(tree) = ctx.file_tree.as_deref().filter(|t| !t.trim().is_empty()) {
            parts.push(format!("# File Tree\n\n```\n{}\n```", tree.trim_end()));
        }

        if let Some(recent) = ctx.recent_notes.as_ref().filter(|r| !r.is_empty()) {
            let list = recent
                .iter()
                .map(|n| format!("- {n}"))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("# Recently Opened\n\n{list}"));
        }

        if let Some(instructions) = ctx.instructions.as_deref().map(str::trim).filter(|i| !i.is_empty()) {
            parts.push(format!("# Workspace Instructions\n\n{instructions}"));
        }

        parts.extend(ctx.skills.iter().map(format_skill));

        parts.push(self.build_rules());
        parts.join("\n\n---\n\n")
    }

    fn build_tool_section(&self, tools: &[ToolDefinition]) -> String {
        let list = tools
            .iter()
            .map(|t| format!("- `{}`: {}", t.function.name, t.function.description))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "# Tools\n\n\
             Use tools to work on the notes; never claim a change you did not make with a tool.\n\
             Call tools through function calling. If function calling is unavailable, write the \
             call as XML with one tag per parameter:\n\n\
             <read_note>\n<path>inbox.md</path>\n</read_note>\n\n\
             When the task is done, call `{ATTEMPT_COMPLETION}` with the result. \
             If you cannot continue without the user, call `{ASK_USER}`.\n\n\
             ## Available tools\n\n{list}"
        )
    }

    fn build_rules(&self) -> String {
        let mut rules = vec![
            "Read a note before editing it.".to_string(),
            "Use workspace-relative paths.".to_string(),
            "Long tool outputs are summarized and cached; use `read_cached_output` with the \
             cache id to see the full text instead of calling the original tool again."
                .to_string(),
            format!(
                "For a plain conversational answer, reply in text; the reply is shown to the \
                 user and marked {COMPLETION_MARKER}."
            ),
        ];
        rules.extend(self.extra_rules.iter().cloned());

        let list = rules
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {r}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        format!("# Rules\n\n{list}")
    }

    // ────────────── First user message ──────────────

    /// Wrap the task (and any retrieved notes) into the user message.
    ///
    /// With images the message is multipart: one text part, then the images.
    pub fn build_task_message(&self, input: &TaskInput, ctx: &TaskContext) -> Message {
        let mut text = format!("<task>\n{}\n</task>", input.text.trim());

        if let Some(results) = ctx.rag_results.as_ref().filter(|r| !r.is_empty()) {
            text.push_str("\n\n");
            text.push_str(&format_rag_results(results));
        }

        let message = if input.images.is_empty() {
            Message::user(text)
        } else {
            let mut parts = vec![ContentPart::Text { text }];
            parts.extend(input.images.iter().cloned().map(|image_url| ContentPart::ImageUrl { image_url }));
            Message::user_parts(parts)
        };
        message.with_attachments(input.attachments.clone())
    }
}

fn format_skill(skill: &SkillContext) -> String {
    let title = skill.title.as_deref().unwrap_or(&skill.name);
    let mut out = format!("# Skill: {title} ({})", skill.name);

    let mut meta = Vec::new();
    if let Some(desc) = skill.description.as_deref() {
        meta.push(format!("Description: {desc}"));
    }
    if let Some(source) = skill.source.as_deref() {
        meta.push(format!("Source: {source}"));
    }
    if !meta.is_empty() {
        out.push_str("\n\n");
        out.push_str(&meta.join("\n"));
    }

    out.push_str("\n\n");
    out.push_str(skill.prompt.trim());
    out
}

fn format_rag_results(results: &[RagResult]) -> String {
    let mut out = String::from("<related_notes>");
    for r in results {
        let heading = r
            .heading
            .as_deref()
            .map(|h| format!(" heading=\"{h}\""))
            .unwrap_or_default();
        out.push_str(&format!(
            "\n<note path=\"{}\"{heading} score=\"{:.2}\">\n{}\n</note>",
            r.file_path,
            r.score,
            truncate_string(r.content.trim(), RAG_SNIPPET_CHARS)
        ));
    }
    out.push_str("\n</related_notes>");
    out
}
