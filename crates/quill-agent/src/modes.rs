//! Modes, intents and the per-task context record.
//!
//! A mode decides which tools the model sees and how its role is described.
//! `editor` and `organizer` are action-oriented: a plain-text reply there is
//! usually a missed tool call rather than an answer.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use quill_core::types::{Attachment, ImageUrl};

// ─────────────────────────────────────────────
// AgentMode
// ─────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMode {
    pub slug: String,
    pub name: String,
    pub role_definition: String,
    /// Tool names exposed for function calling, in prompt order.
    pub tools: Vec<String>,
}

impl AgentMode {
    pub fn new(slug: &str, name: &str, role_definition: &str, tools: &[&str]) -> Self {
        Self {
            slug: slug.to_string(),
            name: name.to_string(),
            role_definition: role_definition.to_string(),
            tools: tools.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn is_action_oriented(&self) -> bool {
        matches!(self.slug.as_str(), "editor" | "organizer")
    }

    pub fn editor() -> Self {
        Self::new(
            "editor",
            "Editor",
            "You are a careful note editor. You read notes before changing them and \
             make precise, minimal edits that keep the author's voice.",
            &[
                "read_note",
                "read_outline",
                "read_section",
                "edit_note",
                "create_note",
                "list_notes",
                "search_notes",
                "read_cached_output",
            ],
        )
    }

    pub fn researcher() -> Self {
        Self::new(
            "researcher",
            "Researcher",
            "You are a research assistant for a personal knowledge base. You search \
             widely, read the relevant notes, and answer with references to them.",
            &[
                "read_note",
                "read_outline",
                "read_section",
                "list_notes",
                "fast_search",
                "search_notes",
                "grep_search",
                "semantic_search",
                "get_backlinks",
                "read_cached_output",
            ],
        )
    }

    pub fn writer() -> Self {
        Self::new(
            "writer",
            "Writer",
            "You are a writing partner. You draft new notes and expand existing ones \
             in clear, well-structured Markdown.",
            &[
                "read_note",
                "create_note",
                "edit_note",
                "list_notes",
                "read_cached_output",
            ],
        )
    }

    pub fn organizer() -> Self {
        Self::new(
            "organizer",
            "Organizer",
            "You keep the workspace tidy: you move, rename, create and delete notes \
             so the folder structure stays easy to navigate.",
            &[
                "read_note",
                "list_notes",
                "move_note",
                "delete_note",
                "create_note",
                "query_database",
                "add_database_row",
                "read_cached_output",
            ],
        )
    }

    pub fn builtin() -> Vec<AgentMode> {
        vec![
            Self::editor(),
            Self::researcher(),
            Self::writer(),
            Self::organizer(),
        ]
    }

    /// Look up a built-in mode by slug.
    pub fn by_slug(slug: &str) -> Option<AgentMode> {
        Self::builtin().into_iter().find(|m| m.slug == slug)
    }
}

impl Default for AgentMode {
    fn default() -> Self {
        Self::editor()
    }
}

// ─────────────────────────────────────────────
// TaskIntent
// ─────────────────────────────────────────────

/// What the user is asking for, as classified by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskIntent {
    Chat,
    Edit,
    Create,
    Organize,
    Search,
    Complex,
}

impl TaskIntent {
    /// Intents whose answer is a change to the workspace.
    pub fn is_action(self) -> bool {
        matches!(self, TaskIntent::Edit | TaskIntent::Create | TaskIntent::Organize)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskIntent::Chat => "chat",
            TaskIntent::Edit => "edit",
            TaskIntent::Create => "create",
            TaskIntent::Organize => "organize",
            TaskIntent::Search => "search",
            TaskIntent::Complex => "complex",
        }
    }
}

impl std::str::FromStr for TaskIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chat" => Ok(TaskIntent::Chat),
            "edit" => Ok(TaskIntent::Edit),
            "create" => Ok(TaskIntent::Create),
            "organize" => Ok(TaskIntent::Organize),
            "search" => Ok(TaskIntent::Search),
            "complex" => Ok(TaskIntent::Complex),
            other => Err(format!("unknown intent: {other}")),
        }
    }
}

// ─────────────────────────────────────────────
// Task context / input
// ─────────────────────────────────────────────

/// A note returned by retrieval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagResult {
    pub file_path: String,
    pub content: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
}

/// A reusable instruction set the host attaches to a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillContext {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl SkillContext {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            prompt: prompt.into(),
            source: None,
        }
    }
}

/// Workspace-local instructions file, relative to the workspace root.
pub const INSTRUCTIONS_FILE: &str = ".quill/AGENT.md";

/// Read the workspace instructions file.
///
/// A missing or blank file yields `None`; a read error is logged and skipped.
pub fn load_workspace_instructions(workspace: &Path) -> Option<String> {
    let path = workspace.join(INSTRUCTIONS_FILE);
    if !path.is_file() {
        return None;
    }
    match std::fs::read_to_string(&path) {
        Ok(content) => Some(content.trim().to_string()).filter(|c| !c.is_empty()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read workspace instructions");
            None
        }
    }
}

/// Everything the prompt builder knows about the workspace for one task.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskContext {
    pub workspace_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_tree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_notes: Option<Vec<String>>,
    pub mode: AgentMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<TaskIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_results: Option<Vec<RagResult>>,
    /// Contents of the workspace instructions file, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<SkillContext>,
}

impl TaskContext {
    pub fn new(workspace_path: impl Into<PathBuf>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: AgentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_intent(mut self, intent: TaskIntent) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn with_active_note(mut self, note: impl Into<String>) -> Self {
        self.active_note = Some(note.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_skill(mut self, skill: SkillContext) -> Self {
        self.skills.push(skill);
        self
    }
}

/// The user's request: text plus optional images and attached files.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskInput {
    pub text: String,
    pub images: Vec<ImageUrl>,
    pub attachments: Vec<Attachment>,
}

impl TaskInput {
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.images.push(ImageUrl {
            url: url.into(),
            detail: None,
        });
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

impl From<&str> for TaskInput {
    fn from(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }
}

impl From<String> for TaskInput {
    fn from(text: String) -> Self {
        Self {
            text,
            ..Default::default()
        }
    }
}
