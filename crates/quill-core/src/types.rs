//! Core types for Quill — the conversation model shared by the agent and providers.
//!
//! Messages follow the OpenAI chat completions shape so they can be handed to
//! any OpenAI-compatible backend unchanged. Tool results are carried back to
//! the model as user-role messages, so only three roles exist.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// Role of a conversation message.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message.
///
/// Each variant maps to a `role` field value.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role")]
pub enum Message {
    #[serde(rename = "system")]
    System { content: String },

    #[serde(rename = "user")]
    User {
        content: MessageContent,
        /// Files the user attached to this message (names and paths only).
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<Attachment>,
    },

    #[serde(rename = "assistant")]
    Assistant { content: String },
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    /// Create a user message with text content.
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: MessageContent::Text(content.into()),
            attachments: Vec::new(),
        }
    }

    /// Create a user message with multipart content (text + images).
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Message::User {
            content: MessageContent::Parts(parts),
            attachments: Vec::new(),
        }
    }

    /// Attach files to a user message. No-op on other roles.
    pub fn with_attachments(mut self, files: Vec<Attachment>) -> Self {
        if let Message::User { attachments, .. } = &mut self {
            *attachments = files;
        }
        self
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
        }
    }

    /// Plain-text view of the message. Image parts are skipped.
    pub fn text(&self) -> String {
        match self {
            Message::System { content } | Message::Assistant { content } => content.clone(),
            Message::User { content, .. } => content.as_text(),
        }
    }

    /// The JSON object sent to an OpenAI-compatible API.
    ///
    /// Attachments are host-side metadata and are not part of the wire format.
    pub fn to_api_value(&self) -> serde_json::Value {
        match self {
            Message::User { content, .. } => serde_json::json!({
                "role": "user",
                "content": content,
            }),
            other => serde_json::to_value(other).unwrap_or(serde_json::Value::Null),
        }
    }
}

// ─────────────────────────────────────────────
// Message Content (text or multipart/vision)
// ─────────────────────────────────────────────

/// User message content — either plain text or multipart (for vision/images).
///
/// When serialized: text becomes a plain string, parts become an array of objects.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenate the text parts.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A single part of a multipart message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    /// Image URL part (can be a URL or base64 data URI).
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

/// Image URL payload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A file the user attached to a message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    /// Display name (usually the file name).
    pub name: String,
    /// Workspace-relative or absolute path.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

// ─────────────────────────────────────────────
// Native tool calls (function calling)
// ─────────────────────────────────────────────

/// A structured tool call returned by a function-calling model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NativeToolCall {
    /// Provider-assigned call id.
    pub id: String,
    /// Always "function" in current OpenAI API.
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

impl NativeToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        NativeToolCall {
            id: id.into(),
            call_type: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// The function name and arguments within a tool call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments string.
    pub arguments: String,
}

// ─────────────────────────────────────────────
// Tool Definitions (for LLM requests)
// ─────────────────────────────────────────────

/// Definition of a tool, sent to the LLM so it knows what tools are available.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// Always "function".
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

/// Schema of a function tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

// ─────────────────────────────────────────────
// LLM Response
// ─────────────────────────────────────────────

/// Response from an LLM provider after a chat completion call.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    /// Text content from the assistant (empty when the model only called tools).
    pub content: String,
    /// Structured tool calls, when the model used function calling.
    pub tool_calls: Vec<NativeToolCall>,
    /// Why the model stopped generating.
    pub finish_reason: Option<String>,
    pub usage: Option<UsageInfo>,
}

impl LlmResponse {
    /// A plain text reply.
    pub fn text(content: impl Into<String>) -> Self {
        LlmResponse {
            content: content.into(),
            ..Default::default()
        }
    }

    /// A reply carrying structured tool calls.
    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<NativeToolCall>) -> Self {
        LlmResponse {
            content: content.into(),
            tool_calls,
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token usage statistics from the LLM.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// ─────────────────────────────────────────────
// Wire types (OpenAI-compatible API)
// ─────────────────────────────────────────────

/// Raw chat completion response from an OpenAI-compatible API.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    pub usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

/// The assistant message within a chat completion choice.
#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<NativeToolCall>>,
}

impl ChatCompletionResponse {
    /// Convert into an `LlmResponse`, or `None` if the API returned no choices.
    pub fn into_llm_response(self) -> Option<LlmResponse> {
        let usage = self.usage;
        self.choices.into_iter().next().map(|c| LlmResponse {
            content: c.message.content.unwrap_or_default(),
            tool_calls: c.message.tool_calls.unwrap_or_default(),
            finish_reason: c.finish_reason,
            usage,
        })
    }
}

/// Request body for an OpenAI-compatible chat completion API.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
