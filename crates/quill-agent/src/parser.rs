//! Message parser — turns a model reply into canonical [`ToolCall`]s.
//!
//! A reply carries tool calls in one of two shapes: structured function
//! calls, or XML-like tags in the text (`<read_note><path>a.md</path></read_note>`).
//! Both are normalized here so the loop only ever sees `ToolCall`.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use tracing::warn;

use quill_core::types::{LlmResponse, NativeToolCall};

use crate::decision::{clean_reply, strip_thinking};
use crate::tools::control::{is_control_tool, ASK_USER, ATTEMPT_COMPLETION, COMPLETION_MARKER};
use crate::tools::registry::{alias_names, ToolRegistry};

/// One tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub params: HashMap<String, Value>,
    /// The call as the model produced it (tag text or call JSON).
    pub raw: String,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, params: HashMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            params,
            raw: String::new(),
        }
    }

    /// Stable fingerprint of name + params, used to spot repeated calls.
    pub fn signature(&self) -> String {
        let sorted: BTreeMap<&String, &Value> = self.params.iter().collect();
        format!(
            "{}:{}",
            self.name,
            serde_json::to_string(&sorted).unwrap_or_default()
        )
    }
}

/// Where a reply's tool calls came from.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolCallSource {
    Structured(Vec<NativeToolCall>),
    TextParsed(String),
}

/// A reply reduced to what the loop acts on.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedReply {
    pub tool_calls: Vec<ToolCall>,
    /// `attempt_completion` was called or the completion marker was written.
    pub completed: bool,
    pub source: ToolCallSource,
}

impl ParsedReply {
    pub fn is_structured(&self) -> bool {
        matches!(self.source, ToolCallSource::Structured(_))
    }
}

// ─────────────────────────────────────────────
// Parser
// ─────────────────────────────────────────────

/// Parses replies against a fixed set of tool names.
///
/// Only tags whose name is known count as calls in text replies, so ordinary
/// Markdown or HTML in an answer is never mistaken for a tool call.
#[derive(Clone, Debug, Default)]
pub struct MessageParser {
    known: HashSet<String>,
}

impl MessageParser {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut known: HashSet<String> = names.into_iter().map(Into::into).collect();
        known.insert(ATTEMPT_COMPLETION.to_string());
        known.insert(ASK_USER.to_string());
        Self { known }
    }

    /// Registered tools, their aliases and the control tools.
    pub fn for_registry(registry: &ToolRegistry) -> Self {
        let names = registry
            .tool_names()
            .into_iter()
            .chain(alias_names().map(str::to_string));
        Self::new(names)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    /// Parse one reply. Structured calls win over anything in the text.
    pub fn parse(&self, response: &LlmResponse) -> ParsedReply {
        if response.has_tool_calls() {
            let tool_calls: Vec<ToolCall> = response.tool_calls.iter().map(from_native).collect();
            let completed = tool_calls.iter().any(|c| c.name == ATTEMPT_COMPLETION);
            return ParsedReply {
                tool_calls,
                completed,
                source: ToolCallSource::Structured(response.tool_calls.clone()),
            };
        }

        let tool_calls = self.parse_text(&response.content);
        let completed = tool_calls.iter().any(|c| c.name == ATTEMPT_COMPLETION)
            || clean_reply(&response.content).contains(COMPLETION_MARKER);
        ParsedReply {
            tool_calls,
            completed,
            source: ToolCallSource::TextParsed(response.content.clone()),
        }
    }

    /// Extract tag-delimited calls from free text, in order of appearance.
    pub fn parse_text(&self, text: &str) -> Vec<ToolCall> {
        let text = strip_thinking(text);
        let mut calls = Vec::new();
        let mut cursor = 0;

        while let Some((name, open_start, body_start)) = next_open_tag(&text, cursor) {
            let lowered = name.to_lowercase();
            if !self.is_known(&lowered) {
                cursor = body_start;
                continue;
            }
            let close = format!("</{name}>");
            let Some(rel_end) = text[body_start..].find(&close) else {
                cursor = body_start;
                continue;
            };
            let body_end = body_start + rel_end;
            let call_end = body_end + close.len();

            calls.push(ToolCall {
                name: lowered,
                params: parse_params(&text[body_start..body_end]),
                raw: text[open_start..call_end].to_string(),
            });
            cursor = call_end;
        }
        calls
    }
}

fn from_native(native: &NativeToolCall) -> ToolCall {
    let arguments = native.function.arguments.trim();
    let params = if arguments.is_empty() {
        HashMap::new()
    } else {
        match serde_json::from_str::<HashMap<String, Value>>(arguments) {
            Ok(p) => p,
            Err(e) => {
                warn!(tool = %native.function.name, error = %e, "unparsable tool arguments");
                HashMap::new()
            }
        }
    };

    let name = native.function.name.trim();
    let lowered = name.to_lowercase();
    let name = if is_control_tool(&lowered) { lowered } else { name.to_string() };

    ToolCall {
        name,
        params,
        raw: serde_json::to_string(native).unwrap_or_default(),
    }
}

/// Find the next `<identifier>` at or after `from`.
/// Returns (identifier, tag start, index just past `>`).
fn next_open_tag(text: &str, from: usize) -> Option<(&str, usize, usize)> {
    let mut search = from;
    while let Some(rel) = text[search..].find('<') {
        let start = search + rel;
        let after = start + 1;
        let ident_len = text[after..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(text.len() - after);
        let ident_end = after + ident_len;
        if ident_len > 0 && text[ident_end..].starts_with('>') {
            return Some((&text[after..ident_end], start, ident_end + 1));
        }
        search = after;
    }
    None
}

/// Parameters are the direct child tags of a call body.
fn parse_params(body: &str) -> HashMap<String, Value> {
    let mut params = HashMap::new();
    let mut cursor = 0;

    while let Some((key, _, value_start)) = next_open_tag(body, cursor) {
        let close = format!("</{key}>");
        let Some(rel_end) = body[value_start..].find(&close) else {
            cursor = value_start;
            continue;
        };
        let value_end = value_start + rel_end;
        params.insert(key.to_string(), parse_value(&body[value_start..value_end]));
        cursor = value_end + close.len();
    }
    params
}

/// Values that look like JSON arrays/objects are decoded; everything else is text.
fn parse_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(v) = serde_json::from_str(trimmed) {
            return v;
        }
    }
    Value::String(trim_newlines(raw).to_string())
}

/// Strip the newline padding tags usually carry, keep inner indentation.
fn trim_newlines(raw: &str) -> &str {
    raw.trim_start_matches(['\n', '\r']).trim_end_matches(['\n', '\r'])
}

// ─────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────

/// Render calls in the tag syntax, so structured and text replies read the
/// same in the transcript. Params are sorted by key.
pub fn render_tool_calls_as_text(calls: &[ToolCall]) -> String {
    calls
        .iter()
        .map(|call| {
            let sorted: BTreeMap<&String, &Value> = call.params.iter().collect();
            let mut out = format!("<{}>\n", call.name);
            for (key, value) in sorted {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out.push_str(&format!("<{key}>{text}</{key}>\n"));
            }
            out.push_str(&format!("</{}>", call.name));
            out
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parser() -> MessageParser {
        MessageParser::new(["read_note", "edit_note", "list_notes"])
    }

    #[test]
    fn test_structured_calls_preferred() {
        let resp = LlmResponse::with_tool_calls(
            "<list_notes></list_notes>",
            vec![NativeToolCall::new("c1", "read_note", r#"{"path":"a.md"}"#)],
        );
        let parsed = parser().parse(&resp);
        assert!(parsed.is_structured());
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].params["path"], json!("a.md"));
        assert!(parsed.tool_calls[0].raw.contains("\"arguments\""));
        assert!(!parsed.completed);
    }

    #[test]
    fn test_structured_completion_and_bad_arguments() {
        let resp = LlmResponse::with_tool_calls(
            "",
            vec![
                NativeToolCall::new("c1", "read_note", "{not json"),
                NativeToolCall::new("c2", "Attempt_Completion", r#"{"result":"done"}"#),
            ],
        );
        let parsed = parser().parse(&resp);
        assert!(parsed.tool_calls[0].params.is_empty());
        assert_eq!(parsed.tool_calls[1].name, "attempt_completion");
        assert!(parsed.completed);
    }

    #[test]
    fn test_text_calls_in_order() {
        let text = "Let me look.\n<read_note>\n<path>inbox.md</path>\n</read_note>\n\
                    then <edit_note><path>a.md</path><old_string>  x\n</old_string><new_string>y</new_string></edit_note>";
        let parsed = parser().parse(&LlmResponse::text(text));
        assert!(!parsed.is_structured());
        let calls = &parsed.tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "read_note");
        assert_eq!(calls[0].params["path"], json!("inbox.md"));
        assert_eq!(calls[0].raw, "<read_note>\n<path>inbox.md</path>\n</read_note>");
        assert_eq!(calls[1].params["old_string"], json!("  x"));
    }

    #[test]
    fn test_unknown_tags_and_thinking_ignored() {
        let text = "<thinking><read_note><path>secret</path></read_note></thinking>\
                    <b>bold</b> <html_tag>x</html_tag>";
        assert!(parser().parse_text(text).is_empty());
    }

    #[test]
    fn test_json_params_and_case_repair() {
        let text = "<ASK_USER><question>Which?</question><options>[\"a\",\"b\"]</options></ASK_USER>";
        let calls = parser().parse_text(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "ask_user");
        assert_eq!(calls[0].params["question"], json!("Which?"));
        assert_eq!(calls[0].params["options"], json!(["a", "b"]));

        let mismatched = "<read_note><path>a.md</path></READ_NOTE>";
        assert!(parser().parse_text(mismatched).is_empty());
    }

    #[test]
    fn test_text_completion_marker() {
        let parsed = parser().parse(&LlmResponse::text("[TASK_COMPLETED] all done"));
        assert!(parsed.tool_calls.is_empty());
        assert!(parsed.completed);

        let hidden = parser().parse(&LlmResponse::text("<thinking>[TASK_COMPLETED]</thinking>hmm"));
        assert!(!hidden.completed);
    }

    #[test]
    fn test_completion_marker_in_code_block_ignored() {
        let quoted = parser().parse(&LlmResponse::text(
            "Write it like this:\n```\n[TASK_COMPLETED] done\n```\nand nothing else.",
        ));
        assert!(!quoted.completed);

        let after = parser().parse(&LlmResponse::text("```\nlet x = 1;\n```\n[TASK_COMPLETED] fixed"));
        assert!(after.completed);
    }

    #[test]
    fn test_unclosed_tag_is_skipped() {
        let calls = parser().parse_text("<read_note><path>a.md</path> oops <list_notes></list_notes>");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "list_notes");
    }

    #[test]
    fn test_render_matches_parse() {
        let mut params = HashMap::new();
        params.insert("path".to_string(), json!("a.md"));
        params.insert("depth".to_string(), json!(2));
        let call = ToolCall::new("list_notes", params);

        let text = render_tool_calls_as_text(&[call.clone()]);
        assert_eq!(text, "<list_notes>\n<depth>2</depth>\n<path>a.md</path>\n</list_notes>");

        let reparsed = parser().parse_text(&text);
        assert_eq!(reparsed[0].params["path"], json!("a.md"));
    }

    #[test]
    fn test_signature_is_order_independent() {
        let a: HashMap<String, Value> = [("x".to_string(), json!(1)), ("y".to_string(), json!(2))].into();
        let b: HashMap<String, Value> = [("y".to_string(), json!(2)), ("x".to_string(), json!(1))].into();
        assert_eq!(ToolCall::new("t", a).signature(), ToolCall::new("t", b).signature());
    }
}
