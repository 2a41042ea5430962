//! Whether a reply without tool calls may end the task.

use std::sync::OnceLock;

use regex::Regex;

use crate::modes::{AgentMode, TaskIntent};

/// Replies shorter than this (in characters) count as a direct answer.
const SHORT_REPLY_CHARS: usize = 50;

fn thinking_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<thinking>.*?(</thinking>|$)").expect("thinking regex must compile")
    })
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```.*?(```|$)").expect("fence regex must compile"))
}

fn tag_like_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[A-Za-z0-9]*_[A-Za-z0-9_]*").expect("tag regex must compile"))
}

/// Remove `<thinking>` blocks (closed or left open) from a reply.
pub fn strip_thinking(text: &str) -> String {
    thinking_re().replace_all(text, "").into_owned()
}

/// Remove thinking blocks and fenced code, then trim.
pub fn clean_reply(text: &str) -> String {
    let without_thinking = strip_thinking(text);
    fence_re().replace_all(&without_thinking, "").trim().to_string()
}

/// A `<` followed by an identifier containing an underscore, e.g. `<read_note`.
/// Suggests the model tried to call a tool and got the syntax wrong.
pub fn has_tag_like_pattern(cleaned: &str) -> bool {
    tag_like_re().is_match(cleaned)
}

/// Decide whether a tool-less reply is an acceptable final answer.
///
/// Checked in order:
/// 1. chat-intent tasks always end on plain text, even when it mentions
///    tag-like text such as `<file_name>`;
/// 2. anything else that looks like a broken tool tag never ends the task;
/// 3. in action-oriented modes, or under an edit/create/organize intent,
///    only short replies or questions end the task;
/// 4. everything else ends the task.
pub fn allows_plain_text_stop(cleaned: &str, mode: &AgentMode, intent: Option<TaskIntent>) -> bool {
    if intent == Some(TaskIntent::Chat) {
        return true;
    }
    if has_tag_like_pattern(cleaned) {
        return false;
    }

    let action = mode.is_action_oriented() || intent.is_some_and(TaskIntent::is_action);
    if action {
        return cleaned.chars().count() < SHORT_REPLY_CHARS || cleaned.contains('?') || cleaned.contains('？');
    }
    true
}
