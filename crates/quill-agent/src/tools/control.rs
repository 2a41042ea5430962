//! Control tools — `attempt_completion` and `ask_user`.
//!
//! These are exposed to the model like any other tool but the loop handles
//! them itself; they never reach the registry.

use serde_json::json;

use quill_core::types::ToolDefinition;

pub const ATTEMPT_COMPLETION: &str = "attempt_completion";
pub const ASK_USER: &str = "ask_user";

/// Marker that prefixes a final answer in the conversation.
pub const COMPLETION_MARKER: &str = "[TASK_COMPLETED]";

pub fn is_control_tool(name: &str) -> bool {
    name == ATTEMPT_COMPLETION || name == ASK_USER
}

pub fn attempt_completion_definition() -> ToolDefinition {
    ToolDefinition::new(
        ATTEMPT_COMPLETION,
        "Finish the task. Call this once the work is done, with a short summary \
         of what was changed or found.",
        json!({
            "type": "object",
            "properties": {
                "result": {
                    "type": "string",
                    "description": "Final answer or summary of the completed work"
                }
            },
            "required": ["result"]
        }),
    )
}

pub fn ask_user_definition() -> ToolDefinition {
    ToolDefinition::new(
        ASK_USER,
        "Ask the user a question when the task cannot continue without their input.",
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask"
                },
                "options": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional answers the user can pick from"
                }
            },
            "required": ["question"]
        }),
    )
}

pub fn control_definitions() -> Vec<ToolDefinition> {
    vec![ask_user_definition(), attempt_completion_definition()]
}
