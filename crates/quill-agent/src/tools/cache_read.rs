//! `read_cached_output` — pages through a tool output the loop cached.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::base::{optional_usize, require_string, Tool, ToolContext, ToolResult};
use crate::output_cache::OutputCache;

pub const READ_CACHED_OUTPUT: &str = "read_cached_output";

pub struct ReadCachedOutputTool {
    cache: Arc<OutputCache>,
    /// Characters returned when the caller gives no `length`.
    window: usize,
}

impl ReadCachedOutputTool {
    pub fn new(cache: Arc<OutputCache>, window: usize) -> Self {
        Self {
            cache,
            window: window.max(1),
        }
    }
}

#[async_trait]
impl Tool for ReadCachedOutputTool {
    fn name(&self) -> &str {
        READ_CACHED_OUTPUT
    }

    fn description(&self) -> &str {
        "Read the full text of a long tool output that was cached and summarized. \
         Use the id from the '[long output cached: <id>]' notice. Page with offset/length."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {
                    "type": "string",
                    "description": "Cache id from the notice"
                },
                "offset": {
                    "type": "integer",
                    "description": "Character offset to start from (default 0)"
                },
                "length": {
                    "type": "integer",
                    "description": "Number of characters to return"
                }
            },
            "required": ["id"]
        })
    }

    fn requires_approval(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        params: HashMap<String, Value>,
        _ctx: &ToolContext,
    ) -> anyhow::Result<ToolResult> {
        let id = require_string(&params, "id")?;
        let Some(entry) = self.cache.get(&id) else {
            return Ok(ToolResult::fail(format!(
                "No cached output with id '{id}'. Cached outputs only live for the current session."
            )));
        };

        let total = entry.content.chars().count();
        let offset = optional_usize(&params, "offset").unwrap_or(0);
        let length = optional_usize(&params, "length").unwrap_or(self.window).max(1);

        if offset >= total && total > 0 {
            return Ok(ToolResult::fail(format!(
                "Offset {offset} is past the end of '{id}' ({total} characters)"
            )));
        }

        let chunk: String = entry.content.chars().skip(offset).take(length).collect();
        let end = offset + chunk.chars().count();

        let mut out = chunk;
        if end < total {
            out.push_str(&format!(
                "\n\n[showing characters {offset}-{end} of {total}; call {READ_CACHED_OUTPUT} \
                 with offset={end} for more]"
            ));
        } else if offset > 0 {
            out.push_str(&format!("\n\n[end of cached output, {total} characters]"));
        }
        Ok(ToolResult::ok(out))
    }
}
