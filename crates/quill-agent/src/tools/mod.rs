//! Tool modules for the Quill agent.

pub mod base;
pub mod cache_read;
pub mod control;
pub mod notes;
pub mod registry;

use std::sync::Arc;

pub use base::{optional_bool, optional_string, optional_usize, require_string, Tool, ToolContext, ToolResult};
pub use cache_read::ReadCachedOutputTool;
pub use notes::{CreateNoteTool, EditNoteTool, ListNotesTool, ReadNoteTool};
pub use registry::ToolRegistry;

/// A registry holding the built-in note tools.
pub fn note_tools() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ReadNoteTool));
    registry.register(Arc::new(ListNotesTool));
    registry.register(Arc::new(CreateNoteTool));
    registry.register(Arc::new(EditNoteTool));
    registry
}
