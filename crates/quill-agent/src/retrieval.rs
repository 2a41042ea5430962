//! Retrieval capability used to enrich a task with related notes.

use async_trait::async_trait;

use crate::modes::RagResult;

/// Semantic search over the workspace. Implementations must be side-effect free.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Whether the index is loaded. The loop skips retrieval when it is not.
    fn is_ready(&self) -> bool;

    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<RagResult>>;
}
