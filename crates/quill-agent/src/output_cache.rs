//! Tool output cache — keeps long tool results out of the conversation.
//!
//! Entries live for the life of the process. There is no eviction besides
//! [`OutputCache::clear`]; ids embed a millisecond timestamp and a random
//! suffix so they never collide across sessions sharing one cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};
use tracing::debug;

/// A cached tool output.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedOutput {
    pub id: String,
    /// Canonical name of the tool that produced it.
    pub tool: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Optional fingerprint of the call parameters.
    pub params_signature: Option<String>,
}

#[derive(Debug, Default)]
pub struct OutputCache {
    entries: Mutex<HashMap<String, CachedOutput>>,
}

impl OutputCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn shared() -> Arc<OutputCache> {
        static SHARED: OnceLock<Arc<OutputCache>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(OutputCache::new())))
    }

    /// Store `content` and return its new id.
    pub fn cache(&self, tool: &str, content: &str, signature: Option<String>) -> String {
        let now = Utc::now();
        let random = uuid::Uuid::new_v4().simple().to_string();
        let id = format!(
            "{}-{:x}-{}",
            sanitize(tool),
            now.timestamp_millis(),
            &random[..8]
        );

        let entry = CachedOutput {
            id: id.clone(),
            tool: tool.to_string(),
            content: content.to_string(),
            created_at: now,
            params_signature: signature,
        };
        self.lock().insert(id.clone(), entry);
        debug!(id = %id, tool, chars = content.chars().count(), "cached tool output");
        id
    }

    pub fn get(&self, id: &str) -> Option<CachedOutput> {
        self.lock().get(id.trim()).cloned()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachedOutput>> {
        // A poisoned map is still a valid map.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keep ids to `[a-z0-9_]` so they survive being quoted back by a model.
fn sanitize(tool: &str) -> String {
    let cleaned: String = tool
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "tool".to_string()
    } else {
        cleaned
    }
}
