//! JSON persistence for `MemoryStore` (spec §4.2, §6).
//!
//! A single JSON file at `<dir>/<fileName>`. Writes always use the
//! canonical `{ "memories": [...] }` shape; reads tolerate a bare array or
//! a bare object under a different root (spec §6), and tolerate individual
//! records missing fields the same way `store()` defaults them.

use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::model::{Memory, MemoryContext, MemoryKind};

use super::importance;

#[derive(Serialize, Deserialize)]
struct PersistedFile {
    memories: Vec<Memory>,
}

/// A record's shape as tolerated on load: every field optional so one
/// malformed or partial entry doesn't reject the whole file. Field names
/// mirror `Memory`'s own `#[serde(rename = ...)]` choices.
#[derive(Debug, Clone, Default, Deserialize)]
struct LenientMemory {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<MemoryKind>,
    content: Option<String>,
    summary: Option<String>,
    #[serde(default)]
    tags: IndexSet<String>,
    #[serde(default)]
    context: MemoryContext,
    importance: Option<f32>,
    #[serde(rename = "expiresAt")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: std::collections::HashMap<String, serde_json::Value>,
    #[serde(rename = "createdAt")]
    created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "lastAccessedAt")]
    last_accessed_at: Option<DateTime<Utc>>,
    #[serde(rename = "accessCount", default)]
    access_count: u64,
    #[serde(rename = "consolidatedFrom", default)]
    consolidated_from: Vec<String>,
    #[serde(rename = "consolidatedInto")]
    consolidated_into: Option<String>,
    #[serde(default)]
    consolidated: bool,
}

/// Fills in the same defaults `MemoryStore::store()` applies to a
/// `NewMemory` missing those fields (spec §4.2). A record missing `id` has
/// nothing stable to key it by and is dropped; everything else defaults.
fn build_lenient(partial: LenientMemory, now: DateTime<Utc>) -> Option<Memory> {
    let id = partial.id?;
    let kind = partial.kind.unwrap_or(MemoryKind::LongTerm);
    let content = partial.content.unwrap_or_default();
    let importance = partial
        .importance
        .unwrap_or_else(|| importance::default_importance(kind, &content, &partial.tags, &partial.context));

    let mut memory = Memory {
        id,
        kind,
        content,
        summary: partial.summary,
        tags: partial.tags,
        context: partial.context,
        importance,
        expires_at: partial.expires_at,
        metadata: partial.metadata,
        created_at: partial.created_at.unwrap_or(now),
        updated_at: partial.updated_at.unwrap_or(now),
        last_accessed_at: partial.last_accessed_at,
        access_count: partial.access_count,
        consolidated_from: partial.consolidated_from,
        consolidated_into: partial.consolidated_into,
        consolidated: partial.consolidated,
    };
    memory.clamp_importance();
    Some(memory)
}

/// Force an immediate flush. I/O and encode failures are fatal to the
/// caller (spec §7: "fatal-to-caller on saveNow()").
pub async fn save_now(path: &Path, memories: Vec<Memory>) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| EngineError::PersistenceFailure(e.to_string()))?;
    }
    let file = PersistedFile { memories };
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| EngineError::PersistenceFailure(e.to_string()))?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| EngineError::PersistenceFailure(e.to_string()))?;
    Ok(())
}

/// Load and rebuild in-memory state. Missing files or decode errors are
/// non-fatal: warn and continue with empty state (spec §7). `now` backs
/// the defaulted `createdAt`/`updatedAt` for records missing them, taken
/// from the store's clock so tests stay deterministic.
pub async fn load_now(path: &Path, now: DateTime<Utc>) -> Vec<Memory> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "persistence file unreadable; starting empty");
            return Vec::new();
        }
    };
    parse_lenient(&text, now)
}

/// Per-record-lenient JSON root: a `{"memories": [...]}` envelope, a bare
/// array, or a single object, each element parsed independently so one
/// malformed entry doesn't drop the rest of the file.
fn parse_lenient(text: &str, now: DateTime<Utc>) -> Vec<Memory> {
    let Ok(root) = serde_json::from_str::<serde_json::Value>(text) else {
        warn!("persistence file was not valid JSON; starting empty");
        return Vec::new();
    };

    let entries: Vec<serde_json::Value> = if let Some(array) = root.get("memories").and_then(|v| v.as_array()) {
        array.clone()
    } else if let Some(array) = root.as_array() {
        array.clone()
    } else if root.is_object() {
        vec![root]
    } else {
        warn!("persistence file root was not an object or array; starting empty");
        return Vec::new();
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let partial: LenientMemory = serde_json::from_value(entry).unwrap_or_default();
            build_lenient(partial, now)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_array() {
        let text = r#"[{"id":"a"}]"#;
        let memories = parse_lenient(text, Utc::now());
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].id, "a");
        assert_eq!(memories[0].kind, MemoryKind::LongTerm);
        assert_eq!(memories[0].content, "");
    }

    #[test]
    fn entry_missing_id_is_dropped_but_others_survive() {
        let text = r#"{"memories":[{"id":"a"},{"content":"no id here"},{"id":"b"}]}"#;
        let memories = parse_lenient(text, Utc::now());
        let ids: Vec<&str> = memories.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn missing_importance_is_computed_like_store() {
        let text = r#"[{"id":"a","content":"hello world","type":"semantic"}]"#;
        let memories = parse_lenient(text, Utc::now());
        assert!(memories[0].importance > 0.0);
    }

    #[test]
    fn invalid_json_yields_empty() {
        assert!(parse_lenient("not json", Utc::now()).is_empty());
    }
}
