//! `MemoryStore` — canonical owner of `Memory` records (spec §4.2).

pub mod importance;
mod persistence;
pub mod similarity;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexSet;

use crate::config::{MemoryConfig, PersistenceConfig};
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::model::{Memory, MemoryContext, MemoryKind, MemoryPatch, NewMemory};
use crate::scheduler::{Clock, DebounceHandle, SystemClock};

/// Sortable fields for `StoreQuery` (spec.md §4.2's "sortable" requirement
/// for `search(query)`), mirroring `graph::search::SortField`'s shape for
/// the store's own domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Importance,
    AccessCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// A native query against the store (distinct from [`crate::model::RetrievalQuery`],
/// which is the retriever's public-facing query shape).
#[derive(Debug, Clone, Default)]
pub struct StoreQuery {
    pub kind: Option<MemoryKind>,
    pub tags_any: Vec<String>,
    pub context_equals: HashMap<String, serde_json::Value>,
    pub text: Option<String>,
    pub min_importance: Option<f32>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub sort: Option<(SortField, SortDirection)>,
    pub limit: Option<usize>,
}

/// A patch describing how to build the merged memory in `merge()`
/// (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct MergePatch {
    pub content: Option<String>,
    pub summary: Option<String>,
    pub importance: Option<f32>,
}

pub struct MemoryStore {
    memories: indexmap::IndexMap<String, Memory>,
    by_kind: HashMap<&'static str, IndexSet<String>>,
    by_context_key: HashMap<String, IndexSet<String>>,
    by_keyword: HashMap<String, IndexSet<String>>,
    config: MemoryConfig,
    events: EventBus,
    clock: Arc<dyn Clock>,
    debounce: DebounceHandle,
}

impl MemoryStore {
    pub fn new(config: MemoryConfig, events: EventBus) -> Self {
        Self::with_clock(config, events, Arc::new(SystemClock))
    }

    pub fn with_clock(config: MemoryConfig, events: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            memories: indexmap::IndexMap::new(),
            by_kind: HashMap::new(),
            by_context_key: HashMap::new(),
            by_keyword: HashMap::new(),
            config,
            events,
            clock,
            debounce: DebounceHandle::new(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    pub fn persistence_config(&self) -> &PersistenceConfig {
        &self.config.persistence
    }

    // -- indexing -----------------------------------------------------

    fn index_keywords(content: &str, tags: &IndexSet<String>) -> IndexSet<String> {
        let mut keys: IndexSet<String> = similarity::tokenize(content).into_iter().collect();
        for tag in tags {
            keys.insert(tag.to_lowercase());
        }
        keys
    }

    fn index_insert(&mut self, memory: &Memory) {
        self.by_kind
            .entry(memory.kind.as_str())
            .or_default()
            .insert(memory.id.clone());
        for key in similarity::context_pairs(&memory.context) {
            self.by_context_key.entry(key).or_default().insert(memory.id.clone());
        }
        for keyword in Self::index_keywords(&memory.content, &memory.tags) {
            self.by_keyword.entry(keyword).or_default().insert(memory.id.clone());
        }
    }

    fn index_remove(&mut self, memory: &Memory) {
        if let Some(set) = self.by_kind.get_mut(memory.kind.as_str()) {
            set.shift_remove(&memory.id);
        }
        for key in similarity::context_pairs(&memory.context) {
            if let Some(set) = self.by_context_key.get_mut(&key) {
                set.shift_remove(&memory.id);
            }
        }
        for keyword in Self::index_keywords(&memory.content, &memory.tags) {
            if let Some(set) = self.by_keyword.get_mut(&keyword) {
                set.shift_remove(&memory.id);
            }
        }
    }

    pub fn get_by_kind(&self, kind: MemoryKind) -> Vec<&Memory> {
        self.by_kind
            .get(kind.as_str())
            .into_iter()
            .flatten()
            .filter_map(|id| self.memories.get(id))
            .collect()
    }

    // -- core operations ------------------------------------------------

    /// Stores a new memory. Returns `Ok(false)` (not an error) on a
    /// duplicate id, per the store-idempotence invariant (spec §8).
    pub fn store(&mut self, new: NewMemory) -> EngineResult<bool> {
        if new.content.trim().is_empty() {
            return Err(EngineError::InvalidInput("content must be non-empty".into()));
        }
        if self.memories.contains_key(&new.id) {
            return Ok(false);
        }
        if let Some(expires_at) = new.expires_at {
            if expires_at <= self.now() {
                return Err(EngineError::InvalidInput(
                    "expiresAt must be strictly after createdAt".into(),
                ));
            }
        }

        if self.memories.len() >= self.config.max_size {
            self.cleanup_expired();
            if self.memories.len() >= self.config.max_size {
                self.events.publish(EngineEvent::CapacityWarning {
                    size: self.memories.len(),
                    max_size: self.config.max_size,
                });
                return Err(EngineError::CapacityExceeded);
            }
        }

        let now = self.now();
        let importance = new.importance.unwrap_or_else(|| {
            importance::default_importance(new.kind, &new.content, &new.tags, &new.context)
        });

        let mut memory = Memory {
            id: new.id,
            kind: new.kind,
            content: new.content,
            summary: new.summary,
            tags: new.tags,
            context: new.context,
            importance,
            expires_at: new.expires_at,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
            access_count: 0,
            consolidated_from: Vec::new(),
            consolidated_into: None,
            consolidated: false,
        };
        memory.clamp_importance();

        self.index_insert(&memory);
        self.events.publish(EngineEvent::MemoryStored {
            memory: Box::new(memory.clone()),
        });
        self.memories.insert(memory.id.clone(), memory);
        self.debounce.request();
        Ok(true)
    }

    /// Updates an existing memory, reindexing as needed and recomputing
    /// importance only when content/context/tags changed (spec §4.2).
    pub fn update(&mut self, id: &str, patch: MemoryPatch) -> EngineResult<Memory> {
        let old = self
            .memories
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        self.index_remove(&old);
        let mut updated = old.clone();

        if let Some(content) = patch.content {
            if content.trim().is_empty() {
                self.index_insert(&old);
                return Err(EngineError::InvalidInput("content must be non-empty".into()));
            }
            updated.content = content;
        }
        if let Some(summary) = patch.summary {
            updated.summary = summary;
        }
        if let Some(tags) = patch.tags {
            updated.tags = tags;
        }
        if let Some(context) = patch.context {
            updated.context = context;
        }
        if let Some(expires_at) = patch.expires_at {
            updated.expires_at = expires_at;
        }
        if let Some(metadata) = patch.metadata {
            updated.metadata = metadata;
        }

        let touches_importance = patch.importance.is_some()
            || (updated.content != old.content)
            || (updated.context != old.context)
            || (updated.tags != old.tags);

        if let Some(importance) = patch.importance {
            updated.importance = importance;
        } else if touches_importance {
            updated.importance = importance::default_importance(
                updated.kind,
                &updated.content,
                &updated.tags,
                &updated.context,
            );
        }
        updated.clamp_importance();
        updated.updated_at = self.now();

        self.index_insert(&updated);
        self.memories.insert(id.to_string(), updated.clone());
        self.events.publish(EngineEvent::MemoryUpdated {
            old: Box::new(old),
            new: Box::new(updated.clone()),
        });
        self.debounce.request();
        Ok(updated)
    }

    pub fn remove(&mut self, id: &str) -> EngineResult<Memory> {
        let memory = self
            .memories
            .shift_remove(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        self.index_remove(&memory);
        self.events.publish(EngineEvent::MemoryRemoved { id: id.to_string() });
        self.debounce.request();
        Ok(memory)
    }

    /// Bumps access stats on read (spec §4.2).
    pub fn get(&mut self, id: &str) -> Option<Memory> {
        let now = self.now();
        let memory = self.memories.get_mut(id)?;
        memory.touch_access(now);
        Some(memory.clone())
    }

    /// Read without bumping access stats — used internally by similarity
    /// computations that must not count as an access.
    pub fn peek(&self, id: &str) -> Option<&Memory> {
        self.memories.get(id)
    }

    pub fn search(&mut self, query: &StoreQuery) -> Vec<Memory> {
        let now = self.now();
        let mut matched: Vec<&Memory> = self
            .memories
            .values()
            .filter(|m| Self::matches_query(m, query))
            .collect();

        if let Some((field, direction)) = query.sort {
            matched.sort_by(|a, b| {
                let ordering = match field {
                    SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                    SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                    SortField::Importance => a
                        .importance
                        .partial_cmp(&b.importance)
                        .unwrap_or(std::cmp::Ordering::Equal),
                    SortField::AccessCount => a.access_count.cmp(&b.access_count),
                };
                match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }

        let mut matched_ids: Vec<String> = matched.into_iter().map(|m| m.id.clone()).collect();

        if let Some(limit) = query.limit {
            matched_ids.truncate(limit);
        }

        matched_ids
            .into_iter()
            .filter_map(|id| {
                let memory = self.memories.get_mut(&id)?;
                memory.touch_access(now);
                Some(memory.clone())
            })
            .collect()
    }

    fn matches_query(memory: &Memory, query: &StoreQuery) -> bool {
        if let Some(kind) = query.kind {
            if memory.kind.as_str() != kind.as_str() {
                return false;
            }
        }
        if !query.tags_any.is_empty() {
            let lowered: IndexSet<String> = memory.tags.iter().map(|t| t.to_lowercase()).collect();
            if !query
                .tags_any
                .iter()
                .any(|t| lowered.contains(&t.to_lowercase()))
            {
                return false;
            }
        }
        for (key, expected) in &query.context_equals {
            if memory.context.get(key).as_ref() != Some(expected) {
                return false;
            }
        }
        if let Some(text) = &query.text {
            let needle = text.to_lowercase();
            let haystack_hit = memory.content.to_lowercase().contains(&needle)
                || memory
                    .summary
                    .as_ref()
                    .is_some_and(|s| s.to_lowercase().contains(&needle))
                || memory.tags.iter().any(|t| t.to_lowercase().contains(&needle));
            if !haystack_hit {
                return false;
            }
        }
        if let Some(min_importance) = query.min_importance {
            if memory.importance < min_importance {
                return false;
            }
        }
        if let Some(after) = query.created_after {
            if memory.created_at < after {
                return false;
            }
        }
        if let Some(before) = query.created_before {
            if memory.created_at > before {
                return false;
            }
        }
        true
    }

    /// Pairwise similarity against all other memories, returning those at
    /// or above `min_score` sorted descending (spec §4.2).
    pub fn get_related(&self, id: &str, min_score: f32, limit: Option<usize>) -> EngineResult<Vec<(Memory, f32)>> {
        let anchor = self
            .memories
            .get(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let mut scored: Vec<(Memory, f32)> = self
            .memories
            .values()
            .filter(|m| m.id != id)
            .map(|m| (m.clone(), similarity::pairwise_similarity(anchor, m)))
            .filter(|(_, score)| *score >= min_score)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(limit) = limit {
            scored.truncate(limit);
        }
        Ok(scored)
    }

    /// `findSimilarMemories` free-text overload (spec §4.2, §9 naming
    /// note: exposed as a distinct entry point rather than an overload).
    pub fn find_similar_to_text(&self, text: &str, min_score: f32, limit: usize) -> Vec<(Memory, f32)> {
        let mut scored: Vec<(Memory, f32)> = self
            .memories
            .values()
            .map(|m| (m.clone(), similarity::text_similarity_to_memory(text, m)))
            .filter(|(_, score)| *score >= min_score)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }

    /// `findSimilarMemories` reference-memory overload (spec §4.2).
    pub fn find_similar_to_memory(
        &self,
        id: &str,
        min_score: f32,
        limit: usize,
    ) -> EngineResult<Vec<(Memory, f32)>> {
        self.get_related(id, min_score, Some(limit))
    }

    /// Merges `ids` into a new `merged_`-prefixed memory (spec §4.2).
    pub fn merge(&mut self, ids: &[String], patch: MergePatch) -> EngineResult<String> {
        if ids.len() < 2 {
            return Err(EngineError::InvalidInput(
                "merge requires at least two memory ids".into(),
            ));
        }
        let mut originals = Vec::with_capacity(ids.len());
        for id in ids {
            let memory = self
                .memories
                .get(id)
                .ok_or_else(|| EngineError::NotFound(id.clone()))?;
            originals.push(memory.clone());
        }

        let content = patch.content.clone().unwrap_or_else(|| {
            originals
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        });

        let mut tags = IndexSet::new();
        for m in &originals {
            tags.extend(m.tags.iter().cloned());
        }

        let mut context = originals[0].context.clone();
        for m in &originals[1..] {
            context = context.merge_first_writer_wins(&m.context);
        }

        let importance = patch.importance.unwrap_or_else(|| {
            originals
                .iter()
                .map(|m| m.importance)
                .fold(f32::MIN, f32::max)
        });

        let created_at = originals
            .iter()
            .map(|m| m.created_at)
            .min()
            .expect("at least two originals");

        let now = self.now();
        let merged_id = format!("merged_{}", uuid::Uuid::new_v4());
        let mut merged = Memory {
            id: merged_id.clone(),
            kind: originals[0].kind,
            content,
            summary: patch.summary,
            tags,
            context,
            importance,
            expires_at: None,
            metadata: HashMap::new(),
            created_at,
            updated_at: now,
            last_accessed_at: None,
            access_count: 0,
            consolidated_from: ids.to_vec(),
            consolidated_into: None,
            consolidated: false,
        };
        merged.clamp_importance();

        self.index_insert(&merged);
        self.memories.insert(merged_id.clone(), merged);

        for id in ids {
            if let Some(memory) = self.memories.shift_remove(id) {
                self.index_remove(&memory);
            }
        }

        self.events.publish(EngineEvent::MemoriesMerged {
            original_ids: ids.to_vec(),
            merged_id: merged_id.clone(),
        });
        self.debounce.request();
        Ok(merged_id)
    }

    pub fn cleanup_expired(&mut self) -> usize {
        let now = self.now();
        let expired: Vec<String> = self
            .memories
            .values()
            .filter(|m| m.is_expired(now))
            .map(|m| m.id.clone())
            .collect();
        for id in &expired {
            if let Some(memory) = self.memories.shift_remove(id) {
                self.index_remove(&memory);
            }
        }
        if !expired.is_empty() {
            self.events.publish(EngineEvent::MemoriesExpired { ids: expired.clone() });
            self.debounce.request();
        }
        expired.len()
    }

    pub fn cleanup_low_importance(&mut self, threshold: f32, max_to_remove: usize) -> usize {
        let mut candidates: Vec<String> = self
            .memories
            .values()
            .filter(|m| m.importance < threshold)
            .map(|m| m.id.clone())
            .collect();
        candidates.truncate(max_to_remove);
        for id in &candidates {
            if let Some(memory) = self.memories.shift_remove(id) {
                self.index_remove(&memory);
            }
        }
        if !candidates.is_empty() {
            self.events.publish(EngineEvent::LowImportanceMemoriesRemoved {
                ids: candidates.clone(),
            });
            self.debounce.request();
        }
        candidates.len()
    }

    pub fn all(&self) -> impl Iterator<Item = &Memory> {
        self.memories.values()
    }

    // -- persistence ------------------------------------------------------

    fn persistence_path(&self) -> Option<PathBuf> {
        if self.config.persistence.enabled {
            Some(self.config.persistence.path())
        } else {
            None
        }
    }

    pub async fn save_now(&self) -> EngineResult<()> {
        let Some(path) = self.persistence_path() else {
            return Ok(());
        };
        let memories: Vec<Memory> = self.memories.values().cloned().collect();
        let count = memories.len();
        persistence::save_now(&path, memories).await?;
        self.events.publish(EngineEvent::MemoriesPersisted { count });
        Ok(())
    }

    /// Reads the persistence file and rebuilds in-memory state and derived
    /// indices (spec §4.2). Non-fatal on missing/corrupt files.
    pub async fn load_now(&mut self) {
        let Some(path) = self.persistence_path() else {
            return;
        };
        let memories = persistence::load_now(&path, self.now()).await;
        self.memories.clear();
        self.by_kind.clear();
        self.by_context_key.clear();
        self.by_keyword.clear();
        let count = memories.len();
        for memory in memories {
            self.index_insert(&memory);
            self.memories.insert(memory.id.clone(), memory);
        }
        self.events.publish(EngineEvent::MemoriesLoaded { count });
    }

    /// Returns `true` if a debounced persist has been requested since the
    /// last `take_pending_persist()`.
    pub fn take_pending_persist(&self) -> bool {
        self.debounce.take()
    }

    pub async fn destroy(&mut self) -> EngineResult<()> {
        if self.config.persistence.enabled && self.config.persistence.save_on_destroy {
            self.save_now().await?;
        }
        self.memories.clear();
        self.by_kind.clear();
        self.by_context_key.clear();
        self.by_keyword.clear();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn build_memory_for_test(new: NewMemory) -> Memory {
    let now = Utc::now();
    let importance = new
        .importance
        .unwrap_or_else(|| importance::default_importance(new.kind, &new.content, &new.tags, &new.context));
    let mut memory = Memory {
        id: new.id,
        kind: new.kind,
        content: new.content,
        summary: new.summary,
        tags: new.tags,
        context: new.context,
        importance,
        expires_at: new.expires_at,
        metadata: new.metadata,
        created_at: now,
        updated_at: now,
        last_accessed_at: None,
        access_count: 0,
        consolidated_from: Vec::new(),
        consolidated_into: None,
        consolidated: false,
    };
    memory.clamp_importance();
    memory
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new(MemoryConfig::default(), EventBus::default())
    }

    #[test]
    fn store_idempotence() {
        let mut s = store();
        let stored_first = s
            .store(NewMemory::new("m1", MemoryKind::Semantic, "hello world"))
            .unwrap();
        let stored_second = s
            .store(NewMemory::new("m1", MemoryKind::Semantic, "hello world"))
            .unwrap();
        assert!(stored_first);
        assert!(!stored_second);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn index_consistency_across_lifecycle() {
        let mut s = store();
        s.store(NewMemory::new("m1", MemoryKind::Semantic, "alpha"))
            .unwrap();
        s.store(NewMemory::new("m2", MemoryKind::Episodic, "beta"))
            .unwrap();
        assert_eq!(s.get_by_kind(MemoryKind::Semantic).len(), 1);
        s.update(
            "m1",
            MemoryPatch {
                content: None,
                summary: None,
                tags: None,
                context: None,
                importance: None,
                expires_at: None,
                metadata: None,
            },
        )
        .unwrap();
        assert_eq!(s.get_by_kind(MemoryKind::Semantic).len(), 1);
        s.remove("m1").unwrap();
        assert_eq!(s.get_by_kind(MemoryKind::Semantic).len(), 0);
    }

    #[test]
    fn merge_conservation() {
        let mut s = store();
        s.store(
            NewMemory::new("a", MemoryKind::Semantic, "sunny weather today").with_importance(0.4),
        )
        .unwrap();
        s.store(
            NewMemory::new("b", MemoryKind::Semantic, "rain expected tomorrow").with_importance(0.5),
        )
        .unwrap();
        let a_created = s.peek("a").unwrap().created_at;
        let b_created = s.peek("b").unwrap().created_at;

        let merged_id = s
            .merge(
                &["a".to_string(), "b".to_string()],
                MergePatch {
                    content: None,
                    summary: Some("Merged: sunny day".to_string()),
                    importance: Some(0.6),
                },
            )
            .unwrap();

        assert!(merged_id.starts_with("merged_"));
        assert!(s.peek("a").is_none());
        assert!(s.peek("b").is_none());
        let merged = s.peek(&merged_id).unwrap();
        assert_eq!(merged.created_at, a_created.min(b_created));
        assert!((merged.importance - 0.6).abs() < 1e-6);
    }

    #[test]
    fn expiration_sweep_removes_expired() {
        use crate::scheduler::TestClock;
        let clock = Arc::new(TestClock::new(Utc::now()));
        let mut s = MemoryStore::with_clock(MemoryConfig::default(), EventBus::default(), clock.clone());
        let now = clock.now();
        s.store(NewMemory {
            id: "exp".to_string(),
            kind: MemoryKind::ShortTerm,
            content: "will expire".to_string(),
            summary: None,
            tags: IndexSet::new(),
            context: MemoryContext::default(),
            importance: None,
            expires_at: Some(now + chrono::Duration::seconds(1)),
            metadata: HashMap::new(),
        })
        .unwrap();
        clock.advance(chrono::Duration::seconds(2));
        let removed = s.cleanup_expired();
        assert_eq!(removed, 1);
        assert!(s.is_empty());
    }

    #[test]
    fn search_sorts_by_importance_descending() {
        let mut s = store();
        s.store(
            NewMemory::new("low", MemoryKind::Semantic, "low importance fact")
                .with_importance(0.1),
        )
        .unwrap();
        s.store(
            NewMemory::new("high", MemoryKind::Semantic, "high importance fact")
                .with_importance(0.9),
        )
        .unwrap();

        let results = s.search(&StoreQuery {
            sort: Some((SortField::Importance, SortDirection::Descending)),
            ..Default::default()
        });
        assert_eq!(results[0].id, "high");
        assert_eq!(results[1].id, "low");
    }
}
