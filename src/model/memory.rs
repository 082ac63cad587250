//! The `Memory` record and its supporting types (spec §3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// The seven recognized memory kinds. Unlike `NodeKind` in the graph model,
/// this set is closed — the spec does not ask for an open extension here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    ShortTerm,
    LongTerm,
    Working,
    Episodic,
    Semantic,
    Procedural,
    Consolidated,
}

impl MemoryKind {
    /// Base importance contribution used by the default-importance rubric
    /// (spec §4.2): 0.05-0.3 depending on kind.
    pub fn importance_weight(self) -> f32 {
        match self {
            MemoryKind::ShortTerm => 0.05,
            MemoryKind::Working => 0.10,
            MemoryKind::Episodic => 0.15,
            MemoryKind::Semantic => 0.20,
            MemoryKind::Procedural => 0.25,
            MemoryKind::LongTerm => 0.25,
            MemoryKind::Consolidated => 0.30,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MemoryKind::ShortTerm => "short_term",
            MemoryKind::LongTerm => "long_term",
            MemoryKind::Working => "working",
            MemoryKind::Episodic => "episodic",
            MemoryKind::Semantic => "semantic",
            MemoryKind::Procedural => "procedural",
            MemoryKind::Consolidated => "consolidated",
        }
    }
}

/// Structured provenance for a memory: known keys plus an open `extras` bag
/// (spec §9 design note on dynamic context maps).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryContext {
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<String>,
    #[serde(
        rename = "sessionId",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub task: Option<String>,
    /// Arbitrary additional context keys, flattened into the wire object
    /// alongside the known keys above.
    #[serde(flatten)]
    pub extras: HashMap<String, serde_json::Value>,
}

impl MemoryContext {
    /// Looks up a context value by key, covering both the known fields and
    /// the open `extras` bag uniformly (used by context-equality matching
    /// in `MemoryStore::search` and the `contextMatch` retrieval strategy).
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        match key {
            "userId" => self.user_id.as_deref().map(serde_json::Value::from),
            "sessionId" => self.session_id.as_deref().map(serde_json::Value::from),
            "domain" => self.domain.as_deref().map(serde_json::Value::from),
            "task" => self.task.as_deref().map(serde_json::Value::from),
            other => self.extras.get(other).cloned(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none()
            && self.session_id.is_none()
            && self.domain.is_none()
            && self.task.is_none()
            && self.extras.is_empty()
    }

    /// Number of populated fields, used by the importance rubric's
    /// "context richness" term.
    pub fn richness(&self) -> usize {
        [
            self.user_id.is_some(),
            self.session_id.is_some(),
            self.domain.is_some(),
            self.task.is_some(),
        ]
        .iter()
        .filter(|x| **x)
        .count()
            + self.extras.len()
    }

    /// Merge two contexts per `merge()`'s first-writer-wins-per-key rule
    /// (spec §4.2), unioning array-valued extras.
    pub fn merge_first_writer_wins(&self, other: &MemoryContext) -> MemoryContext {
        let mut merged = self.clone();
        if merged.user_id.is_none() {
            merged.user_id = other.user_id.clone();
        }
        if merged.session_id.is_none() {
            merged.session_id = other.session_id.clone();
        }
        if merged.domain.is_none() {
            merged.domain = other.domain.clone();
        }
        if merged.task.is_none() {
            merged.task = other.task.clone();
        }
        for (k, v) in &other.extras {
            match merged.extras.get(k) {
                None => {
                    merged.extras.insert(k.clone(), v.clone());
                }
                Some(existing) => {
                    if let (Some(a), Some(b)) = (existing.as_array(), v.as_array()) {
                        let mut unioned = a.clone();
                        for item in b {
                            if !unioned.contains(item) {
                                unioned.push(item.clone());
                            }
                        }
                        merged.extras.insert(k.clone(), serde_json::Value::Array(unioned));
                    }
                    // scalar collision: first writer (self) wins, no-op
                }
            }
        }
        merged
    }
}

/// A discrete, addressable record of information held by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: IndexSet<String>,
    #[serde(default)]
    pub context: MemoryContext,
    pub importance: f32,
    #[serde(rename = "expiresAt", skip_serializing_if = "Option::is_none", default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(
        rename = "lastAccessedAt",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub last_accessed_at: Option<DateTime<Utc>>,
    #[serde(rename = "accessCount", default)]
    pub access_count: u64,
    #[serde(rename = "consolidatedFrom", default, skip_serializing_if = "Vec::is_empty")]
    pub consolidated_from: Vec<String>,
    #[serde(
        rename = "consolidatedInto",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub consolidated_into: Option<String>,
    #[serde(default)]
    pub consolidated: bool,
}

impl Memory {
    /// Clamp importance into [0, 1]. Called whenever importance is set or
    /// recomputed (spec §3 invariant).
    pub fn clamp_importance(&mut self) {
        self.importance = self.importance.clamp(0.0, 1.0);
    }

    pub fn touch_access(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = Some(now);
        self.access_count += 1;
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }
}

/// A request to create a new memory. Distinct from `Memory` because several
/// fields (timestamps, access stats) are store-managed, not caller-supplied.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub id: String,
    pub kind: MemoryKind,
    pub content: String,
    pub summary: Option<String>,
    pub tags: IndexSet<String>,
    pub context: MemoryContext,
    pub importance: Option<f32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl NewMemory {
    pub fn new(id: impl Into<String>, kind: MemoryKind, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            content: content.into(),
            summary: None,
            tags: IndexSet::new(),
            context: MemoryContext::default(),
            importance: None,
            expires_at: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    pub fn with_context(mut self, context: MemoryContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// A partial update to an existing memory (`update(id, patch)`, spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub summary: Option<Option<String>>,
    pub tags: Option<IndexSet<String>>,
    pub context: Option<MemoryContext>,
    pub importance: Option<f32>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl MemoryPatch {
    /// True if this patch touches content, context, or tags — the fields
    /// that trigger importance recomputation on `update()` (spec §4.2).
    pub fn touches_importance_inputs(&self) -> bool {
        self.content.is_some() || self.context.is_some() || self.tags.is_some()
    }
}
