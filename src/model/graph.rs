//! Knowledge graph vertex/edge types (spec §3).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

/// Node kind. `Other` realizes the "open set" requirement from spec §3
/// without a dynamic type registry: known kinds round-trip as their plain
/// string, anything else is preserved verbatim rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Memory,
    Concept,
    User,
    Session,
    Domain,
    Task,
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Memory => "memory",
            NodeKind::Concept => "concept",
            NodeKind::User => "user",
            NodeKind::Session => "session",
            NodeKind::Domain => "domain",
            NodeKind::Task => "task",
            NodeKind::Other(s) => s,
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "memory" => NodeKind::Memory,
            "concept" => NodeKind::Concept,
            "user" => NodeKind::User,
            "session" => NodeKind::Session,
            "domain" => NodeKind::Domain,
            "task" => NodeKind::Task,
            other => NodeKind::Other(other.to_string()),
        }
    }
}

impl Serialize for NodeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer).map_err(D::Error::custom)?;
        Ok(NodeKind::from_str(&s))
    }
}

/// A vertex in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub label: String,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub tags: HashSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeNode {
    pub fn new(id: impl Into<String>, kind: NodeKind, label: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            properties: HashMap::new(),
            tags: HashSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Increment an integer property (e.g. `relatedMemoryCount`), used by
    /// the linker's upsert path (spec §4.3).
    pub fn bump_counter(&mut self, key: &str, by: i64) {
        let current = self
            .properties
            .get(key)
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        self.properties
            .insert(key.to_string(), serde_json::json!(current + by));
    }
}

/// A patch applied via `updateNode` (spec §4.1). A `Some(kind)` triggers
/// reindexing by type.
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    pub kind: Option<NodeKind>,
    pub label: Option<String>,
    pub properties: Option<HashMap<String, serde_json::Value>>,
    pub tags: Option<HashSet<String>>,
}

/// A directed, weighted relation between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    pub weight: f64,
    pub relationship: String,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The edge types named in spec §3, plus an open arm for forward
/// compatibility with the same open-set rationale as `NodeKind`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    RelatesTo,
    BelongsTo,
    PartOf,
    CategorizedAs,
    SimilarTo,
    Other(String),
}

impl EdgeKind {
    pub fn as_str(&self) -> &str {
        match self {
            EdgeKind::RelatesTo => "relates_to",
            EdgeKind::BelongsTo => "belongs_to",
            EdgeKind::PartOf => "part_of",
            EdgeKind::CategorizedAs => "categorized_as",
            EdgeKind::SimilarTo => "similar_to",
            EdgeKind::Other(s) => s,
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "relates_to" => EdgeKind::RelatesTo,
            "belongs_to" => EdgeKind::BelongsTo,
            "part_of" => EdgeKind::PartOf,
            "categorized_as" => EdgeKind::CategorizedAs,
            "similar_to" => EdgeKind::SimilarTo,
            other => EdgeKind::Other(other.to_string()),
        }
    }
}

impl Serialize for EdgeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EdgeKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer).map_err(serde::de::Error::custom)?;
        Ok(EdgeKind::from_str(&s))
    }
}

#[derive(Debug, Clone, Default)]
pub struct EdgePatch {
    pub weight: Option<f64>,
    pub relationship: Option<String>,
    pub properties: Option<HashMap<String, serde_json::Value>>,
}
