//! `GraphLinker` — projects stored memories into the knowledge graph and
//! derives edges between them (spec §4.3).

use chrono::Utc;

use crate::events::EngineEvent;
use crate::graph::KnowledgeGraph;
use crate::model::{EdgeKind, KnowledgeEdge, KnowledgeNode, Memory, NodeKind};
use crate::store::MemoryStore;

const SIMILAR_LIMIT: usize = 5;
const SIMILAR_THRESHOLD: f32 = 0.7;

/// Lowercase, non-alphanumeric runs collapsed to a single `-`, trimmed
/// (spec §4.3 `slug()`).
pub fn slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_dash = false;
    for c in input.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

fn memory_node_id(memory_id: &str) -> String {
    format!("memory_{memory_id}")
}

/// Projects `MemoryStore` events into `KnowledgeGraph` mutations. Holds the
/// graph itself — ownership per spec §3: "KnowledgeGraph exclusively owns
/// nodes/edges" with the linker as the sole writer.
pub struct GraphLinker {
    graph: KnowledgeGraph,
}

impl GraphLinker {
    pub fn new() -> Self {
        Self {
            graph: KnowledgeGraph::new(),
        }
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut KnowledgeGraph {
        &mut self.graph
    }

    /// Dispatches one event. Similarity lookups for `memoryStored` need the
    /// originating store, passed explicitly rather than owned to avoid a
    /// circular dependency between `store` and `linker`.
    pub fn handle_event(&mut self, event: &EngineEvent, store: &MemoryStore) {
        match event {
            EngineEvent::MemoryStored { memory } => self.on_memory_stored(memory, store),
            EngineEvent::MemoryRemoved { id } => self.on_memory_removed(id),
            _ => {}
        }
    }

    fn upsert_node(&mut self, id: &str, kind: NodeKind, label: &str, counter_key: &str) -> bool {
        if let Some(node) = self.graph.get_node_mut(id) {
            node.bump_counter(counter_key, 1);
            node.updated_at = Utc::now();
            false
        } else {
            let node = KnowledgeNode::new(id, kind, label, Utc::now());
            self.graph.add_node(node).expect("id freshly checked absent");
            true
        }
    }

    fn upsert_edge(
        &mut self,
        id: String,
        source_id: &str,
        target_id: &str,
        kind: EdgeKind,
        relationship: &str,
        weight: f64,
    ) {
        if self.graph.get_edge(&id).is_some() {
            return;
        }
        let now = Utc::now();
        let edge = KnowledgeEdge {
            id,
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            kind,
            weight,
            relationship: relationship.to_string(),
            properties: Default::default(),
            created_at: now,
            updated_at: now,
        };
        // Endpoints are created just above in the caller, so this cannot
        // fail on a dangling reference; a duplicate id is already guarded.
        let _ = self.graph.add_edge(edge);
    }

    fn on_memory_stored(&mut self, memory: &Memory, store: &MemoryStore) {
        let memory_node = memory_node_id(&memory.id);
        let label: String = memory.content.chars().take(50).collect();
        let label = if memory.content.chars().count() > 50 {
            format!("{label}…")
        } else {
            label
        };
        self.upsert_node(&memory_node, NodeKind::Memory, &label, "memoryCount");

        for tag in &memory.tags {
            let concept_id = format!("concept_{}", slug(tag));
            self.upsert_node(&concept_id, NodeKind::Concept, tag, "relatedMemoryCount");
            self.upsert_edge(
                format!("{memory_node}__tagged_with__{concept_id}"),
                &memory_node,
                &concept_id,
                EdgeKind::RelatesTo,
                "tagged_with",
                1.0,
            );
        }

        if let Some(user_id) = &memory.context.user_id {
            let node_id = format!("user_{user_id}");
            self.upsert_node(&node_id, NodeKind::User, user_id, "relatedMemoryCount");
            self.upsert_edge(
                format!("{memory_node}__created_by__{node_id}"),
                &memory_node,
                &node_id,
                EdgeKind::BelongsTo,
                "created_by",
                0.8,
            );
        }
        if let Some(session_id) = &memory.context.session_id {
            let node_id = format!("session_{session_id}");
            self.upsert_node(&node_id, NodeKind::Session, session_id, "relatedMemoryCount");
            self.upsert_edge(
                format!("{memory_node}__occurred_in__{node_id}"),
                &memory_node,
                &node_id,
                EdgeKind::PartOf,
                "occurred_in",
                0.8,
            );
        }
        if let Some(domain) = &memory.context.domain {
            let node_id = format!("domain_{}", slug(domain));
            self.upsert_node(&node_id, NodeKind::Domain, domain, "relatedMemoryCount");
            self.upsert_edge(
                format!("{memory_node}__belongs_to_domain__{node_id}"),
                &memory_node,
                &node_id,
                EdgeKind::CategorizedAs,
                "belongs_to_domain",
                0.8,
            );
        }
        if let Some(task) = &memory.context.task {
            let node_id = format!("task_{}", slug(task));
            self.upsert_node(&node_id, NodeKind::Task, task, "relatedMemoryCount");
            self.upsert_edge(
                format!("{memory_node}__related_to__{node_id}"),
                &memory_node,
                &node_id,
                EdgeKind::RelatesTo,
                "related_to",
                0.8,
            );
        }

        let similar = store.get_related(&memory.id, SIMILAR_THRESHOLD, Some(SIMILAR_LIMIT));
        if let Ok(similar) = similar {
            for (other, score) in similar {
                let other_node = memory_node_id(&other.id);
                if self.graph.has_node(&other_node) {
                    self.upsert_edge(
                        format!("{memory_node}__similar_to__{other_node}"),
                        &memory_node,
                        &other_node,
                        EdgeKind::SimilarTo,
                        "similar_to",
                        score as f64,
                    );
                }
            }
        }
    }

    fn on_memory_removed(&mut self, memory_id: &str) {
        let node_id = memory_node_id(memory_id);
        self.graph.remove_node(&node_id);
    }
}

impl Default for GraphLinker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::events::EventBus;
    use crate::model::{MemoryContext, MemoryKind, NewMemory};

    #[test]
    fn slug_collapses_punctuation() {
        assert_eq!(slug("Rust Programming!!"), "rust-programming");
        assert_eq!(slug("  leading"), "leading");
    }

    #[test]
    fn memory_stored_projects_node_and_tag_edges() {
        let mut store = MemoryStore::new(MemoryConfig::default(), EventBus::default());
        let new = NewMemory::new("m1", MemoryKind::Semantic, "rust ownership basics")
            .with_tags(["rust".to_string(), "ownership".to_string()])
            .with_context(MemoryContext {
                domain: Some("engineering".to_string()),
                ..Default::default()
            });
        store.store(new).unwrap();
        let memory = store.peek("m1").unwrap().clone();

        let mut linker = GraphLinker::new();
        linker.on_memory_stored(&memory, &store);

        assert!(linker.graph().has_node("memory_m1"));
        assert!(linker.graph().has_node("concept_rust"));
        assert!(linker.graph().has_node("domain_engineering"));
        assert_eq!(linker.graph().get_neighbors("memory_m1").len(), 3);
    }

    #[test]
    fn memory_removed_cascades_edges() {
        let mut store = MemoryStore::new(MemoryConfig::default(), EventBus::default());
        store
            .store(NewMemory::new("m1", MemoryKind::Semantic, "alpha").with_tags(["x".to_string()]))
            .unwrap();
        let memory = store.peek("m1").unwrap().clone();
        let mut linker = GraphLinker::new();
        linker.on_memory_stored(&memory, &store);
        assert!(linker.graph().has_node("memory_m1"));

        linker.on_memory_removed("m1");
        assert!(!linker.graph().has_node("memory_m1"));
        assert_eq!(linker.graph().edge_count(), 0);
    }

    #[test]
    fn repeated_tag_upsert_increments_counter_without_duplicate_node() {
        let mut store = MemoryStore::new(MemoryConfig::default(), EventBus::default());
        store
            .store(NewMemory::new("m1", MemoryKind::Semantic, "alpha").with_tags(["rust".to_string()]))
            .unwrap();
        store
            .store(NewMemory::new("m2", MemoryKind::Semantic, "beta").with_tags(["rust".to_string()]))
            .unwrap();
        let mut linker = GraphLinker::new();
        let m1 = store.peek("m1").unwrap().clone();
        let m2 = store.peek("m2").unwrap().clone();
        linker.on_memory_stored(&m1, &store);
        linker.on_memory_stored(&m2, &store);

        assert_eq!(linker.graph().get_nodes_by_type(&NodeKind::Concept).len(), 1);
        let concept = linker.graph().get_node("concept_rust").unwrap();
        assert_eq!(concept.properties.get("relatedMemoryCount").and_then(|v| v.as_i64()), Some(1));
    }
}
