//! Graph snapshot create/list/restore (spec §4.1).

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

use crate::model::{KnowledgeEdge, KnowledgeNode};

#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    pub id: String,
    pub label: String,
    pub taken_at: DateTime<Utc>,
    nodes: Vec<KnowledgeNode>,
    edges: Vec<KnowledgeEdge>,
}

impl GraphSnapshot {
    pub fn capture(
        label: impl Into<String>,
        nodes: &IndexMap<String, KnowledgeNode>,
        edges: &IndexMap<String, KnowledgeEdge>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label: label.into(),
            taken_at: Utc::now(),
            nodes: nodes.values().cloned().collect(),
            edges: edges.values().cloned().collect(),
        }
    }

    pub fn restore(&self) -> (Vec<KnowledgeNode>, Vec<KnowledgeEdge>) {
        (self.nodes.clone(), self.edges.clone())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
