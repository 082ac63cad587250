//! `KnowledgeGraph` — typed node/edge container with indices by type and
//! adjacency (spec §4.1).

mod metrics;
mod search;
mod snapshot;

pub use metrics::GraphMetrics;
pub use search::{NodeSearchFilter, SortDirection};
pub use snapshot::GraphSnapshot;

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use indexmap::{IndexMap, IndexSet};

use crate::error::{EngineError, EngineResult};
use crate::model::{EdgeKind, EdgePatch, KnowledgeEdge, KnowledgeNode, NodeKind, NodePatch};

/// A path between two nodes. `length` is `nodes.len()`, not the edge count —
/// preserved from the source system per spec §9's open question.
#[derive(Debug, Clone)]
pub struct GraphPath {
    pub nodes: Vec<String>,
    pub edges: Vec<String>,
    pub length: usize,
}

/// A breadth-first subgraph rooted at one node.
#[derive(Debug, Clone)]
pub struct Subgraph {
    pub nodes: Vec<KnowledgeNode>,
    pub edges: Vec<KnowledgeEdge>,
}

/// The derived knowledge graph. Single-process, single-owner container —
/// no internal locking (spec §5).
#[derive(Default)]
pub struct KnowledgeGraph {
    nodes: IndexMap<String, KnowledgeNode>,
    edges: IndexMap<String, KnowledgeEdge>,
    by_type: HashMap<String, IndexSet<String>>,
    edges_by_type: HashMap<String, IndexSet<String>>,
    /// node id -> outgoing edge ids
    outgoing: HashMap<String, IndexSet<String>>,
    /// node id -> incoming edge ids
    incoming: HashMap<String, IndexSet<String>>,
    snapshots: Vec<GraphSnapshot>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn get_node(&self, id: &str) -> Option<&KnowledgeNode> {
        self.nodes.get(id)
    }

    pub fn get_node_mut(&mut self, id: &str) -> Option<&mut KnowledgeNode> {
        self.nodes.get_mut(id)
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get_edge(&self, id: &str) -> Option<&KnowledgeEdge> {
        self.edges.get(id)
    }

    /// Returns `true` iff the id was new; `DuplicateId` if it already
    /// existed (spec §4.1).
    pub fn add_node(&mut self, node: KnowledgeNode) -> EngineResult<bool> {
        if self.nodes.contains_key(&node.id) {
            return Err(EngineError::DuplicateId(node.id.clone()));
        }
        self.by_type
            .entry(node.kind.as_str().to_string())
            .or_default()
            .insert(node.id.clone());
        self.outgoing.entry(node.id.clone()).or_default();
        self.incoming.entry(node.id.clone()).or_default();
        self.nodes.insert(node.id.clone(), node);
        Ok(true)
    }

    /// Reindexes by type if `patch.kind` changes (spec §4.1).
    pub fn update_node(&mut self, id: &str, patch: NodePatch) -> EngineResult<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        let old_type_key = node.kind.as_str().to_string();
        let mut type_changed = false;

        if let Some(kind) = patch.kind {
            if kind.as_str() != node.kind.as_str() {
                type_changed = true;
            }
            node.kind = kind;
        }
        if let Some(label) = patch.label {
            node.label = label;
        }
        if let Some(properties) = patch.properties {
            node.properties = properties;
        }
        if let Some(tags) = patch.tags {
            node.tags = tags;
        }
        node.updated_at = Utc::now();

        if type_changed {
            let new_type_key = node.kind.as_str().to_string();
            if let Some(set) = self.by_type.get_mut(&old_type_key) {
                set.shift_remove(id);
            }
            self.by_type
                .entry(new_type_key)
                .or_default()
                .insert(id.to_string());
        }
        Ok(())
    }

    /// Removes the node and every incident edge. No-op (`false`) when
    /// absent (spec §4.1).
    pub fn remove_node(&mut self, id: &str) -> bool {
        let Some(node) = self.nodes.shift_remove(id) else {
            return false;
        };
        if let Some(set) = self.by_type.get_mut(node.kind.as_str()) {
            set.shift_remove(id);
        }
        let incident: Vec<String> = self
            .outgoing
            .get(id)
            .into_iter()
            .flatten()
            .chain(self.incoming.get(id).into_iter().flatten())
            .cloned()
            .collect();
        for edge_id in incident {
            self.remove_edge(&edge_id);
        }
        self.outgoing.remove(id);
        self.incoming.remove(id);
        true
    }

    /// Rejects if either endpoint is missing, or the edge id is a
    /// duplicate (spec §4.1). Self-loops and parallel edges are permitted.
    pub fn add_edge(&mut self, edge: KnowledgeEdge) -> EngineResult<()> {
        if self.edges.contains_key(&edge.id) {
            return Err(EngineError::DuplicateId(edge.id.clone()));
        }
        if !self.nodes.contains_key(&edge.source_id) {
            return Err(EngineError::DanglingEndpoint(edge.source_id.clone()));
        }
        if !self.nodes.contains_key(&edge.target_id) {
            return Err(EngineError::DanglingEndpoint(edge.target_id.clone()));
        }
        self.edges_by_type
            .entry(edge.kind.as_str().to_string())
            .or_default()
            .insert(edge.id.clone());
        self.outgoing
            .entry(edge.source_id.clone())
            .or_default()
            .insert(edge.id.clone());
        self.incoming
            .entry(edge.target_id.clone())
            .or_default()
            .insert(edge.id.clone());
        self.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    pub fn update_edge(&mut self, id: &str, patch: EdgePatch) -> EngineResult<()> {
        let edge = self
            .edges
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if let Some(weight) = patch.weight {
            edge.weight = weight;
        }
        if let Some(relationship) = patch.relationship {
            edge.relationship = relationship;
        }
        if let Some(properties) = patch.properties {
            edge.properties = properties;
        }
        edge.updated_at = Utc::now();
        Ok(())
    }

    pub fn remove_edge(&mut self, id: &str) -> bool {
        let Some(edge) = self.edges.shift_remove(id) else {
            return false;
        };
        if let Some(set) = self.edges_by_type.get_mut(edge.kind.as_str()) {
            set.shift_remove(id);
        }
        if let Some(set) = self.outgoing.get_mut(&edge.source_id) {
            set.shift_remove(id);
        }
        if let Some(set) = self.incoming.get_mut(&edge.target_id) {
            set.shift_remove(id);
        }
        true
    }

    pub fn get_nodes_by_type(&self, kind: &NodeKind) -> Vec<&KnowledgeNode> {
        self.by_type
            .get(kind.as_str())
            .into_iter()
            .flatten()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    pub fn get_edges_by_type(&self, kind: &EdgeKind) -> Vec<&KnowledgeEdge> {
        self.edges_by_type
            .get(kind.as_str())
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id))
            .collect()
    }

    /// Outgoing-edge neighbor node ids of `id`.
    pub fn get_neighbors(&self, id: &str) -> Vec<&KnowledgeNode> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|edge_id| self.edges.get(edge_id))
            .filter_map(|edge| self.nodes.get(&edge.target_id))
            .collect()
    }

    pub fn outgoing_edges(&self, id: &str) -> Vec<&KnowledgeEdge> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|edge_id| self.edges.get(edge_id))
            .collect()
    }

    pub fn incoming_edges(&self, id: &str) -> Vec<&KnowledgeEdge> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|edge_id| self.edges.get(edge_id))
            .collect()
    }

    /// All nodes reachable from `id`'s out-edges or in-edges.
    fn all_neighbor_ids(&self, id: &str) -> IndexSet<String> {
        let mut set = IndexSet::new();
        for edge_id in self.outgoing.get(id).into_iter().flatten() {
            if let Some(e) = self.edges.get(edge_id) {
                set.insert(e.target_id.clone());
            }
        }
        for edge_id in self.incoming.get(id).into_iter().flatten() {
            if let Some(e) = self.edges.get(edge_id) {
                set.insert(e.source_id.clone());
            }
        }
        set
    }

    /// Enumerate paths from `src` to `dst` up to `max_depth` hops, via DFS
    /// with an explicit `visited` set, sorted by length ascending (spec
    /// §4.1 algorithm note).
    pub fn find_paths(&self, src: &str, dst: &str, max_depth: usize) -> Vec<GraphPath> {
        let mut results = Vec::new();
        if !self.nodes.contains_key(src) || !self.nodes.contains_key(dst) {
            return results;
        }
        let mut visited = HashSet::new();
        let mut node_path = vec![src.to_string()];
        let mut edge_path = Vec::new();
        visited.insert(src.to_string());
        self.dfs_paths(
            src,
            dst,
            max_depth,
            &mut visited,
            &mut node_path,
            &mut edge_path,
            &mut results,
        );
        results.sort_by_key(|p| p.length);
        results
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs_paths(
        &self,
        current: &str,
        dst: &str,
        max_depth: usize,
        visited: &mut HashSet<String>,
        node_path: &mut Vec<String>,
        edge_path: &mut Vec<String>,
        results: &mut Vec<GraphPath>,
    ) {
        if current == dst && node_path.len() > 1 {
            results.push(GraphPath {
                nodes: node_path.clone(),
                edges: edge_path.clone(),
                length: node_path.len(),
            });
            return;
        }
        if node_path.len() > max_depth {
            return;
        }
        for edge_id in self.outgoing.get(current).into_iter().flatten() {
            let Some(edge) = self.edges.get(edge_id) else {
                continue;
            };
            if visited.contains(&edge.target_id) {
                continue;
            }
            visited.insert(edge.target_id.clone());
            node_path.push(edge.target_id.clone());
            edge_path.push(edge.id.clone());

            self.dfs_paths(
                &edge.target_id,
                dst,
                max_depth,
                visited,
                node_path,
                edge_path,
                results,
            );

            node_path.pop();
            edge_path.pop();
            visited.remove(&edge.target_id);
        }
    }

    /// BFS subgraph rooted at `id`, respecting `depth` (spec §4.1).
    pub fn get_subgraph(&self, id: &str, depth: usize) -> Subgraph {
        let mut visited_nodes: IndexSet<String> = IndexSet::new();
        let mut visited_edges: IndexSet<String> = IndexSet::new();
        if !self.nodes.contains_key(id) {
            return Subgraph {
                nodes: Vec::new(),
                edges: Vec::new(),
            };
        }
        let mut frontier = vec![id.to_string()];
        visited_nodes.insert(id.to_string());
        for _ in 0..depth {
            let mut next_frontier = Vec::new();
            for node_id in &frontier {
                for edge_id in self.outgoing.get(node_id).into_iter().flatten() {
                    if let Some(edge) = self.edges.get(edge_id) {
                        visited_edges.insert(edge.id.clone());
                        if visited_nodes.insert(edge.target_id.clone()) {
                            next_frontier.push(edge.target_id.clone());
                        }
                    }
                }
                for edge_id in self.incoming.get(node_id).into_iter().flatten() {
                    if let Some(edge) = self.edges.get(edge_id) {
                        visited_edges.insert(edge.id.clone());
                        if visited_nodes.insert(edge.source_id.clone()) {
                            next_frontier.push(edge.source_id.clone());
                        }
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }
        Subgraph {
            nodes: visited_nodes
                .iter()
                .filter_map(|n| self.nodes.get(n))
                .cloned()
                .collect(),
            edges: visited_edges
                .iter()
                .filter_map(|e| self.edges.get(e))
                .cloned()
                .collect(),
        }
    }

    /// Connected-component partition via iterative DFS over the undirected
    /// adjacency (treats edges as undirected for component purposes).
    pub fn connected_components(&self) -> Vec<Vec<String>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut components = Vec::new();
        for id in self.nodes.keys() {
            if seen.contains(id) {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![id.clone()];
            seen.insert(id.clone());
            while let Some(current) = stack.pop() {
                component.push(current.clone());
                for neighbor in self.all_neighbor_ids(&current) {
                    if seen.insert(neighbor.clone()) {
                        stack.push(neighbor);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    pub fn degree(&self, id: &str) -> usize {
        self.outgoing.get(id).map(|s| s.len()).unwrap_or(0)
            + self.incoming.get(id).map(|s| s.len()).unwrap_or(0)
    }

    pub fn metrics(&self) -> GraphMetrics {
        metrics::compute(self)
    }

    pub fn search_nodes(&self, filter: &NodeSearchFilter) -> Vec<&KnowledgeNode> {
        search::search(self, filter)
    }

    pub fn create_snapshot(&mut self, label: impl Into<String>) -> String {
        let snapshot = GraphSnapshot::capture(label, &self.nodes, &self.edges);
        let id = snapshot.id.clone();
        self.snapshots.push(snapshot);
        id
    }

    pub fn list_snapshots(&self) -> &[GraphSnapshot] {
        &self.snapshots
    }

    pub fn restore_snapshot(&mut self, id: &str) -> EngineResult<()> {
        let snapshot = self
            .snapshots
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let (nodes, edges) = snapshot.restore();
        *self = KnowledgeGraph::new();
        for node in nodes {
            self.add_node(node)?;
        }
        for edge in edges {
            self.add_edge(edge)?;
        }
        Ok(())
    }

    pub(crate) fn nodes_iter(&self) -> impl Iterator<Item = &KnowledgeNode> {
        self.nodes.values()
    }

    pub(crate) fn edges_iter(&self) -> impl Iterator<Item = &KnowledgeEdge> {
        self.edges.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, kind: NodeKind) -> KnowledgeNode {
        KnowledgeNode::new(id, kind, id, Utc::now())
    }

    fn edge(id: &str, src: &str, dst: &str, kind: EdgeKind) -> KnowledgeEdge {
        KnowledgeEdge {
            id: id.to_string(),
            source_id: src.to_string(),
            target_id: dst.to_string(),
            kind,
            weight: 1.0,
            relationship: "rel".to_string(),
            properties: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn add_node_rejects_duplicate() {
        let mut g = KnowledgeGraph::new();
        assert!(g.add_node(node("a", NodeKind::Memory)).unwrap());
        let err = g.add_node(node("a", NodeKind::Memory)).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateId(_)));
    }

    #[test]
    fn add_edge_rejects_dangling_endpoint() {
        let mut g = KnowledgeGraph::new();
        g.add_node(node("a", NodeKind::Memory)).unwrap();
        let err = g
            .add_edge(edge("e1", "a", "missing", EdgeKind::RelatesTo))
            .unwrap_err();
        assert!(matches!(err, EngineError::DanglingEndpoint(_)));
    }

    #[test]
    fn remove_node_cascades_to_edges() {
        let mut g = KnowledgeGraph::new();
        g.add_node(node("a", NodeKind::Memory)).unwrap();
        g.add_node(node("b", NodeKind::Concept)).unwrap();
        g.add_edge(edge("e1", "a", "b", EdgeKind::RelatesTo)).unwrap();
        assert!(g.remove_node("a"));
        assert!(g.get_edge("e1").is_none());
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn find_paths_length_is_node_count() {
        let mut g = KnowledgeGraph::new();
        for id in ["a", "b", "c"] {
            g.add_node(node(id, NodeKind::Concept)).unwrap();
        }
        g.add_edge(edge("e1", "a", "b", EdgeKind::RelatesTo)).unwrap();
        g.add_edge(edge("e2", "b", "c", EdgeKind::RelatesTo)).unwrap();
        let paths = g.find_paths("a", "c", 5);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].length, 3);
        assert_eq!(paths[0].edges.len(), 2);
    }

    #[test]
    fn referential_integrity_holds_after_removals() {
        let mut g = KnowledgeGraph::new();
        g.add_node(node("a", NodeKind::Memory)).unwrap();
        g.add_node(node("b", NodeKind::Concept)).unwrap();
        g.add_edge(edge("e1", "a", "b", EdgeKind::RelatesTo)).unwrap();
        g.remove_node("b");
        for e in g.edges_iter() {
            assert!(g.has_node(&e.source_id));
            assert!(g.has_node(&e.target_id));
        }
    }
}
