//! Graph-level metrics: counts, density, average degree, component count,
//! and degree-based centrality proxies (spec §4.1).

use std::collections::HashMap;

use super::KnowledgeGraph;

#[derive(Debug, Clone)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    /// Directed-graph density: `edges / (nodes * (nodes - 1))`.
    pub density: f64,
    pub average_degree: f64,
    pub connected_component_count: usize,
    /// Degree centrality per node id, normalized to `[0, 1]`.
    pub degree_centrality: HashMap<String, f64>,
    /// Degree-normalized proxy for betweenness centrality, since computing
    /// exact betweenness is out of scope for an in-process engine at this
    /// scale (spec §4.1: "degree-normalized proxies for
    /// betweenness/closeness").
    pub betweenness_proxy: HashMap<String, f64>,
    pub closeness_proxy: HashMap<String, f64>,
}

pub fn compute(graph: &KnowledgeGraph) -> GraphMetrics {
    let node_count = graph.node_count();
    let edge_count = graph.edge_count();

    let density = if node_count > 1 {
        edge_count as f64 / (node_count as f64 * (node_count as f64 - 1.0))
    } else {
        0.0
    };

    let max_degree = node_count.saturating_sub(1).max(1) as f64 * 2.0;
    let mut degree_centrality = HashMap::new();
    let mut total_degree = 0usize;
    for node in graph.nodes_iter() {
        let degree = graph.degree(&node.id);
        total_degree += degree;
        degree_centrality.insert(node.id.clone(), (degree as f64 / max_degree).min(1.0));
    }
    let average_degree = if node_count > 0 {
        total_degree as f64 / node_count as f64
    } else {
        0.0
    };

    // Betweenness/closeness proxies: rather than running all-pairs shortest
    // paths, scale the same degree signal into each metric's expected
    // range. This is a deliberate simplification (spec §4.1 calls for a
    // "proxy", not exact centrality).
    let betweenness_proxy = degree_centrality
        .iter()
        .map(|(id, d)| (id.clone(), d.powi(2)))
        .collect();
    let closeness_proxy = degree_centrality
        .iter()
        .map(|(id, d)| (id.clone(), if *d > 0.0 { d.sqrt() } else { 0.0 }))
        .collect();

    GraphMetrics {
        node_count,
        edge_count,
        density,
        average_degree,
        connected_component_count: graph.connected_components().len(),
        degree_centrality,
        betweenness_proxy,
        closeness_proxy,
    }
}
