//! Integration coverage for the rule engine and the standalone knowledge
//! graph contract, independent of the facade.

use std::sync::{Arc, Mutex};

use ltm_engine::events::EventBus;
use ltm_engine::model::{
    Action, Condition, ConditionOperator, EdgeKind, KnowledgeEdge, KnowledgeNode, NodeKind, Rule,
};
use ltm_engine::rules::{ActionExecutor, RuleEngine};
use serde_json::json;

struct RecordingExecutor {
    calls: Arc<Mutex<Vec<String>>>,
}

impl ActionExecutor for RecordingExecutor {
    fn execute(
        &self,
        action: &Action,
        _event: &serde_json::Value,
        _context: &serde_json::Value,
    ) -> Result<(), String> {
        self.calls.lock().unwrap().push(action.action_type.clone());
        Ok(())
    }
}

fn edge(id: &str, source: &str, target: &str, kind: EdgeKind) -> KnowledgeEdge {
    let now = chrono::Utc::now();
    KnowledgeEdge {
        id: id.to_string(),
        source_id: source.to_string(),
        target_id: target.to_string(),
        kind,
        weight: 1.0,
        relationship: "relates_to".to_string(),
        properties: std::collections::HashMap::new(),
        created_at: now,
        updated_at: now,
    }
}

fn rule(id: &str, priority: i32, field: &str, op: ConditionOperator, value: serde_json::Value) -> Rule {
    Rule {
        id: id.to_string(),
        name: id.to_string(),
        category: "test".to_string(),
        priority,
        enabled: true,
        conditions: vec![Condition {
            field: field.to_string(),
            operator: op,
            value,
        }],
        actions: vec![Action {
            action_type: "log".to_string(),
            params: json!({}),
        }],
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    }
}

#[test]
fn higher_priority_rule_fires_before_lower_priority() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut engine = RuleEngine::new(EventBus::default());
    engine.register_action("log", Box::new(RecordingExecutor { calls: calls.clone() }));
    engine
        .add_rule(rule(
            "low",
            1,
            "event.kind",
            ConditionOperator::Eq,
            json!("memoryStored"),
        ))
        .unwrap();
    engine
        .add_rule(rule(
            "high",
            10,
            "event.kind",
            ConditionOperator::Eq,
            json!("memoryStored"),
        ))
        .unwrap();
    engine.start();

    let results = engine.process_event(&json!({"kind": "memoryStored"}), &json!({}));
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].rule_id, "high");
    assert_eq!(results[1].rule_id, "low");
    assert_eq!(*calls.lock().unwrap(), vec!["log".to_string(), "log".to_string()]);
}

#[test]
fn disabling_a_rule_excludes_it_from_processing() {
    let mut engine = RuleEngine::new(EventBus::default());
    engine.register_action("log", Box::new(RecordingExecutor { calls: Arc::new(Mutex::new(Vec::new())) }));
    engine
        .add_rule(rule("r1", 0, "event.kind", ConditionOperator::Eq, json!("x")))
        .unwrap();
    engine.disable_rule("r1").unwrap();
    engine.start();

    let results = engine.process_event(&json!({"kind": "x"}), &json!({}));
    assert!(results.is_empty());
}

#[test]
fn knowledge_graph_find_paths_and_subgraph() {
    let now = chrono::Utc::now();
    let mut graph = ltm_engine::graph::KnowledgeGraph::new();
    graph
        .add_node(KnowledgeNode::new("a", NodeKind::Memory, "A", now))
        .unwrap();
    graph
        .add_node(KnowledgeNode::new("b", NodeKind::Concept, "B", now))
        .unwrap();
    graph
        .add_node(KnowledgeNode::new("c", NodeKind::Concept, "C", now))
        .unwrap();
    graph
        .add_edge(edge("ab", "a", "b", EdgeKind::RelatesTo))
        .unwrap();
    graph
        .add_edge(edge("bc", "b", "c", EdgeKind::RelatesTo))
        .unwrap();

    let paths = graph.find_paths("a", "c", 5);
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].nodes, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    assert_eq!(paths[0].length, 3);

    let subgraph = graph.get_subgraph("a", 1);
    assert!(subgraph.nodes.iter().any(|n| n.id == "b"));
    assert!(!subgraph.nodes.iter().any(|n| n.id == "c"));
}

#[test]
fn removing_a_node_cascades_its_edges() {
    let now = chrono::Utc::now();
    let mut graph = ltm_engine::graph::KnowledgeGraph::new();
    graph
        .add_node(KnowledgeNode::new("a", NodeKind::Memory, "A", now))
        .unwrap();
    graph
        .add_node(KnowledgeNode::new("b", NodeKind::Concept, "B", now))
        .unwrap();
    graph
        .add_edge(edge("ab", "a", "b", EdgeKind::RelatesTo))
        .unwrap();

    assert!(graph.remove_node("a"));
    assert!(graph.get_edge("ab").is_none());
    assert_eq!(graph.edge_count(), 0);
}
