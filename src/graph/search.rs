//! `searchNodes` predicate/sort support (spec §4.1).

use chrono::{DateTime, Utc};

use crate::model::{KnowledgeNode, NodeKind};

use super::KnowledgeGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Label,
}

#[derive(Debug, Clone, Default)]
pub struct NodeSearchFilter {
    pub kind: Option<NodeKind>,
    pub tags: Vec<String>,
    pub property_equals: Vec<(String, serde_json::Value)>,
    pub text: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub sort: Option<(SortField, SortDirection)>,
    pub limit: Option<usize>,
}

pub fn search<'a>(graph: &'a KnowledgeGraph, filter: &NodeSearchFilter) -> Vec<&'a KnowledgeNode> {
    let mut matches: Vec<&KnowledgeNode> = graph
        .nodes_iter()
        .filter(|n| matches_filter(n, filter))
        .collect();

    if let Some((field, direction)) = filter.sort {
        matches.sort_by(|a, b| {
            let ordering = match field {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SortField::Label => a.label.cmp(&b.label),
            };
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
    }

    if let Some(limit) = filter.limit {
        matches.truncate(limit);
    }
    matches
}

fn matches_filter(node: &KnowledgeNode, filter: &NodeSearchFilter) -> bool {
    if let Some(kind) = &filter.kind {
        if node.kind.as_str() != kind.as_str() {
            return false;
        }
    }
    if !filter.tags.is_empty() && !filter.tags.iter().any(|t| node.tags.contains(t)) {
        return false;
    }
    for (key, expected) in &filter.property_equals {
        match node.properties.get(key) {
            Some(actual) if actual == expected => {}
            _ => return false,
        }
    }
    if let Some(text) = &filter.text {
        let needle = text.to_lowercase();
        if !node.label.to_lowercase().contains(&needle) {
            return false;
        }
    }
    if let Some(after) = filter.created_after {
        if node.created_at < after {
            return false;
        }
    }
    if let Some(before) = filter.created_before {
        if node.created_at > before {
            return false;
        }
    }
    true
}
