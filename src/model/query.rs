//! Retrieval query/result types (spec §3, §4.4).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::graph::KnowledgeNode;
use super::memory::{Memory, MemoryKind};

/// The input to the retriever.
#[derive(Debug, Clone, Default)]
pub struct RetrievalQuery {
    pub text: Option<String>,
    pub kind: Option<MemoryKind>,
    pub tags: Vec<String>,
    pub context: HashMap<String, serde_json::Value>,
    pub limit: usize,
    pub include_related: bool,
    pub min_confidence: f32,
}

impl RetrievalQuery {
    pub fn new() -> Self {
        Self {
            limit: 10,
            ..Default::default()
        }
    }

    /// A stable fingerprint used as the retrieval cache key: a
    /// deterministically-serialized form of the query with sorted keys
    /// (spec §4.4, Glossary "Fingerprint").
    pub fn fingerprint(&self) -> String {
        let mut context_keys: Vec<_> = self.context.keys().cloned().collect();
        context_keys.sort();
        let context_str: Vec<String> = context_keys
            .iter()
            .map(|k| format!("{k}={}", self.context[k]))
            .collect();
        let mut tags = self.tags.clone();
        tags.sort();
        format!(
            "text={:?}|kind={:?}|tags={:?}|ctx={:?}|limit={}|related={}|minconf={}",
            self.text,
            self.kind.map(|k| k.as_str()),
            tags,
            context_str,
            self.limit,
            self.include_related,
            self.min_confidence
        )
    }
}

/// The output of a retrieval call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub memories: Vec<Memory>,
    pub related_nodes: Vec<KnowledgeNode>,
    pub total_results: usize,
    pub confidence: f32,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self {
            memories: Vec::new(),
            related_nodes: Vec::new(),
            total_results: 0,
            confidence: 0.0,
        }
    }
}
