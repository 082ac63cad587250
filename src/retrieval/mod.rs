//! `Retriever` — pluggable strategy composition, caching, confidence
//! scoring (spec §4.4).

mod cache;
pub mod strategies;

use std::sync::Arc;

use chrono::Utc;

use crate::config::RetrievalConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::graph::KnowledgeGraph;
use crate::model::{KnowledgeNode, Memory, RetrievalQuery, RetrievalResult};
use crate::scheduler::{Clock, SystemClock};
use crate::store::{MemoryStore, StoreQuery};
use cache::RetrievalCache;
use strategies::{
    ContextMatchStrategy, ImportanceStrategy, RetrievalStrategy, TemporalRelevanceStrategy,
    TextSimilarityStrategy,
};

/// A registered strategy plus its composition weight.
struct Registered {
    strategy: Box<dyn RetrievalStrategy>,
    weight: f32,
}

pub struct Retriever {
    strategies: Vec<Registered>,
    cache: RetrievalCache,
    config: RetrievalConfig,
    events: EventBus,
    clock: Arc<dyn Clock>,
}

impl Retriever {
    pub fn new(config: RetrievalConfig, events: EventBus) -> Self {
        Self::with_clock(config, events, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RetrievalConfig, events: EventBus, clock: Arc<dyn Clock>) -> Self {
        let mut retriever = Self {
            strategies: Vec::new(),
            cache: RetrievalCache::new(),
            config,
            events,
            clock,
        };
        retriever.add_strategy(Box::new(TextSimilarityStrategy), 1.0);
        retriever.add_strategy(Box::new(ContextMatchStrategy), 1.0);
        retriever.add_strategy(Box::new(TemporalRelevanceStrategy::new()), 0.5);
        retriever.add_strategy(Box::new(ImportanceStrategy), 0.5);
        retriever
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn RetrievalStrategy>, weight: f32) {
        self.strategies.retain(|r| r.strategy.name() != strategy.name());
        self.strategies.push(Registered { strategy, weight });
    }

    pub fn remove_strategy(&mut self, name: &str) {
        self.strategies.retain(|r| r.strategy.name() != name);
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.events.publish(EngineEvent::CacheCleared);
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn retrieve(
        &mut self,
        query: &RetrievalQuery,
        store: &mut MemoryStore,
        graph: &KnowledgeGraph,
    ) -> EngineResult<RetrievalResult> {
        if !(0.0..=1.0).contains(&query.min_confidence) {
            return Err(EngineError::InvalidQuery(
                "minConfidence must be in [0, 1]".to_string(),
            ));
        }

        let fingerprint = query.fingerprint();
        let now = self.clock.now();
        if let Some(cached) = self.cache.get(&fingerprint, now) {
            self.events.publish(EngineEvent::CacheHit { fingerprint });
            return Ok(cached);
        }

        let candidates = store.search(&StoreQuery {
            kind: query.kind,
            tags_any: query.tags.clone(),
            limit: None,
            ..Default::default()
        });

        let mut scored: Vec<(Memory, f32, f32)> = Vec::with_capacity(candidates.len());
        for memory in candidates {
            let mut weighted_score = 0.0f32;
            let mut weighted_confidence = 0.0f32;
            let mut total_weight = 0.0f32;
            for registered in &self.strategies {
                if let Some((score, confidence)) = registered.strategy.evaluate(query, &memory) {
                    weighted_score += registered.weight * score;
                    weighted_confidence += registered.weight * confidence;
                    total_weight += registered.weight;
                }
            }
            if total_weight > 0.0 {
                scored.push((memory, weighted_score, weighted_confidence / total_weight));
            }
        }

        scored.retain(|(_, _, confidence)| *confidence >= query.min_confidence);
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(query.limit);

        let confidence = if scored.is_empty() {
            0.0
        } else {
            scored.iter().map(|(_, _, c)| c).sum::<f32>() / scored.len() as f32
        };

        let memories: Vec<Memory> = scored.into_iter().map(|(m, _, _)| m).collect();
        let related_nodes = if query.include_related {
            self.collect_related(&memories, graph)
        } else {
            Vec::new()
        };

        let result = RetrievalResult {
            total_results: memories.len(),
            memories,
            related_nodes,
            confidence,
        };

        self.cache
            .put(fingerprint, result.clone(), self.config.cache_ttl_ms, now);
        Ok(result)
    }

    fn collect_related(&self, memories: &[Memory], graph: &KnowledgeGraph) -> Vec<KnowledgeNode> {
        let result_memory_node_ids: std::collections::HashSet<String> =
            memories.iter().map(|m| format!("memory_{}", m.id)).collect();

        let mut seen = std::collections::HashSet::new();
        let mut related = Vec::new();
        for memory in memories {
            let node_id = format!("memory_{}", memory.id);
            for neighbor in graph.get_neighbors(&node_id) {
                if result_memory_node_ids.contains(&neighbor.id) {
                    continue;
                }
                if seen.insert(neighbor.id.clone()) {
                    related.push(neighbor.clone());
                }
            }
        }
        related
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::model::{MemoryKind, NewMemory};

    fn setup() -> (MemoryStore, KnowledgeGraph) {
        let mut store = MemoryStore::new(MemoryConfig::default(), EventBus::default());
        store
            .store(NewMemory::new("a", MemoryKind::Semantic, "rust ownership and borrowing"))
            .unwrap();
        store
            .store(NewMemory::new("b", MemoryKind::Semantic, "python list comprehensions"))
            .unwrap();
        (store, KnowledgeGraph::new())
    }

    #[test]
    fn retrieve_ranks_by_text_similarity() {
        let (mut store, graph) = setup();
        let mut retriever = Retriever::new(RetrievalConfig::default(), EventBus::default());
        let mut query = RetrievalQuery::new();
        query.text = Some("rust borrowing rules".to_string());
        let result = retriever.retrieve(&query, &mut store, &graph).unwrap();
        assert_eq!(result.memories[0].id, "a");
    }

    #[test]
    fn empty_query_still_yields_well_formed_result() {
        let (mut store, graph) = setup();
        let mut retriever = Retriever::new(RetrievalConfig::default(), EventBus::default());
        let mut query = RetrievalQuery::new();
        query.limit = 0;
        let result = retriever.retrieve(&query, &mut store, &graph).unwrap();
        assert_eq!(result.total_results, 0);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn second_identical_query_hits_cache() {
        let (mut store, graph) = setup();
        let mut retriever = Retriever::new(RetrievalConfig::default(), EventBus::default());
        let mut events = retriever.events.subscribe();
        let query = RetrievalQuery::new();
        retriever.retrieve(&query, &mut store, &graph).unwrap();
        retriever.retrieve(&query, &mut store, &graph).unwrap();
        assert_eq!(retriever.cache_len(), 1);
        let mut saw_cache_hit = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, EngineEvent::CacheHit { .. }) {
                saw_cache_hit = true;
            }
        }
        assert!(saw_cache_hit);
    }

    #[test]
    fn min_confidence_floors_the_result_set() {
        let (mut store, graph) = setup();
        let mut retriever = Retriever::new(RetrievalConfig::default(), EventBus::default());
        let mut query = RetrievalQuery::new();
        query.text = Some("rust borrowing rules".to_string());
        query.min_confidence = 0.99;
        let result = retriever.retrieve(&query, &mut store, &graph).unwrap();
        assert!(result.memories.is_empty(), "no candidate should clear a near-1.0 floor");
    }

    #[test]
    fn invalid_min_confidence_is_rejected() {
        let (mut store, graph) = setup();
        let mut retriever = Retriever::new(RetrievalConfig::default(), EventBus::default());
        let mut query = RetrievalQuery::new();
        query.min_confidence = 1.5;
        let err = retriever.retrieve(&query, &mut store, &graph).unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuery(_)));
    }
}
