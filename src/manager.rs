//! `RetrievalManager` — facade over retrieval plus agent enhancement
//! (spec §4.6).

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::config::RetrievalConfig;
use crate::error::EngineResult;
use crate::events::EventBus;
use crate::graph::KnowledgeGraph;
use crate::model::{
    Agent, AgentStatus, EnhancementContext, EnhancementOutcome, Memory, MemoryKind, RetrievalQuery,
    RetrievalResult,
};
use crate::retrieval::Retriever;
use crate::store::MemoryStore;

/// One retrieval's entry in the learning history (spec §4.6).
#[derive(Debug, Clone)]
pub struct LearningRecord {
    pub query_fingerprint: String,
    pub result_count: usize,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

/// A cluster summary returned by `getLearningPatterns()` — grouped by
/// query fingerprint, since that is the only stable grouping key the spec
/// names (spec §4.6).
#[derive(Debug, Clone)]
pub struct LearningPatternSummary {
    pub query_fingerprint: String,
    pub occurrences: usize,
    pub avg_result_count: f32,
    pub avg_confidence: f32,
}

#[derive(Debug, Clone, Default)]
pub struct DetailedStats {
    pub total_queries: u64,
    pub queue_size: usize,
    pub avg_confidence: f32,
}

pub struct RetrievalManager {
    retriever: Retriever,
    total_queries: u64,
    history: Vec<LearningRecord>,
    queue: VecDeque<(Agent, EnhancementContext)>,
    baselines: HashMap<String, serde_json::Value>,
}

impl RetrievalManager {
    pub fn new(config: RetrievalConfig, events: EventBus) -> Self {
        Self {
            retriever: Retriever::new(config, events),
            total_queries: 0,
            history: Vec::new(),
            queue: VecDeque::new(),
            baselines: HashMap::new(),
        }
    }

    pub fn retriever_mut(&mut self) -> &mut Retriever {
        &mut self.retriever
    }

    pub fn retrieve_memories(
        &mut self,
        query: &RetrievalQuery,
        store: &mut MemoryStore,
        graph: &KnowledgeGraph,
    ) -> EngineResult<RetrievalResult> {
        let result = self.retriever.retrieve(query, store, graph)?;
        self.total_queries += 1;
        self.history.push(LearningRecord {
            query_fingerprint: query.fingerprint(),
            result_count: result.memories.len(),
            confidence: result.confidence,
            timestamp: Utc::now(),
        });
        Ok(result)
    }

    /// Builds a query from `context.currentTask`/`context.domain`, runs
    /// retrieval, and buckets matches onto a fresh copy of `agent` by
    /// memory kind. Pure over its inputs: the caller's `agent` is never
    /// mutated (spec §4.6).
    pub fn enhance_agent(
        &mut self,
        agent: &Agent,
        context: &EnhancementContext,
        store: &mut MemoryStore,
        graph: &KnowledgeGraph,
    ) -> EngineResult<EnhancementOutcome> {
        let mut query = RetrievalQuery::new();
        query.text = context.current_task.clone();
        if let Some(task) = &context.current_task {
            query.context.insert("task".to_string(), serde_json::json!(task));
        }
        if let Some(domain) = &context.domain {
            query.context.insert("domain".to_string(), serde_json::json!(domain));
        }

        let result = self.retrieve_memories(&query, store, graph)?;

        let mut enhanced = agent.clone();
        let mut applied_memories = Vec::with_capacity(result.memories.len());
        for memory in &result.memories {
            applied_memories.push(memory.id.clone());
            bucket_for(&mut enhanced, memory);
        }
        enhanced.status = AgentStatus::Enhanced;

        let match_count = result.memories.len() as f32;
        let saturation = match_count / (match_count + 1.0);
        let performance_improvement = (saturation * result.confidence).min(0.999);

        Ok(EnhancementOutcome {
            enhanced_agent: enhanced,
            applied_memories,
            performance_improvement,
            success: true,
        })
    }

    /// Enqueues an enhancement request without running it (spec §4.6,
    /// `enhanceAgentAsync`'s FIFO queue).
    pub fn enqueue_enhance_agent(&mut self, agent: Agent, context: EnhancementContext) {
        self.queue.push_back((agent, context));
    }

    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }

    /// Drains the enhancement queue strictly in FIFO order, running each
    /// request the same way `enhance_agent` does.
    pub async fn drain_enhancement_queue(
        &mut self,
        store: &mut MemoryStore,
        graph: &KnowledgeGraph,
    ) -> Vec<EngineResult<EnhancementOutcome>> {
        let mut outcomes = Vec::with_capacity(self.queue.len());
        while let Some((agent, context)) = self.queue.pop_front() {
            outcomes.push(self.enhance_agent(&agent, &context, store, graph));
        }
        outcomes
    }

    /// Groups learning history by query fingerprint (spec §4.6
    /// `getLearningPatterns`).
    pub fn learning_patterns(&self) -> Vec<LearningPatternSummary> {
        let mut grouped: HashMap<String, Vec<&LearningRecord>> = HashMap::new();
        for record in &self.history {
            grouped.entry(record.query_fingerprint.clone()).or_default().push(record);
        }
        let mut summaries: Vec<LearningPatternSummary> = grouped
            .into_iter()
            .map(|(fingerprint, records)| {
                let n = records.len() as f32;
                LearningPatternSummary {
                    query_fingerprint: fingerprint,
                    occurrences: records.len(),
                    avg_result_count: records.iter().map(|r| r.result_count as f32).sum::<f32>() / n,
                    avg_confidence: records.iter().map(|r| r.confidence).sum::<f32>() / n,
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
        summaries
    }

    pub fn set_performance_baseline(&mut self, agent_id: impl Into<String>, metrics: serde_json::Value) {
        self.baselines.insert(agent_id.into(), metrics);
    }

    pub fn performance_baseline(&self, agent_id: &str) -> Option<&serde_json::Value> {
        self.baselines.get(agent_id)
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn get_detailed_stats(&self) -> DetailedStats {
        let avg_confidence = if self.history.is_empty() {
            0.0
        } else {
            self.history.iter().map(|r| r.confidence).sum::<f32>() / self.history.len() as f32
        };
        DetailedStats {
            total_queries: self.total_queries,
            queue_size: self.queue.len(),
            avg_confidence,
        }
    }

    pub fn destroy(&mut self) {
        self.queue.clear();
        self.history.clear();
        self.retriever.clear_cache();
    }
}

fn bucket_for(agent: &mut Agent, memory: &Memory) {
    match memory.kind {
        MemoryKind::Episodic => agent.episodic.push(memory.clone()),
        MemoryKind::Procedural => agent.procedural.push(memory.clone()),
        _ => agent.semantic.push(memory.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::model::NewMemory;

    fn setup() -> (MemoryStore, KnowledgeGraph, RetrievalManager) {
        let events = EventBus::default();
        let mut store = MemoryStore::new(MemoryConfig::default(), events.clone());
        store
            .store(NewMemory::new("m1", MemoryKind::Episodic, "deployed the service yesterday"))
            .unwrap();
        let manager = RetrievalManager::new(RetrievalConfig::default(), events);
        (store, KnowledgeGraph::new(), manager)
    }

    #[test]
    fn enhance_agent_does_not_mutate_input() {
        let (mut store, graph, mut manager) = setup();
        let agent = Agent::new("a1");
        let ctx = EnhancementContext {
            current_task: Some("deployed the service".to_string()),
            domain: None,
        };
        let outcome = manager.enhance_agent(&agent, &ctx, &mut store, &graph).unwrap();
        assert_eq!(agent.status, AgentStatus::Idle);
        assert!(agent.episodic.is_empty());
        assert_eq!(outcome.enhanced_agent.status, AgentStatus::Enhanced);
        assert!(outcome.success);
        assert!(outcome.performance_improvement < 1.0);
    }

    #[tokio::test]
    async fn enhancement_queue_drains_fifo() {
        let (mut store, graph, mut manager) = setup();
        manager.enqueue_enhance_agent(Agent::new("a1"), EnhancementContext::default());
        manager.enqueue_enhance_agent(Agent::new("a2"), EnhancementContext::default());
        assert_eq!(manager.queue_size(), 2);
        let outcomes = manager.drain_enhancement_queue(&mut store, &graph).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].as_ref().unwrap().enhanced_agent.id, "a1");
        assert_eq!(outcomes[1].as_ref().unwrap().enhanced_agent.id, "a2");
        assert_eq!(manager.queue_size(), 0);
    }

    #[test]
    fn learning_patterns_group_by_fingerprint() {
        let (mut store, graph, mut manager) = setup();
        let query = RetrievalQuery::new();
        manager.retrieve_memories(&query, &mut store, &graph).unwrap();
        manager.retriever_mut().clear_cache();
        manager.retrieve_memories(&query, &mut store, &graph).unwrap();
        let patterns = manager.learning_patterns();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].occurrences, 2);
    }
}
