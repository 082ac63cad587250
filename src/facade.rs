//! `SystemFacade` — lifecycle owner wiring every subsystem together
//! (spec §4.7).

use tokio::sync::broadcast;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::linker::GraphLinker;
use crate::manager::RetrievalManager;
use crate::model::{
    Agent, EnhancementContext, EnhancementOutcome, Memory, MemoryPatch, NewMemory, RetrievalQuery,
    RetrievalResult,
};
use crate::observability::{self, PerformanceMonitor};
use crate::rules::RuleEngine;
use crate::scheduler::IntervalTimer;
use crate::store::{MemoryStore, MergePatch};

#[derive(Debug, Clone, Default)]
pub struct SystemStats {
    pub memory_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub rule_count: usize,
    pub total_queries: u64,
    pub queue_size: usize,
    pub avg_confidence: f32,
    pub operation_count: u64,
    pub error_count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Owns every subsystem and wires store events into the linker and cache
/// invalidation (spec §4.7, §5). `initialize`/`destroy` run subsystems in
/// dependency order and its reverse, respectively.
pub struct SystemFacade {
    config: EngineConfig,
    events: EventBus,
    event_rx: broadcast::Receiver<EngineEvent>,
    store: MemoryStore,
    linker: GraphLinker,
    retrieval_manager: RetrievalManager,
    rules: RuleEngine,
    monitor: PerformanceMonitor,
    initialized: bool,
    cleanup_timer: Option<IntervalTimer>,
    autosave_timer: Option<IntervalTimer>,
}

impl SystemFacade {
    pub fn new(config: EngineConfig) -> Self {
        let events = EventBus::default();
        let event_rx = events.subscribe();
        let store = MemoryStore::new(config.memory.clone(), events.clone());
        let retrieval_manager = RetrievalManager::new(config.retrieval.clone(), events.clone());
        let rules = RuleEngine::new(events.clone());
        Self {
            config,
            events,
            event_rx,
            store,
            linker: GraphLinker::new(),
            retrieval_manager,
            rules,
            monitor: PerformanceMonitor::new(),
            initialized: false,
            cleanup_timer: None,
            autosave_timer: None,
        }
    }

    /// Constructs subsystems (already done by `new`), loads persistence,
    /// projects any loaded memories into the graph, and starts the rule
    /// engine. The second and later calls are a no-op (spec §4.7).
    pub async fn initialize(&mut self) -> EngineResult<()> {
        if self.initialized {
            return Ok(());
        }
        if self.config.memory.persistence.enabled {
            self.store.load_now().await;
            if self.config.features.knowledge_graph {
                let loaded: Vec<_> = self.store.all().cloned().collect();
                for memory in loaded {
                    self.linker.handle_event(
                        &EngineEvent::MemoryStored { memory: Box::new(memory) },
                        &self.store,
                    );
                }
            }
        }
        self.drain_to_linker();
        self.rules.start();

        if self.config.memory.enable_auto_cleanup {
            self.cleanup_timer = Some(IntervalTimer::start(std::time::Duration::from_millis(
                self.config.memory.cleanup_interval_ms,
            )));
        }
        if self.config.memory.persistence.enabled && self.config.memory.persistence.auto_save {
            self.autosave_timer = Some(IntervalTimer::start(std::time::Duration::from_millis(
                self.config.memory.persistence.auto_save_interval_ms,
            )));
        }

        self.initialized = true;
        Ok(())
    }

    /// Services any timer started by `initialize()` whose period has
    /// elapsed: sweeps expired memories on the cleanup timer, flushes a
    /// pending debounced save on the autosave timer (spec §5: `memory.
    /// cleanupInterval`, `memory.enableAutoCleanup`, `persistence.
    /// autoSaveInterval`). Call this periodically from the embedding
    /// application's own loop; the timers themselves run on background
    /// tasks and only measure elapsed time; the actual store mutation still
    /// happens here, through the same single-owner access every other
    /// facade method uses.
    pub async fn service_timers(&mut self) -> EngineResult<()> {
        self.require_initialized()?;

        if self.cleanup_timer.as_ref().is_some_and(IntervalTimer::take_due) {
            self.store.cleanup_expired();
            self.drain_to_linker();
        }

        if self.autosave_timer.as_ref().is_some_and(IntervalTimer::take_due)
            && self.store.take_pending_persist()
        {
            self.store.save_now().await?;
        }

        Ok(())
    }

    fn require_initialized(&self) -> EngineResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(EngineError::InvalidInput("engine not initialized".to_string()))
        }
    }

    /// Drains events published since the last drain into the linker, and
    /// invalidates the retrieval cache on any memory-affecting event
    /// (spec §4.7 wiring note).
    fn drain_to_linker(&mut self) {
        loop {
            let event = match self.event_rx.try_recv() {
                Ok(event) => event,
                Err(_) => break,
            };
            if self.config.features.knowledge_graph {
                self.linker.handle_event(&event, &self.store);
            }
            if is_mutation_event(&event) {
                self.retrieval_manager.retriever_mut().clear_cache();
            }
            observability::record_operation();
        }
    }

    pub fn store_memory(&mut self, new: NewMemory) -> EngineResult<bool> {
        self.require_initialized()?;
        let result = self.store.store(new);
        if result.is_err() {
            observability::record_error();
        }
        let stored = result?;
        self.drain_to_linker();
        Ok(stored)
    }

    pub fn update_memory(&mut self, id: &str, patch: MemoryPatch) -> EngineResult<()> {
        self.require_initialized()?;
        self.store.update(id, patch)?;
        self.drain_to_linker();
        Ok(())
    }

    pub fn remove_memory(&mut self, id: &str) -> EngineResult<()> {
        self.require_initialized()?;
        self.store.remove(id)?;
        self.drain_to_linker();
        Ok(())
    }

    /// Merges `ids` into a new memory and projects the result through to
    /// the linker/cache the same way any other mutation does (spec §4.2,
    /// literal Scenario 5 in spec.md §8).
    pub fn merge_memories(&mut self, ids: &[String], patch: MergePatch) -> EngineResult<String> {
        self.require_initialized()?;
        let merged_id = self.store.merge(ids, patch)?;
        self.drain_to_linker();
        Ok(merged_id)
    }

    pub fn get_related_memories(
        &self,
        id: &str,
        min_score: f32,
        limit: Option<usize>,
    ) -> EngineResult<Vec<(Memory, f32)>> {
        self.require_initialized()?;
        self.store.get_related(id, min_score, limit)
    }

    pub fn find_similar_memories(
        &self,
        id: &str,
        min_score: f32,
        limit: usize,
    ) -> EngineResult<Vec<(Memory, f32)>> {
        self.require_initialized()?;
        self.store.find_similar_to_memory(id, min_score, limit)
    }

    /// Sweeps expired memories and projects the removals to the linker
    /// (spec §4.2 `cleanupExpired`).
    pub fn cleanup_expired_memories(&mut self) -> EngineResult<usize> {
        self.require_initialized()?;
        let removed = self.store.cleanup_expired();
        self.drain_to_linker();
        Ok(removed)
    }

    /// Sweeps low-importance memories below `threshold`, removing at most
    /// `max_to_remove` (spec §4.2 `cleanupLowImportance`).
    pub fn cleanup_low_importance_memories(
        &mut self,
        threshold: f32,
        max_to_remove: usize,
    ) -> EngineResult<usize> {
        self.require_initialized()?;
        let removed = self.store.cleanup_low_importance(threshold, max_to_remove);
        self.drain_to_linker();
        Ok(removed)
    }

    pub fn retrieve_memories(&mut self, query: &RetrievalQuery) -> EngineResult<RetrievalResult> {
        self.require_initialized()?;
        self.retrieval_manager
            .retrieve_memories(query, &mut self.store, self.linker.graph())
    }

    pub fn enhance_agent(
        &mut self,
        agent: &Agent,
        context: &EnhancementContext,
    ) -> EngineResult<EnhancementOutcome> {
        self.require_initialized()?;
        self.retrieval_manager
            .enhance_agent(agent, context, &mut self.store, self.linker.graph())
    }

    pub fn rules_mut(&mut self) -> &mut RuleEngine {
        &mut self.rules
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn get_system_stats(&self) -> SystemStats {
        let detailed = self.retrieval_manager.get_detailed_stats();
        SystemStats {
            memory_count: self.store.len(),
            node_count: self.linker.graph().node_count(),
            edge_count: self.linker.graph().edge_count(),
            rule_count: self.rules.rules().count(),
            total_queries: detailed.total_queries,
            queue_size: detailed.queue_size,
            avg_confidence: detailed.avg_confidence,
            operation_count: observability::operation_count(),
            error_count: observability::error_count(),
        }
    }

    /// Shallow-merges `patch` into the live configuration (spec §4.7).
    /// Feature-flag toggles take effect on the next operation since every
    /// code path re-reads `self.config.features` rather than caching it.
    pub fn update_configuration(&mut self, patch: &serde_json::Value) {
        self.config.apply_flat_patch(patch);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Cross-checks every memory has a matching `memory_<id>` node (when
    /// the graph feature is enabled) and that no edge references a missing
    /// node (spec §4.7). The latter can never actually fail given
    /// `KnowledgeGraph::add_edge`'s dangling-endpoint guard, but is kept as
    /// a defensive check against future graph-mutation paths.
    pub fn validate_data_integrity(&self) -> IntegrityReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.config.features.knowledge_graph {
            for memory in self.store.all() {
                let node_id = format!("memory_{}", memory.id);
                if !self.linker.graph().has_node(&node_id) {
                    errors.push(format!("memory {} has no matching graph node", memory.id));
                }
            }
        } else {
            warnings.push("knowledge graph feature is disabled; skipping node cross-check".to_string());
        }

        for edge in self.linker.graph().edges_iter() {
            if !self.linker.graph().has_node(&edge.source_id) {
                errors.push(format!("edge {} references missing source node {}", edge.id, edge.source_id));
            }
            if !self.linker.graph().has_node(&edge.target_id) {
                errors.push(format!("edge {} references missing target node {}", edge.id, edge.target_id));
            }
        }

        IntegrityReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Forces an immediate persistence flush if a debounced save is
    /// pending (spec §4.2 `schedulePersist`/`saveNow`).
    pub async fn flush_pending_persistence(&mut self) -> EngineResult<()> {
        if self.store.take_pending_persist() {
            self.store.save_now().await?;
        }
        Ok(())
    }

    /// Tears down in reverse dependency order and flushes persistence if
    /// configured (spec §4.7).
    pub async fn destroy(&mut self) -> EngineResult<()> {
        if let Some(timer) = self.cleanup_timer.take() {
            timer.stop();
        }
        if let Some(timer) = self.autosave_timer.take() {
            timer.stop();
        }
        self.rules.stop();
        self.retrieval_manager.destroy();
        self.store.destroy().await?;
        self.initialized = false;
        Ok(())
    }
}

fn is_mutation_event(event: &EngineEvent) -> bool {
    matches!(
        event,
        EngineEvent::MemoryStored { .. }
            | EngineEvent::MemoryUpdated { .. }
            | EngineEvent::MemoryRemoved { .. }
            | EngineEvent::MemoriesMerged { .. }
            | EngineEvent::MemoriesExpired { .. }
            | EngineEvent::LowImportanceMemoriesRemoved { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryKind;

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let mut facade = SystemFacade::new(EngineConfig::default());
        facade.initialize().await.unwrap();
        assert!(facade.initialized);
        facade.initialize().await.unwrap();
        assert!(facade.initialized);
    }

    #[tokio::test]
    async fn store_memory_requires_initialization() {
        let mut facade = SystemFacade::new(EngineConfig::default());
        let err = facade
            .store_memory(NewMemory::new("m1", MemoryKind::Semantic, "x"))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn store_memory_projects_into_graph() {
        let mut facade = SystemFacade::new(EngineConfig::default());
        facade.initialize().await.unwrap();
        facade
            .store_memory(NewMemory::new("m1", MemoryKind::Semantic, "hello world"))
            .unwrap();
        let stats = facade.get_system_stats();
        assert_eq!(stats.memory_count, 1);
        assert_eq!(stats.node_count, 1);
    }

    #[tokio::test]
    async fn merge_memories_removes_originals_and_updates_graph() {
        let mut facade = SystemFacade::new(EngineConfig::default());
        facade.initialize().await.unwrap();
        facade
            .store_memory(NewMemory::new("a", MemoryKind::Episodic, "met alice"))
            .unwrap();
        facade
            .store_memory(NewMemory::new("b", MemoryKind::Episodic, "alice again"))
            .unwrap();

        let merged_id = facade
            .merge_memories(&["a".to_string(), "b".to_string()], crate::store::MergePatch::default())
            .unwrap();

        assert_eq!(facade.get_system_stats().memory_count, 1);
        assert!(facade.validate_data_integrity().valid);
        assert!(facade.get_related_memories(&merged_id, 0.0, None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn cleanup_timer_sweeps_expired_memories_once_due() {
        let mut config = EngineConfig::default();
        config.memory.enable_auto_cleanup = true;
        config.memory.cleanup_interval_ms = 10;
        let mut facade = SystemFacade::new(config);
        facade.initialize().await.unwrap();

        let past = chrono::Utc::now() - chrono::Duration::seconds(10);
        facade
            .store_memory(NewMemory::new("expired", MemoryKind::ShortTerm, "short lived fact"))
            .unwrap();
        facade
            .update_memory(
                "expired",
                MemoryPatch {
                    expires_at: Some(Some(past)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(facade.get_system_stats().memory_count, 1);

        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        facade.service_timers().await.unwrap();

        assert_eq!(facade.get_system_stats().memory_count, 0);
    }

    #[tokio::test]
    async fn service_timers_requires_initialization() {
        let mut facade = SystemFacade::new(EngineConfig::default());
        let err = facade.service_timers().await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn integrity_report_is_valid_after_normal_use() {
        let mut facade = SystemFacade::new(EngineConfig::default());
        facade.initialize().await.unwrap();
        facade
            .store_memory(NewMemory::new("m1", MemoryKind::Semantic, "hello world"))
            .unwrap();
        let report = facade.validate_data_integrity();
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }
}
