//! Typed publish/subscribe events emitted by the core (spec §6, §9).
//!
//! Subsystems publish through a shared [`EventBus`]; subscribers receive a
//! `broadcast::Receiver<EngineEvent>` and are expected to drain it in their
//! own task. Handler errors are caught at the subscriber boundary and never
//! propagate back into the emitting call (spec §7) — they are instead
//! re-published as [`EngineEvent::Error`].

use tokio::sync::broadcast;

use crate::model::{Memory, RuleExecutionResult};

/// Event names emitted by the core (spec §6).
#[derive(Debug, Clone)]
pub enum EngineEvent {
    MemoryStored { memory: Box<Memory> },
    MemoryUpdated { old: Box<Memory>, new: Box<Memory> },
    MemoryRemoved { id: String },
    MemoriesExpired { ids: Vec<String> },
    MemoriesMerged { original_ids: Vec<String>, merged_id: String },
    LowImportanceMemoriesRemoved { ids: Vec<String> },
    CapacityWarning { size: usize, max_size: usize },
    CacheHit { fingerprint: String },
    CacheCleared,
    RuleExecuted { result: Box<RuleExecutionResult> },
    ExecutionError { rule_id: String, message: String },
    AnalysisCompleted { summary: String },
    MemoriesPersisted { count: usize },
    MemoriesLoaded { count: usize },
    /// Internal event-handler error, caught and re-published rather than
    /// unwound into the caller (spec §7).
    Error { source: String, message: String },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::MemoryStored { .. } => "memoryStored",
            EngineEvent::MemoryUpdated { .. } => "memoryUpdated",
            EngineEvent::MemoryRemoved { .. } => "memoryRemoved",
            EngineEvent::MemoriesExpired { .. } => "memoriesExpired",
            EngineEvent::MemoriesMerged { .. } => "memoriesMerged",
            EngineEvent::LowImportanceMemoriesRemoved { .. } => "lowImportanceMemoriesRemoved",
            EngineEvent::CapacityWarning { .. } => "capacityWarning",
            EngineEvent::CacheHit { .. } => "cacheHit",
            EngineEvent::CacheCleared => "cacheCleared",
            EngineEvent::RuleExecuted { .. } => "ruleExecuted",
            EngineEvent::ExecutionError { .. } => "executionError",
            EngineEvent::AnalysisCompleted { .. } => "analysisCompleted",
            EngineEvent::MemoriesPersisted { .. } => "memoriesPersisted",
            EngineEvent::MemoriesLoaded { .. } => "memoriesLoaded",
            EngineEvent::Error { .. } => "error",
        }
    }
}

/// Shared broadcast bus. Cloning an `EventBus` shares the same underlying
/// channel (cheap, `Sender` is reference-counted internally).
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Delivery to subscribers happens before this call
    /// returns (spec §5 ordering guarantee) since `broadcast::Sender::send`
    /// synchronously copies the event into every receiver's queue.
    pub fn publish(&self, event: EngineEvent) {
        // No active subscribers is not an error: events are fire-and-forget.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
