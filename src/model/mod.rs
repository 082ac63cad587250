//! Core data types shared across the engine (spec §3).

pub mod agent;
pub mod graph;
pub mod memory;
pub mod query;
pub mod rule;

pub use agent::{Agent, AgentStatus, EnhancementContext, EnhancementOutcome};
pub use graph::{EdgeKind, EdgePatch, KnowledgeEdge, KnowledgeNode, NodeKind, NodePatch};
pub use memory::{Memory, MemoryContext, MemoryKind, MemoryPatch, NewMemory};
pub use query::{RetrievalQuery, RetrievalResult};
pub use rule::{Action, ActionOutcome, Condition, ConditionOperator, Rule, RuleExecutionResult};
