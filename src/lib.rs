//! An in-process long-term memory engine: typed memory store, a derived
//! knowledge graph, pluggable retrieval, and a condition/action rule engine.
//!
//! [`facade::SystemFacade`] is the usual entry point; it owns every
//! subsystem's lifecycle and wires their events together. The subsystems
//! can also be used standalone — [`store::MemoryStore`],
//! [`graph::KnowledgeGraph`], [`linker::GraphLinker`],
//! [`retrieval::Retriever`], and [`rules::RuleEngine`] each work without the
//! facade for callers that want finer-grained control.

pub mod config;
pub mod error;
pub mod events;
pub mod facade;
pub mod graph;
pub mod linker;
pub mod manager;
pub mod model;
pub mod observability;
pub mod retrieval;
pub mod rules;
pub mod scheduler;
pub mod store;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use events::{EngineEvent, EventBus};
pub use facade::{IntegrityReport, SystemFacade, SystemStats};
pub use manager::{DetailedStats, LearningPatternSummary, RetrievalManager};
