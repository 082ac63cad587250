//! Error taxonomy for the memory engine.
//!
//! Public methods return `Result<T, EngineError>`. Internal event-handler
//! errors are caught at the subscriber boundary and re-published as
//! `EngineEvent::Error` rather than propagated into the emitting call's
//! caller (spec §7).

use thiserror::Error;

/// The engine's error taxonomy.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("dangling endpoint: edge references missing node {0}")]
    DanglingEndpoint(String),

    #[error("capacity exceeded: store is full and eviction was ineffective")]
    CapacityExceeded,

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("rule execution error: {0}")]
    RuleExecutionError(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
