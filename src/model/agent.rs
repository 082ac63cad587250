//! Agent-enhancement types (spec §4.6). The spec describes an "agent"
//! object with per-kind memory buckets and a status field without
//! prescribing its shape; this is the Rust realization.

use serde::{Deserialize, Serialize};

use super::memory::Memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Enhanced,
}

/// An agent being enhanced with retrieved memories, bucketed by kind
/// (spec §4.6: `episodic`/`semantic`/`procedural`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub episodic: Vec<Memory>,
    #[serde(default)]
    pub semantic: Vec<Memory>,
    #[serde(default)]
    pub procedural: Vec<Memory>,
}

impl Agent {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: AgentStatus::Idle,
            episodic: Vec::new(),
            semantic: Vec::new(),
            procedural: Vec::new(),
        }
    }
}

/// The context `enhanceAgent` builds a retrieval query from (spec §4.6).
#[derive(Debug, Clone, Default)]
pub struct EnhancementContext {
    pub current_task: Option<String>,
    pub domain: Option<String>,
}

/// Result of one enhancement pass. `enhanceAgent` is pure over its inputs:
/// the caller's agent is left untouched and a new, enhanced copy is
/// returned here (spec §4.6).
#[derive(Debug, Clone)]
pub struct EnhancementOutcome {
    pub enhanced_agent: Agent,
    pub applied_memories: Vec<String>,
    pub performance_improvement: f32,
    pub success: bool,
}
