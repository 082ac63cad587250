//! Engine configuration (spec §6).
//!
//! Recognized flat keys are modeled as a typed [`EngineConfig`] rather than
//! a stringly-typed map, with [`EngineConfig::apply_flat_patch`] accepting
//! the dotted keys from spec §6 for parity with `updateConfiguration(patch)`
//! (spec §4.7). Unknown keys are ignored with a warning rather than
//! rejected, matching that method's "shallow merge" semantics.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_size: usize,
    pub retention_days: u32,
    pub enable_auto_cleanup: bool,
    pub cleanup_interval_ms: u64,
    pub persistence: PersistenceConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            retention_days: 30,
            enable_auto_cleanup: true,
            cleanup_interval_ms: 60_000,
            persistence: PersistenceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub file_name: String,
    pub auto_save: bool,
    pub auto_save_interval_ms: u64,
    pub save_on_destroy: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("./data"),
            file_name: "memories.json".to_string(),
            auto_save: true,
            auto_save_interval_ms: 5_000,
            save_on_destroy: true,
        }
    }
}

impl PersistenceConfig {
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub cache_ttl_ms: u64,
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 60_000,
            default_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub knowledge_graph: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            knowledge_graph: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RulesConfig {
    pub personal_rules_path: Option<PathBuf>,
    pub project_rules_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub enable_monitoring: bool,
    pub metrics_interval_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enable_monitoring: false,
            metrics_interval_ms: 30_000,
        }
    }
}

/// Top-level engine configuration (spec §6's flat-list keys, grouped).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub memory: MemoryConfig,
    pub retrieval: RetrievalConfig,
    pub features: FeatureFlags,
    pub rules: RulesConfig,
    pub performance: PerformanceConfig,
}

impl EngineConfig {
    pub fn load_from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&text)?),
            _ => Ok(toml::from_str(&text)?),
        }
    }

    /// Apply a flat, dotted-key patch (e.g. `memory.maxSize`,
    /// `features.knowledgeGraph`) onto this configuration, mirroring
    /// `updateConfiguration(patch)`'s shallow merge (spec §4.7). Values are
    /// JSON so callers can pass `serde_json::json!({...})`-style patches.
    pub fn apply_flat_patch(&mut self, patch: &serde_json::Value) {
        let Some(obj) = patch.as_object() else {
            tracing::warn!("configuration patch was not an object; ignoring");
            return;
        };
        for (key, value) in obj {
            self.apply_one(key, value);
        }
    }

    fn apply_one(&mut self, key: &str, value: &serde_json::Value) {
        match key {
            "memory.maxSize" => self.memory.max_size = as_usize(value, self.memory.max_size),
            "memory.retentionDays" => {
                self.memory.retention_days = as_u32(value, self.memory.retention_days)
            }
            "memory.enableAutoCleanup" => {
                self.memory.enable_auto_cleanup =
                    value.as_bool().unwrap_or(self.memory.enable_auto_cleanup)
            }
            "memory.cleanupInterval" => {
                self.memory.cleanup_interval_ms = as_u64(value, self.memory.cleanup_interval_ms)
            }
            "memory.persistence.enabled" => {
                self.memory.persistence.enabled =
                    value.as_bool().unwrap_or(self.memory.persistence.enabled)
            }
            "memory.persistence.dir" => {
                if let Some(s) = value.as_str() {
                    self.memory.persistence.dir = PathBuf::from(s);
                }
            }
            "memory.persistence.fileName" => {
                if let Some(s) = value.as_str() {
                    self.memory.persistence.file_name = s.to_string();
                }
            }
            "memory.persistence.autoSave" => {
                self.memory.persistence.auto_save =
                    value.as_bool().unwrap_or(self.memory.persistence.auto_save)
            }
            "memory.persistence.autoSaveInterval" => {
                self.memory.persistence.auto_save_interval_ms =
                    as_u64(value, self.memory.persistence.auto_save_interval_ms)
            }
            "memory.persistence.saveOnDestroy" => {
                self.memory.persistence.save_on_destroy = value
                    .as_bool()
                    .unwrap_or(self.memory.persistence.save_on_destroy)
            }
            "retrieval.cacheTTL" => {
                self.retrieval.cache_ttl_ms = as_u64(value, self.retrieval.cache_ttl_ms)
            }
            "retrieval.defaultLimit" => {
                self.retrieval.default_limit = as_usize(value, self.retrieval.default_limit)
            }
            "features.knowledgeGraph" => {
                self.features.knowledge_graph =
                    value.as_bool().unwrap_or(self.features.knowledge_graph)
            }
            "rules.personalRulesPath" => {
                self.rules.personal_rules_path = value.as_str().map(PathBuf::from)
            }
            "rules.projectRulesPath" => {
                self.rules.project_rules_path = value.as_str().map(PathBuf::from)
            }
            "performance.enableMonitoring" => {
                self.performance.enable_monitoring = value
                    .as_bool()
                    .unwrap_or(self.performance.enable_monitoring)
            }
            "performance.metricsInterval" => {
                self.performance.metrics_interval_ms =
                    as_u64(value, self.performance.metrics_interval_ms)
            }
            other => {
                tracing::warn!(key = other, "unrecognized configuration key; ignoring");
            }
        }
    }
}

fn as_usize(value: &serde_json::Value, default: usize) -> usize {
    value.as_u64().map(|v| v as usize).unwrap_or(default)
}

fn as_u32(value: &serde_json::Value, default: u32) -> u32 {
    value.as_u64().map(|v| v as u32).unwrap_or(default)
}

fn as_u64(value: &serde_json::Value, default: u64) -> u64 {
    value.as_u64().unwrap_or(default)
}
