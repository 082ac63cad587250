//! Built-in retrieval strategies (spec §4.4).

use chrono::Utc;

use crate::model::{Memory, RetrievalQuery};
use crate::store::similarity::text_similarity_to_memory;

/// Scores one memory against a query. Returning `None` means the strategy
/// does not apply to this query/memory pair and contributes nothing to the
/// composite score or confidence (spec §4.4 composition rule).
pub trait RetrievalStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `(score, confidence)`, both in `[0, 1]`.
    fn evaluate(&self, query: &RetrievalQuery, memory: &Memory) -> Option<(f32, f32)>;
}

/// Free-text similarity: 0.7 content + 0.3 tag Jaccard against `query.text`
/// (spec §4.2's `findSimilar` formula, reused here per §4.4).
pub struct TextSimilarityStrategy;

impl RetrievalStrategy for TextSimilarityStrategy {
    fn name(&self) -> &'static str {
        "textSimilarity"
    }

    fn evaluate(&self, query: &RetrievalQuery, memory: &Memory) -> Option<(f32, f32)> {
        let text = query.text.as_ref()?;
        if text.trim().is_empty() {
            return None;
        }
        let score = text_similarity_to_memory(text, memory);
        Some((score, score))
    }
}

/// Exact per-key equality against `query.context`; score is the fraction of
/// queried keys that matched (spec §4.4).
pub struct ContextMatchStrategy;

impl RetrievalStrategy for ContextMatchStrategy {
    fn name(&self) -> &'static str {
        "contextMatch"
    }

    fn evaluate(&self, query: &RetrievalQuery, memory: &Memory) -> Option<(f32, f32)> {
        if query.context.is_empty() {
            return None;
        }
        let matched = query
            .context
            .iter()
            .filter(|(key, expected)| memory.context.get(key).as_ref() == Some(*expected))
            .count();
        let score = matched as f32 / query.context.len() as f32;
        Some((score, score))
    }
}

/// Monotonically decreasing in age, half-life 30 days (spec §4.4: "monotonically
/// decreasing in age" — the exact decay constant is left to the implementation).
pub struct TemporalRelevanceStrategy {
    half_life_days: f32,
}

impl TemporalRelevanceStrategy {
    pub fn new() -> Self {
        Self { half_life_days: 30.0 }
    }
}

impl Default for TemporalRelevanceStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetrievalStrategy for TemporalRelevanceStrategy {
    fn name(&self) -> &'static str {
        "temporalRelevance"
    }

    fn evaluate(&self, _query: &RetrievalQuery, memory: &Memory) -> Option<(f32, f32)> {
        let age_days = (Utc::now() - memory.created_at).num_seconds() as f32 / 86_400.0;
        let age_days = age_days.max(0.0);
        let score = 0.5f32.powf(age_days / self.half_life_days);
        Some((score, score))
    }
}

/// Proportional to stored importance (spec §4.4).
pub struct ImportanceStrategy;

impl RetrievalStrategy for ImportanceStrategy {
    fn name(&self) -> &'static str {
        "importance"
    }

    fn evaluate(&self, _query: &RetrievalQuery, memory: &Memory) -> Option<(f32, f32)> {
        Some((memory.importance, memory.importance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MemoryContext, MemoryKind, NewMemory};
    use crate::store::build_memory_for_test;

    #[test]
    fn context_match_scores_fraction_of_keys() {
        let memory = build_memory_for_test(
            NewMemory::new("m1", MemoryKind::Semantic, "x").with_context(MemoryContext {
                domain: Some("eng".to_string()),
                ..Default::default()
            }),
        );
        let mut query = RetrievalQuery::new();
        query
            .context
            .insert("domain".to_string(), serde_json::json!("eng"));
        query
            .context
            .insert("task".to_string(), serde_json::json!("missing"));
        let (score, _) = ContextMatchStrategy.evaluate(&query, &memory).unwrap();
        assert!((score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn temporal_relevance_favors_recent() {
        let recent = build_memory_for_test(NewMemory::new("a", MemoryKind::Episodic, "x"));
        let mut old = recent.clone();
        old.created_at = Utc::now() - chrono::Duration::days(60);
        let strategy = TemporalRelevanceStrategy::new();
        let query = RetrievalQuery::new();
        let (recent_score, _) = strategy.evaluate(&query, &recent).unwrap();
        let (old_score, _) = strategy.evaluate(&query, &old).unwrap();
        assert!(recent_score > old_score);
    }
}
