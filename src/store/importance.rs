//! Default-importance rubric (spec §4.2): base 0.5, plus contributions from
//! kind, content length, tag count, and context richness, clamped to
//! `[0, 1]`.

use indexmap::IndexSet;

use crate::model::{MemoryContext, MemoryKind};

const BASE: f32 = 0.5;
const MAX_TAG_BONUS: f32 = 0.1;
const TAG_BONUS_PER_TAG: f32 = 0.02;
const MAX_CONTEXT_BONUS: f32 = 0.05;
const CONTEXT_BONUS_PER_FIELD: f32 = 0.0125;

pub fn default_importance(
    kind: MemoryKind,
    content: &str,
    tags: &IndexSet<String>,
    context: &MemoryContext,
) -> f32 {
    let mut score = BASE;
    score += kind.importance_weight();
    score += content_length_bonus(content);
    score += (tags.len() as f32 * TAG_BONUS_PER_TAG).min(MAX_TAG_BONUS);
    score += (context.richness() as f32 * CONTEXT_BONUS_PER_FIELD).min(MAX_CONTEXT_BONUS);
    score.clamp(0.0, 1.0)
}

fn content_length_bonus(content: &str) -> f32 {
    let len = content.chars().count();
    if len > 500 {
        0.10
    } else if len > 200 {
        0.07
    } else if len > 50 {
        0.04
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_to_unit_interval() {
        let tags: IndexSet<String> = (0..50).map(|i| i.to_string()).collect();
        let score = default_importance(
            MemoryKind::Consolidated,
            &"x".repeat(10_000),
            &tags,
            &MemoryContext {
                user_id: Some("u".into()),
                session_id: Some("s".into()),
                domain: Some("d".into()),
                task: Some("t".into()),
                extras: Default::default(),
            },
        );
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn base_score_for_minimal_input() {
        let score = default_importance(
            MemoryKind::ShortTerm,
            "hi",
            &IndexSet::new(),
            &MemoryContext::default(),
        );
        assert!((score - 0.55).abs() < 1e-6);
    }
}
