//! Property tests for the similarity/importance helpers that back both the
//! store's `findSimilarMemories` family and the `textSimilarity`/
//! `importance` retrieval strategies.

use indexmap::IndexSet;
use ltm_engine::config::MemoryConfig;
use ltm_engine::events::EventBus;
use ltm_engine::model::{MemoryContext, MemoryKind, NewMemory};
use ltm_engine::store::importance::default_importance;
use ltm_engine::store::similarity::{content_similarity, pairwise_similarity};
use ltm_engine::store::MemoryStore;
use proptest::prelude::*;

fn build_memory(id: &str, content: &str) -> ltm_engine::model::Memory {
    let mut store = MemoryStore::new(MemoryConfig::default(), EventBus::default());
    store
        .store(NewMemory::new(id, MemoryKind::Semantic, content))
        .unwrap();
    store.peek(id).unwrap().clone()
}

proptest! {
    #[test]
    fn content_similarity_is_symmetric(a in ".{0,80}", b in ".{0,80}") {
        let left = content_similarity(&a, &b);
        let right = content_similarity(&b, &a);
        prop_assert!((left - right).abs() < 1e-6);
    }

    #[test]
    fn content_similarity_of_identical_text_is_one_or_undefined(text in "[a-z ]{1,40}") {
        let score = content_similarity(&text, &text);
        // Empty tokenization (e.g. all-whitespace input) yields 0.0 by
        // convention; any non-empty token set must self-match at 1.0.
        if !text.trim().is_empty() {
            prop_assert!((score - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn content_similarity_is_bounded(a in ".{0,60}", b in ".{0,60}") {
        let score = content_similarity(&a, &b);
        prop_assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn default_importance_is_always_clamped(
        content in ".{0,200}",
        tag_count in 0usize..20,
    ) {
        let tags: IndexSet<String> = (0..tag_count).map(|i| format!("tag{i}")).collect();
        let context = MemoryContext::default();
        for kind in [
            MemoryKind::ShortTerm,
            MemoryKind::LongTerm,
            MemoryKind::Working,
            MemoryKind::Episodic,
            MemoryKind::Semantic,
            MemoryKind::Procedural,
            MemoryKind::Consolidated,
        ] {
            let score = default_importance(kind, &content, &tags, &context);
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn pairwise_similarity_of_a_memory_with_itself_is_one(content in "[a-z ]{1,40}") {
        if content.trim().is_empty() {
            return Ok(());
        }
        let memory = build_memory("m", &content);
        let score = pairwise_similarity(&memory, &memory);
        prop_assert!((score - 1.0).abs() < 1e-4);
    }
}
