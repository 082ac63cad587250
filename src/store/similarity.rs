//! Keyword extraction and the similarity formulas used by `MemoryStore`
//! (spec §4.2) and, per the resolved tokenizer open question (spec §9),
//! by `GraphLinker` as well.

use std::collections::HashSet;

use indexmap::IndexSet;

use crate::model::{Memory, MemoryContext};

const MAX_TOKENS: usize = 50;

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3400..=0x4DBF |
        0x4E00..=0x9FFF |
        0x3040..=0x30FF |
        0xAC00..=0xD7A3 |
        0x20000..=0x2A6DF
    )
}

/// Lowercase; replace non-(CJK/ASCII-alphanumeric/space) with space; split
/// each CJK character into its own token; split on whitespace; drop
/// empties; keep at most the first 50 tokens (spec §4.2).
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut cleaned = String::with_capacity(lower.len() * 2);
    for c in lower.chars() {
        if is_cjk(c) {
            cleaned.push(' ');
            cleaned.push(c);
            cleaned.push(' ');
        } else if c.is_ascii_alphanumeric() || c.is_whitespace() {
            cleaned.push(c);
        } else {
            cleaned.push(' ');
        }
    }
    cleaned
        .split_whitespace()
        .map(|s| s.to_string())
        .take(MAX_TOKENS)
        .collect()
}

pub fn keyword_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        1.0
    } else {
        intersection as f32 / union as f32
    }
}

pub fn content_similarity(a: &str, b: &str) -> f32 {
    jaccard(&keyword_set(a), &keyword_set(b))
}

fn lowercased_set(tags: &IndexSet<String>) -> HashSet<String> {
    tags.iter().map(|t| t.to_lowercase()).collect()
}

pub fn tag_jaccard(a: &IndexSet<String>, b: &IndexSet<String>) -> f32 {
    jaccard(&lowercased_set(a), &lowercased_set(b))
}

/// Flattens a context into a set of `"key=value"` pairs for the Jaccard
/// comparison over identical key/value pairs (spec §4.2), and reused by
/// `MemoryStore`'s context-key index.
pub(crate) fn context_pairs(ctx: &MemoryContext) -> HashSet<String> {
    let mut pairs = HashSet::new();
    if let Some(v) = &ctx.user_id {
        pairs.insert(format!("userId={v}"));
    }
    if let Some(v) = &ctx.session_id {
        pairs.insert(format!("sessionId={v}"));
    }
    if let Some(v) = &ctx.domain {
        pairs.insert(format!("domain={v}"));
    }
    if let Some(v) = &ctx.task {
        pairs.insert(format!("task={v}"));
    }
    for (k, v) in &ctx.extras {
        pairs.insert(format!("{k}={v}"));
    }
    pairs
}

pub fn context_jaccard(a: &MemoryContext, b: &MemoryContext) -> f32 {
    jaccard(&context_pairs(a), &context_pairs(b))
}

/// Weighted composite similarity between two memories: content 0.4, tag
/// 0.3, type equality 0.2, context 0.1 — skipping and renormalizing a
/// factor when either side lacks its input (spec §4.2). Symmetric by
/// construction: `similarity(a, b) == similarity(b, a)`.
pub fn pairwise_similarity(a: &Memory, b: &Memory) -> f32 {
    let mut total_weight = 0.0f32;
    let mut score = 0.0f32;

    // Content is always present (non-empty is a store-level invariant).
    total_weight += 0.4;
    score += 0.4 * content_similarity(&a.content, &b.content);

    if !a.tags.is_empty() && !b.tags.is_empty() {
        total_weight += 0.3;
        score += 0.3 * tag_jaccard(&a.tags, &b.tags);
    }

    total_weight += 0.2;
    score += 0.2 * if a.kind.as_str() == b.kind.as_str() { 1.0 } else { 0.0 };

    if !a.context.is_empty() && !b.context.is_empty() {
        total_weight += 0.1;
        score += 0.1 * context_jaccard(&a.context, &b.context);
    }

    if total_weight == 0.0 {
        0.0
    } else {
        score / total_weight
    }
}

/// Free-text `findSimilar` overload: 0.7 content (query tokens vs. memory
/// content) + 0.3 tag (query tokens vs. memory tags) Jaccard (spec §4.2).
pub fn text_similarity_to_memory(query_text: &str, memory: &Memory) -> f32 {
    let query_tokens = keyword_set(query_text);
    let content_tokens = keyword_set(&memory.content);
    let content_score = jaccard(&query_tokens, &content_tokens);

    let tag_tokens = lowercased_set(&memory.tags);
    let tag_score = jaccard(&query_tokens, &tag_tokens);

    0.7 * content_score + 0.3 * tag_score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_splits_cjk_per_character() {
        let tokens = tokenize("hello 世界 world");
        assert!(tokens.contains(&"世".to_string()));
        assert!(tokens.contains(&"界".to_string()));
        assert!(tokens.contains(&"hello".to_string()));
    }

    #[test]
    fn tokenizer_caps_at_fifty_tokens() {
        let text = (0..100).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        assert_eq!(tokenize(&text).len(), 50);
    }

    #[test]
    fn similarity_symmetric_and_reflexive() {
        use crate::model::{MemoryKind, NewMemory};
        use crate::store::build_memory_for_test;

        let a = build_memory_for_test(
            NewMemory::new("a", MemoryKind::Semantic, "rust is a systems language"),
        );
        let b = build_memory_for_test(
            NewMemory::new("b", MemoryKind::Semantic, "systems languages include rust"),
        );
        let ab = pairwise_similarity(&a, &b);
        let ba = pairwise_similarity(&b, &a);
        assert!((ab - ba).abs() < 1e-9);
        assert!((pairwise_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }
}
