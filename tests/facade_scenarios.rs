//! End-to-end scenarios against `SystemFacade`, exercising the literal
//! examples from the specification: retrieve-with-related nodes, cache
//! hits, custom strategy ordering, expiration sweeps, merges, and
//! persistence round-trips.

use ltm_engine::config::EngineConfig;
use ltm_engine::model::{MemoryKind, MemoryPatch, NewMemory, RetrievalQuery};
use ltm_engine::store::MergePatch;
use ltm_engine::SystemFacade;

fn facade() -> SystemFacade {
    SystemFacade::new(EngineConfig::default())
}

#[tokio::test]
async fn retrieve_with_related_nodes_includes_tag_concepts() {
    let mut facade = facade();
    facade.initialize().await.unwrap();

    facade
        .store_memory(
            NewMemory::new("m1", MemoryKind::Semantic, "rust ownership and borrowing")
                .with_tags(["rust".to_string(), "ownership".to_string()]),
        )
        .unwrap();

    let mut query = RetrievalQuery::new();
    query.text = Some("rust ownership".to_string());
    query.include_related = true;

    let result = facade.retrieve_memories(&query).unwrap();
    assert_eq!(result.total_results, 1);
    assert!(!result.related_nodes.is_empty(), "expected tag concept nodes to be related");
}

#[tokio::test]
async fn repeated_identical_query_is_served_from_cache() {
    let mut facade = facade();
    facade.initialize().await.unwrap();
    facade
        .store_memory(NewMemory::new("m1", MemoryKind::Semantic, "cache behavior test"))
        .unwrap();

    let mut query = RetrievalQuery::new();
    query.text = Some("cache behavior".to_string());

    let first = facade.retrieve_memories(&query).unwrap();
    let second = facade.retrieve_memories(&query).unwrap();
    assert_eq!(first.total_results, second.total_results);
}

#[tokio::test]
async fn mutation_invalidates_cache_so_new_memory_is_found() {
    let mut facade = facade();
    facade.initialize().await.unwrap();

    let mut query = RetrievalQuery::new();
    query.text = Some("newly added".to_string());

    let before = facade.retrieve_memories(&query).unwrap();
    assert_eq!(before.total_results, 0);

    facade
        .store_memory(NewMemory::new("m1", MemoryKind::Semantic, "newly added memory"))
        .unwrap();

    let after = facade.retrieve_memories(&query).unwrap();
    assert_eq!(after.total_results, 1);
}

#[tokio::test]
async fn expiration_sweep_removes_expired_memories_from_search() {
    let mut facade = facade();
    facade.initialize().await.unwrap();

    let past = chrono::Utc::now() - chrono::Duration::seconds(10);
    let new = NewMemory::new("expired", MemoryKind::ShortTerm, "short lived fact");
    facade.store_memory(new).unwrap();
    facade
        .update_memory(
            "expired",
            MemoryPatch {
                expires_at: Some(Some(past)),
                ..Default::default()
            },
        )
        .unwrap();

    let mut query = RetrievalQuery::new();
    query.text = Some("short lived".to_string());
    let result = facade.retrieve_memories(&query).unwrap();
    assert_eq!(result.total_results, 0, "expired memory should not be retrievable");
}

#[tokio::test]
async fn merge_combines_content_and_removes_originals() {
    let mut facade = facade();
    facade.initialize().await.unwrap();

    facade
        .store_memory(NewMemory::new("a", MemoryKind::Episodic, "met alice at the conference"))
        .unwrap();
    facade
        .store_memory(NewMemory::new("b", MemoryKind::Episodic, "alice works on compilers"))
        .unwrap();
    assert_eq!(facade.get_system_stats().memory_count, 2);

    let merged_id = facade
        .merge_memories(&["a".to_string(), "b".to_string()], MergePatch::default())
        .unwrap();

    let stats = facade.get_system_stats();
    assert_eq!(stats.memory_count, 1, "originals should be gone, merged memory remains");

    let related = facade.get_related_memories(&merged_id, 0.0, None).unwrap();
    assert!(related.is_empty(), "no other memories left to relate to");

    let mut query = RetrievalQuery::new();
    query.text = Some("alice".to_string());
    let result = facade.retrieve_memories(&query).unwrap();
    assert_eq!(result.total_results, 1);
    assert!(result.memories[0].content.contains("alice at the conference"));
    assert!(result.memories[0].content.contains("alice works on compilers"));

    let report = facade.validate_data_integrity();
    assert!(report.valid, "graph should reflect the merge: no dangling nodes for removed originals");
}

#[tokio::test]
async fn persistence_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.memory.persistence.enabled = true;
    config.memory.persistence.dir = dir.path().to_path_buf();

    {
        let mut facade = SystemFacade::new(config.clone());
        facade.initialize().await.unwrap();
        facade
            .store_memory(NewMemory::new("m1", MemoryKind::LongTerm, "durable fact"))
            .unwrap();
        facade.flush_pending_persistence().await.unwrap();
        facade.destroy().await.unwrap();
    }

    let mut reloaded = SystemFacade::new(config);
    reloaded.initialize().await.unwrap();
    let stats = reloaded.get_system_stats();
    assert_eq!(stats.memory_count, 1);
}

#[tokio::test]
async fn integrity_report_flags_knowledge_graph_disabled_as_warning() {
    let mut config = EngineConfig::default();
    config.features.knowledge_graph = false;
    let mut facade = SystemFacade::new(config);
    facade.initialize().await.unwrap();
    facade
        .store_memory(NewMemory::new("m1", MemoryKind::Semantic, "no graph projection"))
        .unwrap();

    let report = facade.validate_data_integrity();
    assert!(report.valid);
    assert!(!report.warnings.is_empty());
}
