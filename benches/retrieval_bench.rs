use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ltm_engine::config::{MemoryConfig, RetrievalConfig};
use ltm_engine::events::EventBus;
use ltm_engine::graph::KnowledgeGraph;
use ltm_engine::model::{MemoryKind, NewMemory, RetrievalQuery};
use ltm_engine::retrieval::Retriever;
use ltm_engine::store::MemoryStore;

fn seeded_store(n: usize) -> MemoryStore {
    let mut store = MemoryStore::new(MemoryConfig::default(), EventBus::default());
    for i in 0..n {
        let content = format!("memory number {i} about rust systems programming and ownership");
        store
            .store(NewMemory::new(format!("m{i}"), MemoryKind::Semantic, content))
            .unwrap();
    }
    store
}

fn bench_retrieve(c: &mut Criterion) {
    let mut store = seeded_store(1_000);
    let graph = KnowledgeGraph::new();
    let mut retriever = Retriever::new(RetrievalConfig::default(), EventBus::default());

    c.bench_function("retrieve_text_similarity_1000", |b| {
        b.iter(|| {
            let mut query = RetrievalQuery::new();
            query.text = Some("rust ownership rules".to_string());
            query.limit = 20;
            black_box(retriever.retrieve(&query, &mut store, &graph).unwrap());
        })
    });
}

fn bench_get_related(c: &mut Criterion) {
    let store = seeded_store(500);

    c.bench_function("get_related_pairwise_500", |b| {
        b.iter(|| {
            black_box(store.get_related("m0", 0.0, Some(10)).unwrap());
        })
    });
}

criterion_group!(benches, bench_retrieve, bench_get_related);
criterion_main!(benches);
