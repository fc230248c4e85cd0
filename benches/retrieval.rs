//! Benchmarks for index and retrieval operations

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use tempfile::TempDir;
use tenant_index::{
    embed::{Embedder, MockEmbedder},
    ChunkDescriptor, FlatIndex, IndexConfig, IndexManager, RetrievalConfig, Retriever,
};

const DIM: usize = 384;

fn embeddings(n: usize) -> Vec<Vec<f32>> {
    let embedder = MockEmbedder::new(DIM);
    let texts: Vec<String> = (0..n)
        .map(|i| format!("Document {i} discusses tenant isolation and vector search"))
        .collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    embedder.embed_batch(&refs).unwrap()
}

fn descriptors(doc: &str, n: usize) -> Vec<ChunkDescriptor> {
    (0..n)
        .map(|i| ChunkDescriptor::new(format!("{doc}-{i}"), i as i64))
        .collect()
}

fn manager(tmp: &TempDir) -> IndexManager {
    IndexManager::new(IndexConfig::new(tmp.path()).with_sync(false))
}

fn bench_flat_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_search");

    let vectors = embeddings(10_000);
    let ids: Vec<u64> = (1..=vectors.len() as u64).collect();
    let index = FlatIndex::from_entries(DIM, &ids, &vectors).unwrap();
    let query = MockEmbedder::new(DIM).embed("tenant isolation").unwrap();

    group.bench_function("top10_of_10000", |b| {
        b.iter(|| index.search(black_box(&query), 10));
    });

    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    group.sample_size(20);

    let base = embeddings(1000);
    let batch = embeddings(50);
    let batch_entries = descriptors("new", batch.len());

    group.bench_function("50_into_1000", |b| {
        b.iter_batched(
            || {
                let tmp = TempDir::new().unwrap();
                let mgr = manager(&tmp);
                mgr.insert("t", "base", &descriptors("base", base.len()), &base)
                    .unwrap();
                (tmp, mgr)
            },
            |(_tmp, mgr)| mgr.insert("t", "new", black_box(&batch_entries), &batch),
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

fn bench_compaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("compaction");
    group.sample_size(20);

    let keep = embeddings(1000);
    let drop = embeddings(200);

    group.bench_function("delete_200_keep_1000", |b| {
        b.iter_batched(
            || {
                let tmp = TempDir::new().unwrap();
                let mgr = manager(&tmp);
                mgr.insert("t", "keep", &descriptors("keep", keep.len()), &keep)
                    .unwrap();
                mgr.insert("t", "drop", &descriptors("drop", drop.len()), &drop)
                    .unwrap();
                (tmp, mgr)
            },
            |(_tmp, mgr)| mgr.delete_by_document("t", black_box("drop")),
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

fn bench_retrieve(c: &mut Criterion) {
    let mut group = c.benchmark_group("retrieve");

    let tmp = TempDir::new().unwrap();
    let mgr = Arc::new(manager(&tmp));
    let vectors = embeddings(2000);
    mgr.insert("t", "doc", &descriptors("doc", vectors.len()), &vectors)
        .unwrap();
    let retriever = Retriever::new(mgr, RetrievalConfig::default()).unwrap();
    let query = vectors[42].clone();

    group.bench_function("threshold_top5_of_2000", |b| {
        b.iter(|| retriever.retrieve("t", black_box(&query)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_flat_search,
    bench_insert,
    bench_compaction,
    bench_retrieve
);
criterion_main!(benches);
