use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use tempfile::TempDir;

use rtsearch::{Analyzer, Document, Engine, EngineConfig, Field, SearchRequest};

struct BenchEnv {
    _tmp: TempDir,
    engine: Engine,
}

const CATEGORIES: [&str; 4] = ["fiction", "history", "science", "poetry"];

fn make_doc(i: usize) -> Document {
    Document::new(format!("doc-{}", i))
        .with_text(
            "content",
            format!("rust programming language document number {} chapter {}", i, i % 97),
        )
        .with_field(
            Field::new("category", CATEGORIES[i % CATEGORIES.len()])
                .with_analyzer(Analyzer::Keyword),
        )
        .with_field(
            Field::new("year", format!("{}", 1900 + i % 120))
                .with_analyzer(Analyzer::Keyword)
                .sortable(),
        )
}

/// Half the documents on Disk, half in Live
fn build_env(doc_count: usize) -> BenchEnv {
    let tmp = TempDir::new().unwrap();
    let config = EngineConfig::new("bench", tmp.path())
        .with_compaction_interval(Duration::from_secs(3600));
    let engine = Engine::open(config).unwrap();

    for i in 0..doc_count {
        engine.put(make_doc(i)).unwrap();
        if i == doc_count / 2 {
            engine.compact_now().unwrap();
        }
    }

    BenchEnv { _tmp: tmp, engine }
}

fn bench_queries(c: &mut Criterion) {
    let counts = [1_000usize, 5_000];
    let envs: Vec<(usize, BenchEnv)> = counts.iter().map(|&n| (n, build_env(n))).collect();

    let queries = [
        ("term", "rust"),
        ("boolean", "rust AND chapter -history"),
        ("phrase", "\"programming language\""),
        ("prefix", "prog*"),
        ("fuzzy", "progamming~1"),
        ("range", "year:[1950 TO 1999]"),
    ];

    for (label, query) in queries {
        let mut group = c.benchmark_group(format!("search_{}", label));
        for (count, env) in envs.iter() {
            let request = SearchRequest::new(query);
            group.bench_with_input(BenchmarkId::from_parameter(count), env, |b, env| {
                b.iter(|| {
                    black_box(env.engine.search(&request).unwrap());
                });
            });
        }
        group.finish();
    }
}

fn bench_sorted_search(c: &mut Criterion) {
    let env = build_env(5_000);
    let request = SearchRequest::new("category:fiction")
        .with_sort("year", true)
        .with_limit(20);

    c.bench_function("sorted_search_5000", |b| {
        b.iter(|| {
            black_box(env.engine.search(&request).unwrap());
        });
    });
}

fn bench_put(c: &mut Criterion) {
    let env = build_env(0);
    let mut next = 0usize;

    c.bench_function("put", |b| {
        b.iter(|| {
            env.engine.put(black_box(make_doc(next % 10_000))).unwrap();
            next += 1;
        });
    });
}

fn bench_compaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("compaction");
    group.sample_size(10);
    group.bench_function("compact_2000", |b| {
        b.iter_with_setup(
            || build_env(2_000),
            |env| {
                black_box(env.engine.compact_now().unwrap());
            },
        );
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_queries,
    bench_sorted_search,
    bench_put,
    bench_compaction
);
criterion_main!(benches);
