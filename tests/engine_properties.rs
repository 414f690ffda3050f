//! Engine-level guarantees checked through the public API
//!
//! Each test drives an engine with a long compaction interval so that every
//! cycle is started explicitly with `compact_now`.

use rtsearch::{
    Analyzer, CompactionPhase, Document, Engine, EngineConfig, Field, RtSearchError,
    SearchRequest,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn open_engine(tmp: &TempDir) -> Engine {
    let config = EngineConfig::new("props", tmp.path())
        .with_compaction_interval(Duration::from_secs(3600));
    Engine::open(config).unwrap()
}

fn book(key: &str, title: &str, category: &str) -> Document {
    Document::new(key)
        .with_text("content", title)
        .with_field(Field::new("category", category).with_analyzer(Analyzer::Keyword))
}

fn total(engine: &Engine, query: &str) -> u64 {
    engine.search(&SearchRequest::new(query)).unwrap().total
}

fn all_keys(engine: &Engine, query: &str) -> HashSet<String> {
    let request = SearchRequest::new(query).with_limit(10_000);
    engine
        .search(&request)
        .unwrap()
        .hits
        .into_iter()
        .map(|h| h.key)
        .collect()
}

#[test]
fn test_read_your_writes() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp);

    for i in 0..20 {
        let key = format!("doc-{}", i);
        engine.put(book(&key, &format!("unique{} shared", i), "misc")).unwrap();
        // Visible to the very next search without any compaction
        assert_eq!(total(&engine, &format!("unique{}", i)), 1);
        assert_eq!(total(&engine, "shared"), i as u64 + 1);
    }
}

#[test]
fn test_update_overwrites_in_every_segment() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp);

    engine.put(book("k", "original text", "a")).unwrap();
    engine.compact_now().unwrap();
    assert_eq!(total(&engine, "original"), 1);

    // The new copy lives in Live, the old one on Disk
    engine.put(book("k", "replacement text", "b")).unwrap();
    assert_eq!(total(&engine, "original"), 0);
    assert_eq!(total(&engine, "replacement"), 1);
    assert_eq!(total(&engine, "text"), 1);

    engine.compact_now().unwrap();
    assert_eq!(total(&engine, "original"), 0);
    assert_eq!(total(&engine, "text"), 1);
    assert_eq!(engine.stats().disk_docs, 1);
}

#[test]
fn test_repeated_updates_in_live() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp);

    for version in 0..5 {
        engine
            .put(book("same", &format!("version{} body", version), "x"))
            .unwrap();
    }
    assert_eq!(total(&engine, "body"), 1);
    assert_eq!(total(&engine, "version4"), 1);
    assert_eq!(total(&engine, "version0"), 0);
}

#[test]
fn test_delete_is_durable_across_compaction() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp);

    engine.put(book("gone", "ephemeral words", "x")).unwrap();
    engine.put(book("kept", "ephemeral survivor", "x")).unwrap();
    engine.compact_now().unwrap();

    engine.remove("gone").unwrap();
    assert_eq!(all_keys(&engine, "ephemeral"), HashSet::from(["kept".to_string()]));
    assert_eq!(engine.stats().pending_deletes, 1);

    engine.compact_now().unwrap();
    assert_eq!(all_keys(&engine, "ephemeral"), HashSet::from(["kept".to_string()]));
    assert_eq!(engine.stats().pending_deletes, 0);
    assert_eq!(engine.stats().disk_docs, 1);
    assert_eq!(engine.get_payload("gone").unwrap(), None);
}

#[test]
fn test_remove_unknown_key_is_noop() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp);

    engine.put(book("a", "hello", "x")).unwrap();
    engine.remove("never-written").unwrap();
    assert_eq!(total(&engine, "hello"), 1);
}

#[test]
fn test_put_after_remove_restores_document() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp);

    engine.put(book("phoenix", "first life", "x")).unwrap();
    engine.compact_now().unwrap();
    engine.remove("phoenix").unwrap();
    assert_eq!(total(&engine, "life"), 0);

    engine.put(book("phoenix", "second life", "x")).unwrap();
    assert_eq!(total(&engine, "life"), 1);
    assert_eq!(total(&engine, "first"), 0);

    engine.compact_now().unwrap();
    assert_eq!(total(&engine, "second"), 1);
    assert_eq!(total(&engine, "first"), 0);
}

#[test]
fn test_pagination_pages_partition_results() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp);

    for i in 0..25 {
        let doc = book(&format!("p{:02}", i), "paged item", "x")
            .with_field(Field::new("rank", format!("{:03}", i)).with_analyzer(Analyzer::Keyword).sortable());
        engine.put(doc).unwrap();
        if i == 12 {
            engine.compact_now().unwrap();
        }
    }

    let mut seen = Vec::new();
    for page in 0..3 {
        let request = SearchRequest::new("paged")
            .with_sort("rank", false)
            .with_offset(page * 10)
            .with_limit(10);
        let response = engine.search(&request).unwrap();
        assert_eq!(response.total, 25);
        seen.extend(response.hits.into_iter().map(|h| h.key));
    }

    let expected: Vec<String> = (0..25).map(|i| format!("p{:02}", i)).collect();
    assert_eq!(seen, expected);

    // Past the end is empty but still reports the total
    let response = engine
        .search(&SearchRequest::new("paged").with_offset(100))
        .unwrap();
    assert_eq!(response.total, 25);
    assert!(response.hits.is_empty());
}

#[test]
fn test_category_results_stable_across_compaction() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp);

    for i in 0..100 {
        let category = if i % 2 == 0 { "fiction" } else { "reference" };
        engine
            .put(book(&format!("book-{}", i), &format!("volume {}", i), category))
            .unwrap();
    }

    let request = SearchRequest::new("category:fiction");
    let before = engine.search(&request).unwrap();
    assert_eq!(before.total, 50);
    assert_eq!(before.hits.len(), 10);
    let before_all = all_keys(&engine, "category:fiction");

    let report = engine.compact_now().unwrap().expect("pending work");
    assert_eq!(report.docs, 100);

    let after = engine.search(&request).unwrap();
    assert_eq!(after.total, 50);
    assert_eq!(after.hits.len(), 10);
    assert_eq!(all_keys(&engine, "category:fiction"), before_all);
    assert!(before_all.iter().all(|k| {
        let n: u32 = k.trim_start_matches("book-").parse().unwrap();
        n % 2 == 0
    }));
}

#[test]
fn test_compact_now_without_work() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp);
    assert!(engine.compact_now().unwrap().is_none());
    assert_eq!(engine.stats().phase, CompactionPhase::Idle);
}

#[test]
fn test_payload_follows_latest_version() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp);

    engine
        .put(book("p", "payload doc", "x").with_payload(b"v1".to_vec()))
        .unwrap();
    engine.compact_now().unwrap();
    engine
        .put(book("p", "payload doc", "x").with_payload(b"v2".to_vec()))
        .unwrap();

    assert_eq!(engine.get_payload("p").unwrap(), Some(b"v2".to_vec()));
    let response = engine
        .search(&SearchRequest::new("payload").with_payload())
        .unwrap();
    assert_eq!(response.hits.len(), 1);
    assert_eq!(response.hits[0].payload.as_deref(), Some(&b"v2"[..]));
}

#[test]
fn test_shutdown_is_idempotent_and_durable() {
    let tmp = TempDir::new().unwrap();
    {
        let engine = open_engine(&tmp);
        engine.put(book("a", "persisted alpha", "x")).unwrap();
        engine.put(book("b", "persisted beta", "x")).unwrap();
        engine.compact_now().unwrap();
        engine.put(book("c", "persisted gamma", "x")).unwrap();
        engine.remove("a").unwrap();

        engine.shutdown().unwrap();
        engine.shutdown().unwrap();
        assert!(engine.is_shut_down());
        assert!(matches!(
            engine.put(book("d", "late", "x")),
            Err(RtSearchError::ShutDown)
        ));
        assert!(matches!(
            engine.search(&SearchRequest::new("persisted")),
            Err(RtSearchError::ShutDown)
        ));
    }

    let engine = open_engine(&tmp);
    let keys = all_keys(&engine, "persisted");
    assert_eq!(keys, HashSet::from(["b".to_string(), "c".to_string()]));
    assert_eq!(engine.stats().disk_docs, 2);
}

#[test]
fn test_concurrent_writers_and_readers() {
    let tmp = TempDir::new().unwrap();
    let engine = Arc::new(open_engine(&tmp));

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..50 {
                    engine
                        .put(book(&format!("t{}-{}", t, i), "concurrent entry", "x"))
                        .unwrap();
                }
            })
        })
        .collect();

    let reader = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            let mut last = 0;
            for _ in 0..50 {
                let seen = total(&engine, "concurrent");
                assert!(seen >= last, "visible count went backwards");
                last = seen;
            }
        })
    };

    let compactor = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for _ in 0..3 {
                engine.compact_now().unwrap();
            }
        })
    };

    for w in writers {
        w.join().unwrap();
    }
    reader.join().unwrap();
    compactor.join().unwrap();

    assert_eq!(total(&engine, "concurrent"), 200);
    engine.compact_now().unwrap();
    assert_eq!(total(&engine, "concurrent"), 200);
    assert_eq!(engine.stats().disk_docs, 200);
}
