//! Integration tests for query string search
//!
//! Tests end-to-end query execution from parsing through to results, with
//! the fixture split across the Disk and Live segments.

use rtsearch::{Analyzer, Document, Engine, EngineConfig, Field, RtSearchError, SearchRequest};
use std::time::Duration;
use tempfile::TempDir;

fn create_doc(key: &str, content: &str, category: &str, year: &str) -> Document {
    Document::new(key)
        .with_text("content", content)
        .with_field(Field::new("category", category).with_analyzer(Analyzer::Keyword))
        .with_field(
            Field::new("year", year)
                .with_analyzer(Analyzer::Keyword)
                .sortable(),
        )
}

fn setup_test_index() -> (TempDir, Engine) {
    let tmp = TempDir::new().unwrap();
    let config = EngineConfig::new("query-test", tmp.path())
        .with_compaction_interval(Duration::from_secs(3600));
    let engine = Engine::open(config).unwrap();

    // First three reach Disk, the rest stay in Live
    let docs = vec![
        create_doc("1", "rust programming language systems", "science_fiction", "2015"),
        create_doc("2", "python programming scripting language", "fantasy", "1991"),
        create_doc("3", "rust systems programming performance", "science_fiction", "2018"),
    ];
    for doc in docs {
        engine.put(doc).unwrap();
    }
    engine.compact_now().unwrap();

    engine
        .put(create_doc("4", "javascript web programming frontend", "fantasy", "1995"))
        .unwrap();
    engine
        .put(create_doc("5", "rust cargo package manager", "science_fiction", "2016"))
        .unwrap();

    (tmp, engine)
}

fn search_keys(engine: &Engine, query: &str) -> Vec<String> {
    let response = engine
        .search(&SearchRequest::new(query).with_limit(100))
        .unwrap();
    let mut keys: Vec<String> = response.hits.into_iter().map(|h| h.key).collect();
    keys.sort();
    keys
}

#[test]
fn test_term_query() {
    let (_tmp, engine) = setup_test_index();

    // Should find docs 1, 3, 5 which contain "rust"
    assert_eq!(search_keys(&engine, "rust"), vec!["1", "3", "5"]);
    assert_eq!(search_keys(&engine, "content:RUST"), vec!["1", "3", "5"]);
}

#[test]
fn test_default_or() {
    let (_tmp, engine) = setup_test_index();
    assert_eq!(search_keys(&engine, "rust python"), vec!["1", "2", "3", "5"]);
}

#[test]
fn test_and_and_required() {
    let (_tmp, engine) = setup_test_index();
    assert_eq!(search_keys(&engine, "rust AND programming"), vec!["1", "3"]);
    assert_eq!(search_keys(&engine, "+rust +programming"), vec!["1", "3"]);
}

#[test]
fn test_not_and_prohibited() {
    let (_tmp, engine) = setup_test_index();
    assert_eq!(search_keys(&engine, "programming NOT rust"), vec!["2", "4"]);
    assert_eq!(search_keys(&engine, "programming -rust"), vec!["2", "4"]);
    // Purely negative: everything except rust docs
    assert_eq!(search_keys(&engine, "-rust"), vec!["2", "4"]);
}

#[test]
fn test_keyword_category_phrase() {
    let (_tmp, engine) = setup_test_index();
    assert_eq!(
        search_keys(&engine, "category:\"science_fiction\""),
        vec!["1", "3", "5"]
    );
    // Keyword fields are case sensitive
    assert!(search_keys(&engine, "category:Science_Fiction").is_empty());
}

#[test]
fn test_phrase_query() {
    let (_tmp, engine) = setup_test_index();
    assert_eq!(search_keys(&engine, "\"systems programming\""), vec!["3"]);
    // Terms must stay in order; doc 1 has one word between them
    assert_eq!(search_keys(&engine, "\"programming systems\"~1"), vec!["1"]);
    assert!(search_keys(&engine, "\"programming systems\"").is_empty());
    assert!(search_keys(&engine, "\"language rust\"").is_empty());
}

#[test]
fn test_prefix_wildcard_fuzzy() {
    let (_tmp, engine) = setup_test_index();
    assert_eq!(search_keys(&engine, "prog*"), vec!["1", "2", "3", "4"]);
    assert_eq!(search_keys(&engine, "ja?ascript"), vec!["4"]);
    assert_eq!(search_keys(&engine, "p*thon"), vec!["2"]);
    assert_eq!(search_keys(&engine, "rsut~2"), vec!["1", "3", "5"]);
}

#[test]
fn test_range_query() {
    let (_tmp, engine) = setup_test_index();
    assert_eq!(search_keys(&engine, "year:[2015 TO 2018]"), vec!["1", "3", "5"]);
    assert_eq!(search_keys(&engine, "year:{2015 TO 2018}"), vec!["5"]);
    assert_eq!(search_keys(&engine, "year:[* TO 2000}"), vec!["2", "4"]);
}

#[test]
fn test_grouping() {
    let (_tmp, engine) = setup_test_index();
    assert_eq!(
        search_keys(&engine, "programming AND (python OR javascript)"),
        vec!["2", "4"]
    );
    assert_eq!(
        search_keys(&engine, "category:(fantasy) AND web"),
        vec!["4"]
    );
}

#[test]
fn test_match_all_and_sort() {
    let (_tmp, engine) = setup_test_index();
    let request = SearchRequest::new("*:*").with_sort("year", false);
    let response = engine.search(&request).unwrap();
    assert_eq!(response.total, 5);
    assert_eq!(response.keys(), vec!["2", "4", "1", "5", "3"]);
}

#[test]
fn test_relevance_ranking() {
    let (_tmp, engine) = setup_test_index();
    let response = engine.search(&SearchRequest::new("rust^3 cargo")).unwrap();
    assert_eq!(response.total, 3);
    // Only doc 5 matches both clauses
    assert_eq!(response.hits[0].key, "5");
}

#[test]
fn test_stop_word_query_matches_nothing() {
    let (_tmp, engine) = setup_test_index();
    let response = engine.search(&SearchRequest::new("the")).unwrap();
    assert_eq!(response.total, 0);
}

#[test]
fn test_invalid_queries() {
    let (_tmp, engine) = setup_test_index();
    for query in ["", "content:(rust", "rust)", "AND rust", "year:[1 2]"] {
        let result = engine.search(&SearchRequest::new(query));
        assert!(
            matches!(result, Err(RtSearchError::InvalidQuery(_))),
            "query {:?} should be rejected",
            query
        );
    }
}
