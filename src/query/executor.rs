//! Query executor for running queries against a set of segments
//!
//! The executor parses the query once, executes it against every segment of
//! a snapshot and merges the per-segment matches into one globally ordered
//! page.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Instant;

use ordered_float::OrderedFloat;
use roaring::RoaringBitmap;

use crate::config::QueryConfig;
use crate::error::RtSearchError;
use crate::models::{SearchHit, SearchRequest, SearchResponse};
use crate::query::ast::QueryNode;
use crate::query::context::{CollectionStats, QueryContext};
use crate::query::query_string::QueryStringParser;
use crate::query::types::QueryStats;
use crate::schema::Schema;
use crate::segment::{DocNo, SegmentReader};
use crate::tokenizer::AnalyzerSet;
use crate::Result;

/// One segment of a search snapshot
#[derive(Clone, Debug)]
pub struct SegmentSnapshot {
    pub reader: Arc<SegmentReader>,
    /// Docnos a search may return from this segment
    pub visible: Arc<RoaringBitmap>,
}

/// Immutable read-set taken under the engine lock
///
/// Segments are listed newest first (Live, Frozen, Disk); relevance ties
/// resolve in that order.
#[derive(Clone, Debug, Default)]
pub struct SearchSnapshot {
    pub segments: Vec<SegmentSnapshot>,
    pub schema: Arc<Schema>,
}

impl SearchSnapshot {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// A hit position: segment index in the snapshot plus docno
type HitRef = (usize, u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ScoredHit {
    score: OrderedFloat<f32>,
    segment: usize,
    docno: u32,
}

impl Ord for ScoredHit {
    /// Greater is better: higher score, then earlier segment, then lower docno
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.segment.cmp(&self.segment))
            .then_with(|| other.docno.cmp(&self.docno))
    }
}

impl PartialOrd for ScoredHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct SortedHit {
    value: String,
    descending: bool,
    segment: usize,
    docno: u32,
}

impl Ord for SortedHit {
    /// Greater is better: first in the requested value order
    fn cmp(&self, other: &Self) -> Ordering {
        let by_value = if self.descending {
            self.value.cmp(&other.value)
        } else {
            other.value.cmp(&self.value)
        };
        by_value
            .then_with(|| other.segment.cmp(&self.segment))
            .then_with(|| other.docno.cmp(&self.docno))
    }
}

impl PartialOrd for SortedHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Keep the best `k` items pushed into a min-heap
fn push_bounded<T: Ord>(heap: &mut BinaryHeap<Reverse<T>>, item: T, k: usize) {
    if heap.len() < k {
        heap.push(Reverse(item));
    } else if let Some(Reverse(worst)) = heap.peek() {
        if item > *worst {
            heap.pop();
            heap.push(Reverse(item));
        }
    }
}

/// Query executor for running queries
pub struct QueryExecutor {
    analyzers: Arc<AnalyzerSet>,
    config: QueryConfig,
}

impl QueryExecutor {
    pub fn new(analyzers: Arc<AnalyzerSet>, config: QueryConfig) -> Self {
        Self { analyzers, config }
    }

    /// Parse `query` against the default field with the schema's analyzers
    pub fn parse(&self, query: &str, schema: &Schema) -> Result<Box<dyn QueryNode>> {
        QueryStringParser::new(query, schema, &self.analyzers)?
            .with_default_field(self.config.default_field.clone())
            .with_default_operator(self.config.default_operator)
            .parse()
    }

    /// Execute `request` over `snapshot`
    ///
    /// # Returns
    ///
    /// The true number of visible matches and the requested page, ordered by
    /// relevance or by the sort field's stored value.
    pub fn search(
        &self,
        snapshot: &SearchSnapshot,
        request: &SearchRequest,
    ) -> Result<SearchResponse> {
        let start = Instant::now();

        if request.query.trim().is_empty() {
            return Err(RtSearchError::InvalidQuery("Empty Query".to_string()));
        }
        if snapshot.is_empty() {
            return Ok(SearchResponse::empty());
        }

        let query = self.parse(&request.query, &snapshot.schema)?;
        let parse_time_us = start.elapsed().as_micros() as u64;

        let collection = Arc::new(CollectionStats::new(
            snapshot
                .segments
                .iter()
                .map(|s| Arc::clone(&s.reader))
                .collect(),
        ));
        let contexts: Vec<QueryContext> = snapshot
            .segments
            .iter()
            .map(|s| {
                QueryContext::new(
                    Arc::clone(&s.reader),
                    Arc::clone(&s.visible),
                    Arc::clone(&collection),
                    self.config.bm25.clone(),
                )
            })
            .collect();

        let execute_start = Instant::now();
        let mut matches = Vec::with_capacity(contexts.len());
        let mut total = 0u64;
        for ctx in &contexts {
            let mut docs = query.execute(ctx)?;
            docs &= ctx.visible();
            total += docs.len();
            matches.push(docs);
        }

        let k = request
            .offset
            .saturating_add(request.limit)
            .min(total as usize);
        let mut sorted = false;
        let ordered = if k == 0 {
            Vec::new()
        } else {
            let by_field = request.sort_field().and_then(|field| {
                self.collect_sorted(field, request.descending, snapshot, &matches, k)
            });
            match by_field {
                Some(hits) => {
                    sorted = true;
                    hits
                }
                None => self.collect_by_relevance(query.as_ref(), &contexts, &matches, k),
            }
        };

        let hits = ordered
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .map(|hit| resolve_hit(snapshot, hit, request.include_payload))
            .collect::<Result<Vec<_>>>()?;

        let stats = QueryStats {
            segments: contexts.len(),
            total_hits: total,
            sorted,
            parse_time_us,
            execute_time_us: execute_start.elapsed().as_micros() as u64,
        };
        tracing::debug!(query = %request.query, ?stats, "search executed");

        Ok(SearchResponse {
            total,
            hits,
            took_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Top `k` hits by score across all segments
    fn collect_by_relevance(
        &self,
        query: &dyn QueryNode,
        contexts: &[QueryContext],
        matches: &[RoaringBitmap],
        k: usize,
    ) -> Vec<HitRef> {
        let mut heap: BinaryHeap<Reverse<ScoredHit>> = BinaryHeap::with_capacity(k + 1);
        for (segment, (ctx, docs)) in contexts.iter().zip(matches).enumerate() {
            for docno in docs.iter() {
                let score = query.score(ctx, docno).unwrap_or(0.0);
                push_bounded(
                    &mut heap,
                    ScoredHit {
                        score: OrderedFloat(score),
                        segment,
                        docno,
                    },
                    k,
                );
            }
        }

        heap.into_sorted_vec()
            .into_iter()
            .map(|Reverse(hit)| (hit.segment, hit.docno))
            .collect()
    }

    /// Top `k` hits by stored sort value, or None to fall back to relevance
    fn collect_sorted(
        &self,
        field: &str,
        descending: bool,
        snapshot: &SearchSnapshot,
        matches: &[RoaringBitmap],
        k: usize,
    ) -> Option<Vec<HitRef>> {
        if !snapshot.schema.is_sortable(field) {
            tracing::warn!(field, "sort field is not sortable, ordering by relevance");
            return None;
        }

        let mut heap: BinaryHeap<Reverse<SortedHit>> = BinaryHeap::with_capacity(k + 1);
        for (segment, (seg, docs)) in snapshot.segments.iter().zip(matches).enumerate() {
            for docno in docs.iter() {
                let value = match seg.reader.sort_value(field, DocNo(docno)) {
                    Some(value) => value,
                    None => {
                        tracing::warn!(
                            field,
                            segment = %seg.reader.id(),
                            docno,
                            "hit has no sort value, ordering by relevance"
                        );
                        return None;
                    }
                };
                push_bounded(
                    &mut heap,
                    SortedHit {
                        value: value.to_string(),
                        descending,
                        segment,
                        docno,
                    },
                    k,
                );
            }
        }

        Some(
            heap.into_sorted_vec()
                .into_iter()
                .map(|Reverse(hit)| (hit.segment, hit.docno))
                .collect(),
        )
    }
}

/// Load the key, and the payload when asked, for one hit
fn resolve_hit(snapshot: &SearchSnapshot, hit: HitRef, include_payload: bool) -> Result<SearchHit> {
    let (segment, docno) = hit;
    let reader = &snapshot.segments[segment].reader;
    let key = reader.get_key(DocNo(docno)).ok_or_else(|| {
        RtSearchError::ConcurrentState(format!(
            "{} has no key for docno {}",
            reader.id(),
            docno
        ))
    })?;
    let payload = if include_payload {
        reader.payload(DocNo(docno)).map(|p| p.to_vec())
    } else {
        None
    };
    Ok(SearchHit {
        key: key.to_string(),
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, Field};
    use crate::segment::{AnalyzedDocument, MutableBuffer, SegmentId, SegmentWriter};

    fn segment(docs: &[Document], analyzers: &AnalyzerSet) -> SegmentSnapshot {
        let mut buffer = MutableBuffer::new();
        for doc in docs {
            buffer.upsert(AnalyzedDocument::analyze(doc, analyzers));
        }
        let reader = Arc::new(
            SegmentWriter::new(SegmentId::EPHEMERAL)
                .write_from_buffer(&buffer)
                .unwrap(),
        );
        let visible = Arc::new(reader.live_docs().clone());
        SegmentSnapshot { reader, visible }
    }

    fn book(key: &str, title: &str, year: &str) -> Document {
        Document::new(key)
            .with_text("title", title)
            .with_field(Field::new("year", year).with_analyzer(crate::tokenizer::Analyzer::Keyword).sortable())
            .with_payload(key.as_bytes().to_vec())
    }

    fn fixture() -> (QueryExecutor, SearchSnapshot) {
        let analyzers = Arc::new(AnalyzerSet::default());
        let newer = vec![book("dune", "Dune", "1965"), book("hyperion", "Hyperion", "1989")];
        let older = vec![
            book("messiah", "Dune Messiah", "1969"),
            book("children", "Children of Dune", "1976"),
            book("neuromancer", "Neuromancer", "1984"),
        ];

        let mut schema = Schema::new();
        for doc in newer.iter().chain(&older) {
            schema.learn(doc);
        }
        let snapshot = SearchSnapshot {
            segments: vec![segment(&newer, &analyzers), segment(&older, &analyzers)],
            schema: Arc::new(schema),
        };
        let config = QueryConfig {
            default_field: "title".to_string(),
            ..Default::default()
        };
        (QueryExecutor::new(analyzers, config), snapshot)
    }

    #[test]
    fn test_blank_query_rejected() {
        let (executor, snapshot) = fixture();
        let err = executor
            .search(&snapshot, &SearchRequest::new("   "))
            .unwrap_err();
        assert!(matches!(err, RtSearchError::InvalidQuery(ref m) if m == "Empty Query"));
    }

    #[test]
    fn test_empty_snapshot_skips_parsing() {
        let (executor, _) = fixture();
        let response = executor
            .search(&SearchSnapshot::default(), &SearchRequest::new("title:("))
            .unwrap();
        assert_eq!(response.total, 0);
        assert!(response.hits.is_empty());
    }

    #[test]
    fn test_search_spans_segments() {
        let (executor, snapshot) = fixture();
        let response = executor.search(&snapshot, &SearchRequest::new("dune")).unwrap();
        assert_eq!(response.total, 3);
        // Shortest title ranks first
        assert_eq!(response.hits[0].key, "dune");
        assert!(response.hits.iter().all(|h| h.payload.is_none()));
    }

    #[test]
    fn test_visible_set_hides_documents() {
        let (executor, mut snapshot) = fixture();
        let mut visible = (*snapshot.segments[1].visible).clone();
        visible.remove(0); // messiah
        snapshot.segments[1].visible = Arc::new(visible);

        let response = executor.search(&snapshot, &SearchRequest::new("dune")).unwrap();
        assert_eq!(response.total, 2);
        assert!(!response.keys().contains(&"messiah"));
    }

    #[test]
    fn test_sort_by_field() {
        let (executor, snapshot) = fixture();
        let request = SearchRequest::new("*:*").with_sort("year", true);
        let response = executor.search(&snapshot, &request).unwrap();
        assert_eq!(
            response.keys(),
            vec!["hyperion", "neuromancer", "children", "messiah", "dune"]
        );

        let request = SearchRequest::new("*:*").with_sort("year", false).with_limit(2);
        let response = executor.search(&snapshot, &request).unwrap();
        assert_eq!(response.keys(), vec!["dune", "messiah"]);
    }

    #[test]
    fn test_unsortable_field_falls_back_to_relevance() {
        let (executor, snapshot) = fixture();
        let request = SearchRequest::new("dune").with_sort("title", true);
        let response = executor.search(&snapshot, &request).unwrap();
        assert_eq!(response.total, 3);
        assert_eq!(response.hits[0].key, "dune");
    }

    #[test]
    fn test_pagination() {
        let (executor, snapshot) = fixture();
        for (offset, limit) in [(0, 2), (2, 2), (4, 2), (5, 3), (9, 1), (0, 0)] {
            let request = SearchRequest::new("*:*").with_offset(offset).with_limit(limit);
            let response = executor.search(&snapshot, &request).unwrap();
            assert_eq!(response.total, 5);
            assert_eq!(response.hits.len(), limit.min(5usize.saturating_sub(offset)));
        }
    }

    #[test]
    fn test_payload_resolution() {
        let (executor, snapshot) = fixture();
        let request = SearchRequest::new("title:hyperion").with_payload();
        let response = executor.search(&snapshot, &request).unwrap();
        assert_eq!(response.hits[0].payload.as_deref(), Some(&b"hyperion"[..]));
    }

    #[test]
    fn test_scored_hit_order() {
        let hit = |score: f32, segment, docno| ScoredHit {
            score: OrderedFloat(score),
            segment,
            docno,
        };
        assert!(hit(2.0, 1, 5) > hit(1.0, 0, 0));
        assert!(hit(1.0, 0, 5) > hit(1.0, 1, 0));
        assert!(hit(1.0, 0, 1) > hit(1.0, 0, 2));
    }
}
