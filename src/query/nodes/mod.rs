//! Concrete query node implementations
//!
//! This module provides implementations of the `QueryNode` trait for
//! various query types.

mod bool_query;
mod fuzzy_query;
mod phrase_query;
mod prefix_query;
mod range_query;
mod term_query;
mod wildcard_query;

pub use bool_query::BoolQuery;
pub use fuzzy_query::{FuzzyQuery, MAX_EDIT_DISTANCE};
pub use phrase_query::PhraseQuery;
pub use prefix_query::PrefixQuery;
pub use range_query::RangeQuery;
pub use term_query::TermQuery;
pub use wildcard_query::WildcardQuery;

use roaring::RoaringBitmap;

use crate::query::context::QueryContext;
use crate::segment::PostingListMeta;
use crate::Result;

/// Docnos holding any of `terms`, read straight from the segment
///
/// Multi-term expansions can touch many terms once each, so their postings
/// bypass the context's posting cache.
pub(crate) fn union_postings(
    ctx: &QueryContext,
    terms: &[(String, &PostingListMeta)],
) -> Result<RoaringBitmap> {
    let mut bitmap = RoaringBitmap::new();
    for (_, meta) in terms {
        for posting in ctx.reader().postings_for(meta)? {
            bitmap.insert(posting.docno.as_u32());
        }
    }
    Ok(bitmap)
}
