pub mod document;
pub mod search;

pub use document::{Document, Field};
pub use search::{SearchHit, SearchRequest, SearchResponse};
