//! Field schema
//!
//! The schema is learned from writes: every field seen on a document records
//! the analyzer it was indexed with and whether it carries a sort value. It is
//! persisted in the segment manifest so queries keep analyzing fields the same
//! way after a restart.

mod mapping;

pub use mapping::{FieldInfo, Schema, KEY_FIELD};
