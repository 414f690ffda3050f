//! Dense document number mapping
//!
//! Each segment allocates a dense `docno: u32` in `[0..max_doc)` space and
//! keeps a `docno -> key` array plus a delete bitset. Keys are also indexed as
//! `__KEY__:{key}` terms, which is how deletes find their docnos.

use std::collections::HashMap;
use std::io;

use roaring::RoaringBitmap;

use super::postings::{decode_vbyte, encode_vbyte};
use super::types::DocNo;

/// Dense document number mapping for a segment
#[derive(Clone, Debug, Default)]
pub struct DocNoMap {
    /// Dense array: docno -> key
    keys: Vec<String>,
    /// Delete bitset: which docnos are deleted
    deleted: RoaringBitmap,
}

impl DocNoMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            deleted: RoaringBitmap::new(),
        }
    }

    /// Add a new document and return its docno
    pub fn add(&mut self, key: impl Into<String>) -> DocNo {
        let docno = DocNo::new(self.keys.len() as u32);
        self.keys.push(key.into());
        docno
    }

    /// Get the key for a docno
    pub fn get_key(&self, docno: DocNo) -> Option<&str> {
        self.keys.get(docno.as_usize()).map(String::as_str)
    }

    /// Mark a docno as deleted
    pub fn delete(&mut self, docno: DocNo) {
        if docno.as_usize() < self.keys.len() {
            self.deleted.insert(docno.as_u32());
        }
    }

    /// Mark every docno in `docnos` as deleted
    pub fn delete_all(&mut self, docnos: &RoaringBitmap) {
        for docno in docnos {
            self.delete(DocNo(docno));
        }
    }

    /// Check if a docno is deleted
    pub fn is_deleted(&self, docno: DocNo) -> bool {
        self.deleted.contains(docno.as_u32())
    }

    /// Check if a docno is live (exists and not deleted)
    pub fn is_live(&self, docno: DocNo) -> bool {
        docno.as_usize() < self.keys.len() && !self.deleted.contains(docno.as_u32())
    }

    /// Get the number of documents (including deleted)
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Get the number of live documents (excluding deleted)
    pub fn live_count(&self) -> usize {
        self.keys.len() - self.deleted.len() as usize
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.len() as usize
    }

    /// Get the delete bitset
    pub fn deleted_bitset(&self) -> &RoaringBitmap {
        &self.deleted
    }

    /// Bitmap of every live docno
    pub fn live_bitmap(&self) -> RoaringBitmap {
        let mut live = RoaringBitmap::new();
        live.insert_range(0..self.keys.len() as u32);
        live -= &self.deleted;
        live
    }

    /// Serialize to bytes
    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let mut output = Vec::new();

        encode_vbyte(self.keys.len() as u32, &mut output);

        for key in &self.keys {
            encode_vbyte(key.len() as u32, &mut output);
            output.extend_from_slice(key.as_bytes());
        }

        let mut delete_bytes = Vec::with_capacity(self.deleted.serialized_size());
        self.deleted.serialize_into(&mut delete_bytes)?;
        encode_vbyte(delete_bytes.len() as u32, &mut output);
        output.extend(delete_bytes);

        Ok(output)
    }

    /// Deserialize from bytes
    pub fn deserialize(data: &[u8]) -> io::Result<Self> {
        let mut pos = 0;

        let count = decode_vbyte(data, &mut pos)? as usize;

        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            let len = decode_vbyte(data, &mut pos)? as usize;
            let bytes = data.get(pos..pos + len).ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "Not enough data for docno entry")
            })?;
            pos += len;
            let key = String::from_utf8(bytes.to_vec())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            keys.push(key);
        }

        let delete_len = decode_vbyte(data, &mut pos)? as usize;
        let delete_bytes = data.get(pos..pos + delete_len).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "Not enough data for delete bitset")
        })?;
        let deleted = RoaringBitmap::deserialize_from(delete_bytes)?;

        Ok(Self { keys, deleted })
    }

    /// Concatenate the kept docnos of several maps into a new dense map
    ///
    /// Returns the merged map and, per source, an old-to-new docno table where
    /// dropped documents map to `DocNo::MAX`.
    pub fn merge(sources: &[(&DocNoMap, &RoaringBitmap)]) -> (DocNoMap, Vec<Vec<DocNo>>) {
        let capacity = sources.iter().map(|(_, keep)| keep.len() as usize).sum();
        let mut merged = DocNoMap::with_capacity(capacity);
        let mut remaps = Vec::with_capacity(sources.len());

        for (map, keep) in sources {
            let mut remap = vec![DocNo::MAX; map.len()];
            for old in keep.iter() {
                let old = DocNo(old);
                if let Some(key) = map.get_key(old) {
                    remap[old.as_usize()] = merged.add(key);
                }
            }
            remaps.push(remap);
        }

        (merged, remaps)
    }
}

/// Builder for DocNoMap that tracks key -> docno for upserts
#[derive(Debug, Default)]
pub struct DocNoMapBuilder {
    map: DocNoMap,
    /// Latest docno for each key
    key_to_docno: HashMap<String, DocNo>,
}

impl DocNoMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document, deleting any earlier docno with the same key
    ///
    /// Returns the new docno and the one it replaced.
    pub fn upsert(&mut self, key: &str) -> (DocNo, Option<DocNo>) {
        let previous = self.delete_by_key(key);
        let docno = self.map.add(key);
        self.key_to_docno.insert(key.to_string(), docno);
        (docno, previous)
    }

    /// Look up the live docno for a key
    pub fn get_docno(&self, key: &str) -> Option<DocNo> {
        self.key_to_docno.get(key).copied()
    }

    /// Mark a document as deleted by key
    pub fn delete_by_key(&mut self, key: &str) -> Option<DocNo> {
        let docno = self.key_to_docno.remove(key)?;
        self.map.delete(docno);
        Some(docno)
    }

    /// Get reference to the underlying map
    pub fn map(&self) -> &DocNoMap {
        &self.map
    }

    pub fn build(self) -> DocNoMap {
        self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docno_map_basic() {
        let mut map = DocNoMap::new();

        let docno1 = map.add("a");
        let docno2 = map.add("b");
        let docno3 = map.add("c");

        assert_eq!(docno1, DocNo::new(0));
        assert_eq!(docno2, DocNo::new(1));
        assert_eq!(docno3, DocNo::new(2));

        assert_eq!(map.get_key(docno1), Some("a"));
        assert_eq!(map.get_key(docno3), Some("c"));
        assert_eq!(map.get_key(DocNo::new(9)), None);

        assert_eq!(map.len(), 3);
        assert_eq!(map.live_count(), 3);
    }

    #[test]
    fn test_docno_map_delete() {
        let mut map = DocNoMap::new();

        map.add("a");
        let docno2 = map.add("b");
        map.add("c");

        assert!(map.is_live(docno2));
        map.delete(docno2);
        // Out of range deletes are ignored
        map.delete(DocNo::new(50));

        assert!(map.is_deleted(docno2));
        assert!(!map.is_live(docno2));
        assert_eq!(map.live_count(), 2);
        assert_eq!(map.deleted_count(), 1);
        assert_eq!(map.live_bitmap().iter().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_docno_map_serialization() {
        let mut map = DocNoMap::new();

        map.add("doc-1");
        map.add("документ");
        let docno3 = map.add("");
        map.delete(docno3);

        let data = map.serialize().unwrap();
        let restored = DocNoMap::deserialize(&data).unwrap();

        assert_eq!(restored.len(), 3);
        assert_eq!(restored.get_key(DocNo::new(1)), Some("документ"));
        assert!(restored.is_deleted(DocNo::new(2)));
        assert!(DocNoMap::deserialize(&data[..data.len() - 3]).is_err());
    }

    #[test]
    fn test_docno_map_merge() {
        let mut map1 = DocNoMap::new();
        map1.add("a");
        let docno = map1.add("b");
        map1.delete(docno);
        map1.add("c");

        let mut map2 = DocNoMap::new();
        map2.add("d");
        map2.add("e");

        let keep1 = map1.live_bitmap();
        let mut keep2 = map2.live_bitmap();
        keep2.remove(0);

        let (merged, remaps) = DocNoMap::merge(&[(&map1, &keep1), (&map2, &keep2)]);

        assert_eq!(merged.len(), 3);
        assert_eq!(remaps[0], vec![DocNo(0), DocNo::MAX, DocNo(1)]);
        assert_eq!(remaps[1], vec![DocNo::MAX, DocNo(2)]);
        assert_eq!(merged.get_key(DocNo(2)), Some("e"));
    }

    #[test]
    fn test_docno_map_builder_upsert() {
        let mut builder = DocNoMapBuilder::new();

        let (first, replaced) = builder.upsert("k1");
        assert!(replaced.is_none());
        let (second, replaced) = builder.upsert("k1");
        assert_eq!(replaced, Some(first));
        assert_eq!(builder.get_docno("k1"), Some(second));

        assert_eq!(builder.delete_by_key("k1"), Some(second));
        assert_eq!(builder.delete_by_key("k1"), None);

        let map = builder.build();
        assert_eq!(map.len(), 2);
        assert_eq!(map.live_count(), 0);
    }
}
