//! Versioned binary index format.
//!
//! ```text
//! i32  version
//! i32  document count, then per document:
//!        string id, u8 has_metadata, [string metadata]
//! i32  hash count, then per hash: string id, string hash
//! i32  entry count, then per entry:
//!        i64 key, i32 crc, i32 type, i32 document index, i32 score
//! i32  keyword count, then per keyword: string
//! ```
//!
//! All integers are little-endian; strings are an `i32` byte length followed
//! by UTF-8 bytes. A version mismatch rejects the whole stream.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{QuarryError, Result};
use crate::index::document::{DocumentTable, SearchDocument};
use crate::index::entry::{IndexEntry, IndexType};
use crate::index::store::IndexStore;
use crate::storage::structured::{StructReader, StructWriter};

/// Current format version. Bump on any layout change.
pub const INDEX_VERSION: i32 = 0x5152_0003;

/// Serialize a store.
pub fn write_index<W: Write>(store: &IndexStore, writer: W) -> Result<W> {
    let mut writer = StructWriter::new(writer);
    writer.write_i32(INDEX_VERSION)?;

    writer.write_len(store.documents.len())?;
    for document in store.documents.iter() {
        writer.write_string(&document.id)?;
        match &document.metadata {
            Some(metadata) => {
                writer.write_bool(true)?;
                writer.write_string(metadata)?;
            }
            None => writer.write_bool(false)?,
        }
    }

    // Sorted so that identical stores serialize to identical bytes
    let mut hashes: Vec<(&String, &String)> = store.hashes.iter().collect();
    hashes.sort();
    writer.write_len(hashes.len())?;
    for (id, hash) in hashes {
        writer.write_string(id)?;
        writer.write_string(hash)?;
    }

    writer.write_len(store.entries.len())?;
    for entry in store.entries.iter() {
        writer.write_i64(entry.key as i64)?;
        writer.write_i32(entry.crc)?;
        writer.write_i32(entry.kind as i32)?;
        writer.write_i32(entry.index)?;
        writer.write_i32(entry.score)?;
    }

    writer.write_len(store.keywords.len())?;
    for keyword in &store.keywords {
        writer.write_string(keyword)?;
    }

    writer.finish()
}

/// Serialize a store into a new buffer.
pub fn to_bytes(store: &IndexStore) -> Result<Vec<u8>> {
    write_index(store, Vec::new())
}

/// Read only the version field and report whether it is compatible.
pub fn check_version<R: Read>(reader: R) -> Result<bool> {
    let mut reader = StructReader::new(reader);
    Ok(reader.read_i32()? == INDEX_VERSION)
}

/// Deserialize a full store. Nothing is returned unless every section parsed.
pub fn read_index<R: Read>(reader: R) -> Result<IndexStore> {
    let mut reader = StructReader::new(reader);

    let version = reader.read_i32()?;
    if version != INDEX_VERSION {
        return Err(QuarryError::VersionMismatch {
            expected: INDEX_VERSION,
            actual: version,
        });
    }

    let document_count = reader.read_len()?;
    let mut documents = Vec::with_capacity(document_count.min(1 << 16));
    for _ in 0..document_count {
        let id = reader.read_string()?;
        let metadata = if reader.read_bool()? {
            Some(reader.read_string()?)
        } else {
            None
        };
        documents.push(SearchDocument::new(id, metadata));
    }

    let hash_count = reader.read_len()?;
    let mut hashes = AHashMap::with_capacity(hash_count.min(1 << 16));
    for _ in 0..hash_count {
        let id = reader.read_string()?;
        let hash = reader.read_string()?;
        hashes.insert(id, hash);
    }

    let entry_count = reader.read_len()?;
    let mut entries = Vec::with_capacity(entry_count.min(1 << 20));
    for _ in 0..entry_count {
        let key = reader.read_i64()? as u64;
        let crc = reader.read_i32()?;
        let raw_kind = reader.read_i32()?;
        let kind = IndexType::from_i32(raw_kind)
            .ok_or_else(|| QuarryError::format(format!("unknown entry type {raw_kind}")))?;
        let index = reader.read_i32()?;
        let score = reader.read_i32()?;
        if index < 0 || index as usize >= document_count {
            return Err(QuarryError::format(format!(
                "entry refers to document {index}, but only {document_count} exist"
            )));
        }
        entries.push(IndexEntry::new(key, crc, kind, index, score));
    }

    let keyword_count = reader.read_len()?;
    let mut keywords = BTreeSet::new();
    for _ in 0..keyword_count {
        keywords.insert(reader.read_string()?);
    }

    Ok(IndexStore {
        entries: Arc::new(entries),
        documents: DocumentTable::from_documents(documents),
        hashes,
        keywords,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> IndexStore {
        let mut store = IndexStore::new();
        store.documents.add("a.png", None, true);
        store.documents.add("b.prefab", Some("meta".to_string()), true);
        store.hashes.insert("a.png".to_string(), "h1".to_string());
        store.entries = Arc::new(vec![
            IndexEntry::new(42, 3, IndexType::Word, 0, 100),
            IndexEntry::from_number(-1.5, 9, 1, 100),
        ]);
        store.keywords.insert("t:prefab".to_string());
        store
    }

    #[test]
    fn test_roundtrip() {
        let store = sample_store();
        let bytes = to_bytes(&store).unwrap();
        let loaded = read_index(bytes.as_slice()).unwrap();

        assert_eq!(loaded.documents.len(), 2);
        assert_eq!(loaded.documents.find("b.prefab"), Some(1));
        assert_eq!(
            loaded.documents.get(1).unwrap().metadata.as_deref(),
            Some("meta")
        );
        assert_eq!(loaded.hashes.get("a.png").map(String::as_str), Some("h1"));
        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded.entries[1].number(), -1.5);
        assert_eq!(loaded.entries[0].score, 100);
        assert!(loaded.keywords.contains("t:prefab"));
    }

    #[test]
    fn test_check_version_reads_only_header() {
        let bytes = to_bytes(&sample_store()).unwrap();
        let mut slice = bytes.as_slice();
        assert!(check_version(&mut slice).unwrap());
        assert_eq!(slice.len(), bytes.len() - 4);

        let foreign = 7i32.to_le_bytes();
        assert!(!check_version(&foreign[..]).unwrap());
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut bytes = to_bytes(&sample_store()).unwrap();
        bytes[0] ^= 0xff;
        let err = read_index(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, QuarryError::VersionMismatch { .. }));
    }

    #[test]
    fn test_truncated_stream_rejected() {
        let bytes = to_bytes(&sample_store()).unwrap();
        for cut in [3, 10, bytes.len() - 1] {
            let err = read_index(&bytes[..cut]).unwrap_err();
            assert!(err.is_format_error(), "cut at {cut}: {err}");
        }
    }
}
