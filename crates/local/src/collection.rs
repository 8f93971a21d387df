//! Shared on-disk layout: collection hashing, the metadata sidecar file,
//! and per-document file naming (spec §6, On-disk layout).

use contextd_core::{CollectionInfo, Document, MetadataValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the metadata sidecar file inside a collection directory.
pub const METADATA_FILENAME: &str = "00000000.bin";
/// Extension used for per-document files.
pub const DOCUMENT_EXT: &str = "bin";
/// Name of the quarantine sibling directory.
pub const QUARANTINE_DIR: &str = ".quarantine";

/// Derive the 8-char lowercase hex subdirectory name for a collection.
///
/// Not a cryptographic hash — collision resistance at this scale is not a
/// security property, just a stable, filesystem-safe bucket name.
pub fn collection_hash(name: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    format!("{:08x}", (hasher.finish() as u32))
}

/// Whether `name` matches the collection hash pattern `^[0-9a-f]{8}$`.
///
/// Used to keep quarantine and scanning from touching anything that isn't
/// a collection directory (defense against path injection, spec §4.7).
pub fn is_collection_hash(name: &str) -> bool {
    name.len() == 8 && name.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// The metadata sidecar stored at `<hash>/00000000.bin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMetadata {
    /// Collection name as the caller knows it.
    pub name: String,
    /// Configured vector dimensionality (unused by the reference engine —
    /// carried for `CollectionInfo` and size-mismatch validation).
    pub vector_size: usize,
}

impl CollectionMetadata {
    /// Build a [`CollectionInfo`] from this sidecar plus a live point count.
    pub fn to_info(&self, point_count: u64) -> CollectionInfo {
        CollectionInfo {
            name: self.name.clone(),
            point_count,
            vector_size: self.vector_size,
        }
    }
}

/// The per-document file stored at `<hash>/<doc-id>.bin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Document id (duplicated from the filename for self-description).
    pub id: String,
    /// Document text content.
    pub content: String,
    /// Arbitrary scalar metadata.
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl DocumentRecord {
    /// Build a record from an already-id-assigned document.
    pub fn from_document(id: String, doc: &Document) -> Self {
        Self {
            id,
            content: doc.content.clone(),
            metadata: doc.metadata.clone(),
        }
    }
}

/// Path to a collection's directory under `base`.
pub fn collection_dir(base: &Path, name: &str) -> PathBuf {
    base.join(collection_hash(name))
}

/// Path to a collection's metadata sidecar.
pub fn metadata_path(collection_dir: &Path) -> PathBuf {
    collection_dir.join(METADATA_FILENAME)
}

/// Path to one document's file within a collection directory.
pub fn document_path(collection_dir: &Path, doc_id: &str) -> PathBuf {
    collection_dir.join(format!("{doc_id}.{DOCUMENT_EXT}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_well_formed() {
        let h1 = collection_hash("docs");
        let h2 = collection_hash("docs");
        assert_eq!(h1, h2);
        assert!(is_collection_hash(&h1));
    }

    #[test]
    fn different_names_produce_different_hashes_usually() {
        assert_ne!(collection_hash("docs"), collection_hash("other"));
    }

    #[test]
    fn rejects_non_hash_looking_names() {
        assert!(!is_collection_hash(".quarantine"));
        assert!(!is_collection_hash("ABCDEF01"));
        assert!(!is_collection_hash("short"));
        assert!(!is_collection_hash("toolongforsure"));
    }
}
