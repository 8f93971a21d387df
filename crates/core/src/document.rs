//! Wire-level data model: documents, search results, collection metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A metadata value, as carried on the wire.
///
/// `BTreeMap`-backed metadata (not `HashMap`) for deterministic iteration,
/// matching Invariant R3 style determinism used elsewhere in the pack's
/// vector-store facades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// UTF-8 string.
    String(String),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Boolean.
    Bool(bool),
}

impl MetadataValue {
    /// Render as a string, the lowering target for richer types per spec §3.
    pub fn to_lossy_string(&self) -> String {
        match self {
            MetadataValue::String(s) => s.clone(),
            MetadataValue::Int(i) => i.to_string(),
            MetadataValue::Float(f) => f.to_string(),
            MetadataValue::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

/// Metadata map attached to a document or carried on a search result.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A document submitted for ingestion.
///
/// `id` is caller-assigned; if absent the Store synthesizes a unique id and
/// surfaces a warning-class event (spec §3). `collection` optionally
/// overrides the default target; every document in one batch must target
/// the same collection (enforced by callers of [`crate::store::Store::add_documents`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Caller-assigned id, or `None` to request a synthesized one.
    pub id: Option<String>,
    /// Document text content.
    pub content: String,
    /// Arbitrary scalar metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Optional collection override.
    pub collection: Option<String>,
}

impl Document {
    /// Construct a document with the given content and no id/metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: None,
            content: content.into(),
            metadata: Metadata::new(),
            collection: None,
        }
    }

    /// Builder: set the id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder: set the collection override.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }
}

/// A single search hit.
///
/// `score` is a similarity in `[0, 1]` where higher is more relevant (spec
/// §3). The merge strategy (spec §4.6) tags `metadata["source"]` with
/// `"merged"` or `"local"`, and sets `metadata["stale_warning"]` on the
/// local-fallback path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Document id.
    pub id: String,
    /// Document content.
    pub content: String,
    /// Similarity score in `[0, 1]`, higher is more relevant.
    pub score: f32,
    /// Metadata, including any `source`/`pending_count`/`stale_warning`
    /// tags applied by the merge strategy.
    pub metadata: Metadata,
}

/// Administrative info about one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Number of points (documents) currently stored.
    pub point_count: u64,
    /// Configured vector dimensionality.
    pub vector_size: usize,
}

/// Validate a collection name against `^[a-z0-9_]{1,64}$` (spec §3).
///
/// Rejects uppercase, path separators, and traversal sequences by
/// construction (the charset excludes `/`, `\\`, and `.`).
pub fn validate_collection_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }
    name.bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}
