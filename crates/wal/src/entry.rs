//! `WalEntry`: the durable, HMAC-authenticated record of one pending
//! mutation (spec §3).

use chrono::{DateTime, Utc};
use contextd_core::Document;
use serde::{Deserialize, Serialize};

/// The operation a WAL entry records. Whitelist is exactly `{Add, Delete}`;
/// anything else is rejected on write and dropped on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalOperation {
    /// An `AddDocuments` mutation.
    Add,
    /// A `DeleteDocuments` mutation.
    Delete,
}

impl WalOperation {
    /// Parse from the on-disk tag string, used by callers that store the
    /// operation name separately from the typed enum (diagnostics, logs).
    pub fn as_str(&self) -> &'static str {
        match self {
            WalOperation::Add => "add",
            WalOperation::Delete => "delete",
        }
    }
}

/// A durable record of one pending (or already-synced) mutation.
///
/// Invariants (spec §3): `operation` is in the whitelist; `checksum` equals
/// `HMAC(id, operation, RFC3339Nano timestamp, and for add: each doc's
/// id||content; for delete: each id)`; a synced entry stays on disk until
/// compacted; entries are independent files named `<id>.wal` with mode
/// 0600.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    /// Entry id (also the filename stem, `<id>.wal`).
    pub id: String,
    /// The mutation kind this entry records.
    pub operation: WalOperation,
    /// Documents for an `Add` entry.
    pub docs: Option<Vec<Document>>,
    /// Ids for a `Delete` entry.
    pub ids: Option<Vec<String>>,
    /// When the entry was created.
    pub timestamp: DateTime<Utc>,
    /// Whether the remote has successfully applied this mutation.
    pub synced: bool,
    /// 32-byte HMAC-SHA256 over the fields above (see [`crate::wal::compute_checksum`]).
    pub checksum: [u8; 32],
    /// Remote-side existence, as last observed by the sync manager.
    pub remote_state: RemoteState,
    /// Number of sync attempts made so far.
    pub sync_attempts: u32,
    /// Timestamp of the last sync attempt, if any.
    pub last_attempt: Option<DateTime<Utc>>,
    /// Error string from the most recent failed sync attempt, if any.
    pub sync_error: Option<String>,
}

/// What the sync manager last observed about this entry's remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteState {
    /// Not yet checked.
    Unknown,
    /// Confirmed present on the remote.
    Exists,
    /// Confirmed absent on the remote.
    Deleted,
}

impl WalEntry {
    /// Construct a pending `Add` entry (checksum not yet computed — callers
    /// go through [`crate::wal::Wal::write_entry`], which computes and signs
    /// it).
    pub fn new_add(id: impl Into<String>, docs: Vec<Document>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            operation: WalOperation::Add,
            docs: Some(docs),
            ids: None,
            timestamp,
            synced: false,
            checksum: [0u8; 32],
            remote_state: RemoteState::Unknown,
            sync_attempts: 0,
            last_attempt: None,
            sync_error: None,
        }
    }

    /// Construct a pending `Delete` entry.
    pub fn new_delete(id: impl Into<String>, ids: Vec<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            operation: WalOperation::Delete,
            docs: None,
            ids: Some(ids),
            timestamp,
            synced: false,
            checksum: [0u8; 32],
            remote_state: RemoteState::Unknown,
            sync_attempts: 0,
            last_attempt: None,
            sync_error: None,
        }
    }
}
