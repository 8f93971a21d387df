//! The narrow remote-side contract the Sync Manager needs: idempotent
//! upsert-by-id and delete-by-id. Deliberately smaller than the full
//! `Store` trait — the sync manager never searches or administers
//! collections, only replays pending mutations.

use async_trait::async_trait;
use contextd_core::Document;
use contextd_core::Result;

/// What the Sync Manager dispatches `WalEntry` replay to.
#[async_trait]
pub trait RemoteSync: Send + Sync {
    /// Upsert documents by id. Must be idempotent — at-least-once delivery
    /// is assumed (spec §1, Non-goals).
    async fn upsert_documents(&self, docs: Vec<Document>) -> Result<Vec<String>>;

    /// Delete documents by id.
    async fn delete_documents(&self, ids: Vec<String>) -> Result<()>;
}
