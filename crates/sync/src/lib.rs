//! Sync Manager: background FIFO replay of the WAL to the remote,
//! coordinated with the Health Monitor and Circuit Breaker (spec §4.5).

#![warn(missing_docs)]
#![warn(clippy::all)]

mod remote_sync;
mod sync_manager;

pub use remote_sync::RemoteSync;
pub use sync_manager::{SyncManager, SyncOutcome};
