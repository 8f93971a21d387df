//! Write-Ahead Log for contextd (spec §4.2)
//!
//! A directory of one file per entry plus one HMAC-key file:
//!
//! - [`Wal::write_entry`] — validate, scrub, checksum, atomically write
//! - [`Wal::load`] — enumerate `*.wal`, verify HMAC, drop corrupt entries
//! - [`Wal::pending_entries`] — FIFO subsequence of unsynced entries
//! - [`Wal::mark_synced`] / [`Wal::record_sync_attempt`] / [`Wal::compact`]
//!
//! Size and rate limits here are anti-DoS, not integrity mechanisms; the
//! HMAC + constant-time compare is what defends against tampering.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entry;
pub mod error;
pub mod hmac_key;
pub mod scrubber;
pub mod wal;

pub use entry::{WalEntry, WalOperation};
pub use error::{WalError, WalResult};
pub use scrubber::{RegexScrubber, Scrubber};
pub use wal::Wal;
