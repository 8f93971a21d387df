//! Length-prefixed `bincode` framing over a byte stream.
//!
//! This is a reference transport, not a specification of the real remote
//! vector database's wire protocol (spec §1, external collaborator).

use contextd_core::{CollectionInfo, Document, SearchResult};
use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame payload size accepted from the wire (anti-DoS, mirrors the
/// WAL's own size caps).
pub const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// One request sent to the reference remote server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Upsert documents (already tenant-stamped) into a collection.
    Upsert {
        /// Target collection name.
        collection: String,
        /// Documents to upsert, already carrying any caller-assigned ids.
        docs: Vec<Document>,
    },
    /// Delete documents by id from a collection.
    Delete {
        /// Target collection name.
        collection: String,
        /// Ids to delete.
        ids: Vec<String>,
    },
    /// Search a collection.
    Search {
        /// Target collection name.
        collection: String,
        /// Query text.
        query: String,
        /// Max results.
        k: usize,
    },
    /// Create a collection.
    CreateCollection {
        /// Collection name.
        name: String,
        /// Configured vector size.
        vector_size: usize,
    },
    /// Delete a collection.
    DeleteCollection {
        /// Collection name.
        name: String,
    },
    /// Check whether a collection exists.
    CollectionExists {
        /// Collection name.
        name: String,
    },
    /// List all collections.
    ListCollections,
    /// Fetch collection admin info.
    GetCollectionInfo {
        /// Collection name.
        name: String,
    },
}

/// The reference server's response to one [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// Assigned ids, in input order (response to `Upsert`).
    Ids(Vec<String>),
    /// Acknowledgement with no payload (response to `Delete`/`DeleteCollection`/`CreateCollection`).
    Ack,
    /// Search results (response to `Search`).
    Results(Vec<SearchResult>),
    /// Existence check result.
    Exists(bool),
    /// Collection name list.
    Names(Vec<String>),
    /// Collection admin info.
    Info(CollectionInfo),
    /// The server rejected or failed to process the request.
    Error(String),
}

/// A framed request/response pair, exposed for callers that want to drive
/// the wire format directly (tests, alternate transports).
pub struct Frame;

impl Frame {
    /// Write `value` as a length-prefixed `bincode` frame.
    pub async fn write<W, T>(writer: &mut W, value: &T) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        let encoded = bincode::serialize(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if encoded.len() as u64 > MAX_FRAME_BYTES as u64 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "frame too large"));
        }
        writer.write_u32(encoded.len() as u32).await?;
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one length-prefixed `bincode` frame.
    pub async fn read<R, T>(reader: &mut R) -> io::Result<T>
    where
        R: AsyncRead + Unpin,
        T: for<'de> Deserialize<'de>,
    {
        let len = reader.read_u32().await?;
        if len > MAX_FRAME_BYTES {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "frame exceeds max size"));
        }
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf).await?;
        bincode::deserialize(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn request_round_trips_over_a_pipe() {
        let (mut a, mut b) = duplex(4096);
        let req = Request::Search {
            collection: "docs".into(),
            query: "hello".into(),
            k: 5,
        };
        Frame::write(&mut a, &req).await.unwrap();
        let decoded: Request = Frame::read(&mut b).await.unwrap();
        assert!(matches!(decoded, Request::Search { k: 5, .. }));
    }
}
