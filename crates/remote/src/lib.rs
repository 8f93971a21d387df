//! The remote backend side of the Store contract: a `Store` implementation
//! and a minimal, explicitly-labeled reference client. The real remote
//! vector database and its wire protocol are external collaborators (spec
//! §1) — this crate exists so the Fallback Store has something concrete to
//! fail over from/to in tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod mock;
mod protocol;
mod tcp_client;

pub use mock::MockRemoteStore;
pub use protocol::{Frame, Request, Response};
pub use tcp_client::TcpRemoteStore;
