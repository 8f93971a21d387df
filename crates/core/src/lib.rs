//! Core types and traits for contextd
//!
//! This crate defines the foundational contract shared by every other crate
//! in the workspace:
//!
//! - [`TenantContext`] and the three [`IsolationMode`] policies
//! - the filter algebra that merges tenant scope into caller filters
//! - [`Document`], [`SearchResult`], [`CollectionInfo`] — the wire-level data model
//! - the [`Store`] trait — the uniform operation surface every backend implements
//! - [`ContextdError`] — the unified error type

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod error;
pub mod filter;
pub mod isolation;
pub mod store;
pub mod tenant;

pub use document::{CollectionInfo, Document, MetadataValue, SearchResult};
pub use error::{ContextdError, ErrorKind, Result};
pub use filter::merge_filters;
pub use isolation::IsolationMode;
pub use store::{Store, RESERVED_TENANT_KEYS};
pub use tenant::{ProjectId, TeamId, TenantContext, TenantId};
