//! Data models for qsync.
//!
//! - [`QueryId`] - opaque record identifier
//! - [`RemoteQuery`] - validated record from the server
//! - [`QueryMeta`] - metadata envelope kept in the local mirror

pub mod query;

pub use query::{QueryId, QueryMeta, RemoteQuery};
