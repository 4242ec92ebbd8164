//! Remote query server access.
//!
//! - [`RemoteSource`] - the narrow interface the engine consumes
//! - [`QueryStream`] - lazy pagination with malformed-entry quarantine
//! - [`HttpRemote`] - REST implementation using `reqwest`

mod http;
mod source;

pub use http::HttpRemote;
pub use source::{QueryStream, RemoteError, RemoteResult, RemoteSource, PAGE_SIZE};
