//! Remote source trait and paginated stream.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::model::{QueryId, RemoteQuery};

/// Number of entries requested per page.
pub const PAGE_SIZE: usize = 100;

/// Transport failures talking to the remote server.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The request never produced a response (DNS, TLS, connection reset...).
    #[error("Request to {url} failed: {message}")]
    Request {
        /// Target URL.
        url: String,
        /// Underlying client message.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("{operation} failed with HTTP {status} at {url}: {body}")]
    Status {
        /// What was being attempted.
        operation: &'static str,
        /// Target URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The response body was not the expected shape.
    #[error("Unexpected response from {url}: {message}")]
    Decode {
        /// Target URL.
        url: String,
        /// Parser message.
        message: String,
    },
}

/// Result type for remote operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// A server holding the authoritative copy of each query.
///
/// Pages are returned raw so that malformed entries can be quarantined one
/// by one instead of failing the whole page.
pub trait RemoteSource: Send + Sync {
    /// Fetch one page (1-based) of raw entries.
    fn fetch_page(
        &self,
        page: usize,
        page_size: usize,
    ) -> impl std::future::Future<Output = RemoteResult<Vec<serde_json::Value>>> + Send;

    /// Replace the body of a query and return the server's authoritative record.
    fn update(
        &self,
        id: &QueryId,
        body: &str,
    ) -> impl std::future::Future<Output = RemoteResult<RemoteQuery>> + Send;
}

/// Lazy, finite stream over every remote query.
///
/// Pages are fetched on demand and delivered in server order. The stream
/// ends after the first page shorter than the page size. It is not
/// restartable: once exhausted (or dropped) a new one must be created.
pub struct QueryStream<'a, S: RemoteSource> {
    source: &'a S,
    page_size: usize,
    next_page: usize,
    buffer: VecDeque<serde_json::Value>,
    exhausted: bool,
    rejected: usize,
}

impl<'a, S: RemoteSource> QueryStream<'a, S> {
    /// Stream all queries using the default page size.
    pub fn new(source: &'a S) -> Self {
        Self::with_page_size(source, PAGE_SIZE)
    }

    /// Stream all queries with a custom page size.
    pub fn with_page_size(source: &'a S, page_size: usize) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            next_page: 1,
            buffer: VecDeque::new(),
            exhausted: false,
            rejected: 0,
        }
    }

    /// Number of entries dropped so far because they failed validation.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Yield the next valid query, fetching a new page when needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a page request fails. The stream should be
    /// considered dead afterwards.
    pub async fn next(&mut self) -> RemoteResult<Option<RemoteQuery>> {
        loop {
            while let Some(raw) = self.buffer.pop_front() {
                match serde_json::from_value::<RemoteQuery>(raw) {
                    Ok(query) if query.id.is_path_safe() => return Ok(Some(query)),
                    Ok(query) => {
                        warn!(id = %query.id, "Skipping remote query with unusable id");
                        self.rejected += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed remote query");
                        self.rejected += 1;
                    }
                }
            }

            if self.exhausted {
                return Ok(None);
            }

            let page = self.next_page;
            let entries = self.source.fetch_page(page, self.page_size).await?;
            debug!(page, count = entries.len(), "Fetched remote page");

            if entries.len() < self.page_size {
                self.exhausted = true;
            }
            self.next_page += 1;
            self.buffer.extend(entries);
        }
    }

    /// Stop the stream and release any buffered entries.
    pub fn close(&mut self) {
        self.buffer.clear();
        self.exhausted = true;
    }
}
