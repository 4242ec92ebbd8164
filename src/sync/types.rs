//! Reconciliation types.
//!
//! This module defines the three-way state used to classify each record,
//! the two sticky batch slots, the run summary, and sync errors.

use serde::Serialize;

use crate::model::QueryId;
use crate::remote::RemoteError;

/// Fingerprints of one record as seen from the three sides.
///
/// Derived fresh for every record on every run; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreeWay {
    /// Fingerprint of the local body, `None` if the body file is absent.
    pub local: Option<String>,
    /// Fingerprint recorded in metadata at last sync, `None` if no metadata.
    pub cached: Option<String>,
    /// Fingerprint of the remote body.
    pub remote: String,
}

impl ThreeWay {
    /// Classify the relationship between the three fingerprints.
    ///
    /// Missing metadata wins over every comparison. A missing local body
    /// with metadata present is re-materialized from remote, so it is also
    /// treated as [`SyncState::New`].
    #[must_use]
    pub fn classify(&self) -> SyncState {
        let (Some(cached), Some(local)) = (self.cached.as_deref(), self.local.as_deref()) else {
            return SyncState::New;
        };
        let remote = self.remote.as_str();

        match (local == cached, cached == remote, local == remote) {
            (true, true, _) => SyncState::Unchanged,
            (true, false, _) => SyncState::RemoteUpdated,
            (false, true, _) => SyncState::LocalModified,
            (false, false, true) => SyncState::Converged,
            (false, false, false) => SyncState::Conflict,
        }
    }
}

/// Classification of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No local metadata (or no local body): pull.
    New,
    /// Local, cached, and remote all agree: nothing to do.
    Unchanged,
    /// Only the remote side moved: pull.
    RemoteUpdated,
    /// Only the local side moved: ask whether to push.
    LocalModified,
    /// Both sides moved to the same content: refresh metadata only.
    Converged,
    /// Both sides moved to different content: ask how to resolve.
    Conflict,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::RemoteUpdated => write!(f, "remote updated"),
            Self::LocalModified => write!(f, "local modified"),
            Self::Converged => write!(f, "converged"),
            Self::Conflict => write!(f, "conflict"),
        }
    }
}

/// Sticky decision slot for Local Modified records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UploadBatch {
    /// Prompt for each record.
    #[default]
    Ask,
    /// Push every remaining local change without asking.
    PushAll,
    /// Skip every remaining local change without asking.
    SkipAll,
}

/// Sticky decision slot for conflicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictBatch {
    /// Prompt for each conflict.
    #[default]
    Ask,
    /// Keep the local body for every remaining conflict.
    KeepLocalAll,
    /// Take the remote body for every remaining conflict.
    TakeRemoteAll,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The remote stream was consumed to the end.
    #[default]
    Completed,
    /// The operator aborted before the stream was exhausted.
    Interrupted,
}

/// Counters accumulated over one reconciliation run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    /// Records pulled because no local snapshot existed.
    pub new: usize,
    /// Records pulled because the remote side changed.
    pub pulled: usize,
    /// Records pushed to the remote.
    pub pushed: usize,
    /// Records with nothing to do.
    pub unchanged: usize,
    /// Local changes the operator declined to push.
    pub skipped: usize,
    /// Conflicts left unresolved (skipped or failed to push).
    pub conflicts: usize,
    /// Local changes whose push failed.
    pub failed: usize,
    /// Remote entries rejected as malformed.
    pub rejected: usize,
    /// Records received from the remote, rejected ones excluded.
    pub total: usize,
    /// Whether the run completed or was interrupted.
    pub status: RunStatus,
}

impl RunSummary {
    /// Number of records whose content moved in either direction.
    #[must_use]
    pub fn transferred(&self) -> usize {
        self.new + self.pulled + self.pushed
    }

    /// Whether the run stopped early on operator request.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.status == RunStatus::Interrupted
    }
}

/// Sync-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The remote server could not be reached or answered with an error.
    #[error(transparent)]
    Transport(#[from] RemoteError),

    /// Reading or writing a record in the local mirror failed.
    #[error("Failed to {operation} query {id}: {source}")]
    Store {
        /// Record identifier.
        id: QueryId,
        /// What was being attempted (e.g. "write body").
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// IO error outside of a specific record (prompt input, directory scan).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Metadata on disk could not be parsed.
    #[error("Invalid metadata for query {id}: {message}")]
    InvalidMetadata {
        /// Record identifier.
        id: QueryId,
        /// Parser message.
        message: String,
    },

    /// Identifier cannot be used as a directory name.
    #[error("Query id {0:?} is not usable as a directory name")]
    UnsafeId(QueryId),
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
