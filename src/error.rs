//! Error types for qsync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (6=transport, 7=config, 8=io, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for `--json` consumers

use thiserror::Error;

use crate::remote::RemoteError;
use crate::sync::SyncError;

/// Result type alias for qsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (exit 4)
    InvalidArgument,

    // Remote (exit 6)
    TransportError,

    // Config (exit 7)
    ConfigError,

    // Local mirror (exit 8)
    IoError,
    JsonError,
    InvalidMetadata,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InvalidMetadata => "INVALID_METADATA",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::InvalidArgument => 4,
            Self::TransportError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError | Self::InvalidMetadata => 8,
        }
    }

    /// Whether re-running the same command may succeed without changes.
    ///
    /// True only for transport failures; nothing in qsync retries on its own.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in qsync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Sync(SyncError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<SyncError> for Error {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Transport(e) => Self::Remote(e),
            other => Self::Sync(other),
        }
    }
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Remote(_) | Self::Sync(SyncError::Transport(_)) => ErrorCode::TransportError,
            Self::Sync(SyncError::Json(_)) | Self::Json(_) => ErrorCode::JsonError,
            Self::Sync(SyncError::InvalidMetadata { .. }) => ErrorCode::InvalidMetadata,
            Self::Sync(SyncError::UnsafeId(_)) => ErrorCode::InvalidArgument,
            Self::Sync(SyncError::Store { .. } | SyncError::Io(_)) | Self::Io(_) => {
                ErrorCode::IoError
            }
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Config(msg) if msg.contains("URL") => Some(
                "Set QSYNC_URL, pass --url, or add \"url\" to ~/.qsync/config.json".to_string(),
            ),
            Self::Config(msg) if msg.contains("API key") => Some(
                "Set QSYNC_API_KEY, pass --api-key, or add \"api_key\" to ~/.qsync/config.json"
                    .to_string(),
            ),
            Self::Remote(RemoteError::Status { status: 401 | 403, .. }) => {
                Some("The server rejected the API key. Check QSYNC_API_KEY.".to_string())
            }
            Self::Remote(_) => Some(
                "Nothing was retried. Check connectivity and run `qsync sync` again.".to_string(),
            ),
            Self::Sync(SyncError::InvalidMetadata { id, .. }) => Some(format!(
                "Delete the metadata file for query {id} to re-pull it as new."
            )),
            Self::Sync(SyncError::Store { id, .. }) => Some(format!(
                "Check permissions on the mirror directory, then re-run to retry query {id}."
            )),
            _ => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
