//! Error types for gridsync.
//!
//! Every failure is classified by [`ErrorKind`] so the store façade can turn
//! it into a status field instead of propagating it to the UI.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for gridsync operations.
pub type Result<T> = std::result::Result<T, LayoutError>;

/// Broad failure class of a [`LayoutError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Durable or fallback storage failed.
    Persistence,
    /// Live channel or request/response sync failed.
    Transport,
    /// An inbound envelope could not be understood.
    Protocol,
    /// A layout mutation broke a layout invariant.
    Layout,
    /// Configuration could not be loaded or was invalid.
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Persistence => write!(f, "persistence"),
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Protocol => write!(f, "protocol"),
            ErrorKind::Layout => write!(f, "layout"),
            ErrorKind::Config => write!(f, "config"),
        }
    }
}

/// Errors that can occur in gridsync.
#[derive(Error, Debug)]
pub enum LayoutError {
    // Persistence Errors
    #[error("Durable store unavailable: {reason}")]
    DurableStoreUnavailable { reason: String },

    #[error("Failed to read layout record: {path}: {source}")]
    RecordReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write layout record: {path}: {source}")]
    RecordWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory creation failed: {path}: {source}")]
    DirectoryCreateError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Layout record '{key}' is corrupted: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("Unsupported layout record version: {version}")]
    UnsupportedRecordVersion { version: u64 },

    #[error("Record migration failed from v{from} to v{to}: {reason}")]
    MigrationError { from: u64, to: u64, reason: String },

    // Transport Errors
    #[error("Connection to {url} failed: {reason}")]
    ConnectFailed { url: String, reason: String },

    #[error("Sync channel closed")]
    ChannelClosed,

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Fallback sync request failed: {reason}")]
    FallbackSyncFailed { reason: String },

    #[error("Remote sync support not compiled. Build with --features remote")]
    RemoteUnavailable,

    // Protocol Errors
    #[error("Malformed envelope: {reason}")]
    MalformedEnvelope { reason: String },

    // Layout Errors
    #[error("Duplicate layout item id: {id}")]
    DuplicateItemId { id: String },

    // Config Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Generic Errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LayoutError {
    /// Returns the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LayoutError::DurableStoreUnavailable { .. }
            | LayoutError::RecordReadError { .. }
            | LayoutError::RecordWriteError { .. }
            | LayoutError::DirectoryCreateError { .. }
            | LayoutError::CorruptRecord { .. }
            | LayoutError::UnsupportedRecordVersion { .. }
            | LayoutError::MigrationError { .. }
            | LayoutError::Json(_)
            | LayoutError::Io(_) => ErrorKind::Persistence,
            LayoutError::ConnectFailed { .. }
            | LayoutError::ChannelClosed
            | LayoutError::Transport { .. }
            | LayoutError::FallbackSyncFailed { .. }
            | LayoutError::RemoteUnavailable => ErrorKind::Transport,
            LayoutError::MalformedEnvelope { .. } => ErrorKind::Protocol,
            LayoutError::DuplicateItemId { .. } => ErrorKind::Layout,
            LayoutError::InvalidConfig { .. } => ErrorKind::Config,
        }
    }

    /// Returns true if this error indicates the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LayoutError::RecordWriteError { .. }
                | LayoutError::ConnectFailed { .. }
                | LayoutError::ChannelClosed
                | LayoutError::Transport { .. }
                | LayoutError::FallbackSyncFailed { .. }
        )
    }

    /// Returns a user-friendly recovery suggestion.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            LayoutError::DurableStoreUnavailable { .. } => {
                Some("Layouts will be kept in the fallback store until durable storage returns.")
            }
            LayoutError::RecordWriteError { .. } => {
                Some("Check free disk space and permissions; the layout will be saved again on the next edit.")
            }
            LayoutError::CorruptRecord { .. } => {
                Some("Delete the corrupted record or restore it from the remote authority.")
            }
            LayoutError::ConnectFailed { .. } | LayoutError::ChannelClosed => {
                Some("Edits continue locally; use reconnect once the server is reachable.")
            }
            LayoutError::RemoteUnavailable => Some("Rebuild with the 'remote' feature enabled."),
            LayoutError::DuplicateItemId { .. } => Some("Pick a unique id for the new widget."),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = LayoutError::ChannelClosed;
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.is_retryable());

        let err = LayoutError::MalformedEnvelope {
            reason: "missing type".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(!err.is_retryable());

        let err = LayoutError::CorruptRecord {
            key: "default".to_string(),
            reason: "checksum mismatch".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_error_display() {
        let err = LayoutError::DuplicateItemId {
            id: "sales-chart".to_string(),
        };
        assert_eq!(err.to_string(), "Duplicate layout item id: sales-chart");
        assert_eq!(ErrorKind::Persistence.to_string(), "persistence");
    }
}
