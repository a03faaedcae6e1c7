//! Sync error handling
//!
//! Typed errors for remote access, the index cache and the sync engine, with
//! the classification the engine uses to pick a recovery action.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::CollectionType;

/// Errors reported by a remote store adapter
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The requested file or directory does not exist
    #[error("Not found: {path}")]
    NotFound { path: String },

    /// Credentials or project identity were rejected
    #[error("Authentication rejected (HTTP {status})")]
    Unauthorized { status: u16 },

    /// The remote could not be reached at all
    #[error("Network unavailable: {message}")]
    Network { message: String },

    /// Any other non-success HTTP status
    #[error("Remote returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// The remote answered with something we could not decode
    #[error("Invalid remote response: {0}")]
    Decode(String),

    /// The request itself could not be completed (bad URL, redirect loop)
    #[error("Request failed: {0}")]
    Request(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }

    /// Map an HTTP status to the matching error
    pub fn from_status(code: u16, path: &str, body: String) -> Self {
        match code {
            401 | 403 => RemoteError::Unauthorized { status: code },
            404 => RemoteError::NotFound {
                path: path.to_string(),
            },
            _ => RemoteError::Status { code, body },
        }
    }
}

/// Errors from the persisted remote index cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to read cache '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write cache '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cache '{path}' is not valid JSON: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that can occur while synchronizing
#[derive(Error, Debug)]
pub enum SyncError {
    /// Credentials or project identity rejected
    #[error("Authentication failed: {0}")]
    Authentication(RemoteError),

    /// No connectivity to the remote
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(RemoteError),

    /// Pushing a single record to the remote failed
    #[error("Failed to push {collection}/{id}: {source}")]
    RemoteWrite {
        collection: CollectionType,
        id: String,
        #[source]
        source: RemoteError,
    },

    /// Any other remote failure
    #[error("Remote error: {0}")]
    Remote(RemoteError),

    /// The local collection source failed
    #[error("Local {collection} error: {message}")]
    Local {
        collection: CollectionType,
        message: String,
    },

    /// The engine was configured incorrectly
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A record arrived for a collection this engine does not sync
    #[error("Collection '{0}' is not configured for sync")]
    UnknownCollection(CollectionType),
}

impl From<RemoteError> for SyncError {
    /// Classify a remote failure that is not tied to one record
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Unauthorized { .. } => SyncError::Authentication(error),
            RemoteError::Network { .. } => SyncError::NetworkUnavailable(error),
            other => SyncError::Remote(other),
        }
    }
}

/// Coarse error category carried by sync events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    Network,
    RemoteWrite,
    Pass,
}

impl SyncError {
    /// Classify a failure of a single push
    ///
    /// Authentication and connectivity failures keep their own class so they
    /// still abort the pass; everything else is isolated to the record.
    pub fn push_failed(collection: CollectionType, id: &str, error: RemoteError) -> Self {
        match error {
            RemoteError::Unauthorized { .. } => SyncError::Authentication(error),
            RemoteError::Network { .. } => SyncError::NetworkUnavailable(error),
            source => SyncError::RemoteWrite {
                collection,
                id: id.to_string(),
                source,
            },
        }
    }

    /// Whether this error must stop the rest of the pass
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SyncError::RemoteWrite { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Authentication(_) => ErrorKind::Authentication,
            SyncError::NetworkUnavailable(_) => ErrorKind::Network,
            SyncError::RemoteWrite { .. } => ErrorKind::RemoteWrite,
            _ => ErrorKind::Pass,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            SyncError::Authentication(_) => {
                Some("Check api_key and project_id, then run `notesync sync` again.")
            }
            SyncError::NetworkUnavailable(_) => {
                Some("Polling continues at the slowest interval until the server is reachable.")
            }
            SyncError::InvalidConfig(_) => Some(
                "Set server_url, project_id and api_key with `notesync config set <key> <value>`.",
            ),
            _ => None,
        }
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            RemoteError::from_status(401, "p", String::new()),
            RemoteError::Unauthorized { status: 401 }
        ));
        assert!(matches!(
            RemoteError::from_status(403, "p", String::new()),
            RemoteError::Unauthorized { status: 403 }
        ));
        assert!(RemoteError::from_status(404, "p/notes", String::new()).is_not_found());
        assert!(matches!(
            RemoteError::from_status(500, "p", "boom".into()),
            RemoteError::Status { code: 500, .. }
        ));
    }

    #[test]
    fn test_remote_error_conversion() {
        let err: SyncError = RemoteError::Unauthorized { status: 401 }.into();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert!(err.is_fatal());

        let err: SyncError = RemoteError::Network {
            message: "connection refused".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.recovery_suggestion().is_some());

        let err: SyncError = RemoteError::Decode("bad json".into()).into();
        assert_eq!(err.kind(), ErrorKind::Pass);

        let err: SyncError = RemoteError::Request("too many redirects".into()).into();
        assert_eq!(err.kind(), ErrorKind::Pass);
    }

    #[test]
    fn test_push_failure_isolated() {
        let err = SyncError::push_failed(
            CollectionType::Notes,
            "n1",
            RemoteError::Status {
                code: 400,
                body: "invalid".into(),
            },
        );
        assert_eq!(err.kind(), ErrorKind::RemoteWrite);
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("notes/n1"));

        let err = SyncError::push_failed(
            CollectionType::Notes,
            "n1",
            RemoteError::Network {
                message: "reset".into(),
            },
        );
        assert!(err.is_fatal());
    }
}
