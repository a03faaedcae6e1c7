//! Engine lifecycle events and pass reports

use serde::Serialize;

use crate::error::{ErrorKind, SyncError};
use crate::models::{CollectionType, Record};

/// Where the engine is in its control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    /// Not authenticated and nothing scheduled
    Idle,
    /// Verifying credentials
    Authenticating,
    /// A pass is running
    Syncing,
    /// A pass is scheduled
    Waiting,
}

/// Failure carried by [`SyncEvent::Error`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SyncError> for SyncErrorDetail {
    fn from(error: &SyncError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Events emitted by the sync engine
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Credentials were accepted
    Authenticated,
    /// A pass started
    Started,
    /// A pass finished without a fatal error
    Completed(PassReport),
    /// A pass ended, successfully or not
    Stopped,
    /// Something failed; emitted at most once per pass
    Error(SyncErrorDetail),
    /// A locally changed record was pushed outside a pass
    RecordPushed {
        collection: CollectionType,
        id: String,
    },
}

/// A record changed locally and should reach the remote right away
#[derive(Debug, Clone)]
pub struct LocalMutation {
    pub collection: CollectionType,
    pub record: Record,
}

impl LocalMutation {
    pub fn new(collection: CollectionType, record: Record) -> Self {
        Self { collection, record }
    }
}

/// Outcome of one collection type within a pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionReport {
    pub collection: CollectionType,
    /// Records written locally from the remote
    pub pulled: usize,
    /// Records written to the remote
    pub pushed: usize,
    /// Ids whose push failed; retried next pass
    pub failed: Vec<String>,
}

impl CollectionReport {
    pub fn new(collection: CollectionType) -> Self {
        Self {
            collection,
            pulled: 0,
            pushed: 0,
            failed: Vec::new(),
        }
    }
}

/// Outcome of a full pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassReport {
    pub collections: Vec<CollectionReport>,
}

impl PassReport {
    /// Whether any remote change was applied locally
    pub fn remote_changed(&self) -> bool {
        self.collections.iter().any(|c| c.pulled > 0)
    }

    pub fn pulled(&self) -> usize {
        self.collections.iter().map(|c| c.pulled).sum()
    }

    pub fn pushed(&self) -> usize {
        self.collections.iter().map(|c| c.pushed).sum()
    }

    /// Every failed push, as `(collection, id)`
    pub fn failures(&self) -> Vec<(CollectionType, &str)> {
        self.collections
            .iter()
            .flat_map(|c| c.failed.iter().map(move |id| (c.collection, id.as_str())))
            .collect()
    }
}
