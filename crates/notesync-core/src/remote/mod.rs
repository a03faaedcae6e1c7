//! Remote store access
//!
//! The engine only needs four operations from the remote side. Records live
//! at `<profile>/<collection>/<id>.json`; every write is a commit on a fixed
//! branch with the message `Updated <collection>`.
//!
//! ## Contract
//!
//! - `list` on a directory that does not exist returns an empty listing: the
//!   profile simply never synced that collection.
//! - `read` reports a missing record as [`RemoteError::NotFound`], which the
//!   engine uses to pick create over update.
//! - Rejected credentials are [`RemoteError::Unauthorized`], never
//!   [`RemoteError::Network`].

mod gitlab;

pub use gitlab::GitlabStore;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::models::{CollectionType, Record};

/// File extension of every stored record
pub const RECORD_EXTENSION: &str = ".json";

/// Remote side of the sync
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Verify credentials and project identity
    async fn authenticate(&self) -> Result<(), RemoteError>;

    /// File names stored for a collection
    async fn list(&self, collection: CollectionType) -> Result<Vec<String>, RemoteError>;

    /// Read one record; `id` may carry the `.json` suffix
    async fn read(&self, collection: CollectionType, id: &str) -> Result<Record, RemoteError>;

    /// Persist one record, creating the file when `is_create` is set
    async fn write(
        &self,
        collection: CollectionType,
        record: &Record,
        is_create: bool,
    ) -> Result<(), RemoteError>;
}

/// Directory holding a collection of a profile
pub fn collection_dir(profile: &str, collection: CollectionType) -> String {
    format!("{}/{}", profile, collection)
}

/// Full path of a record file
pub fn record_path(profile: &str, collection: CollectionType, id: &str) -> String {
    if id.ends_with(RECORD_EXTENSION) {
        format!("{}/{}", collection_dir(profile, collection), id)
    } else {
        format!(
            "{}/{}{}",
            collection_dir(profile, collection),
            id,
            RECORD_EXTENSION
        )
    }
}

/// Commit message used for writes to a collection
pub fn commit_message(collection: CollectionType) -> String {
    format!("Updated {}", collection)
}

/// Whether a listed file name holds a record
pub fn is_record_file(name: &str) -> bool {
    name.len() > RECORD_EXTENSION.len() && name.ends_with(RECORD_EXTENSION)
}
