//! Remote index cache
//!
//! Persists, per profile and collection type, the last remote listing and a
//! minimal `{id, updated}` index of the records after the last pass. The
//! cache is advisory: a missing or stale entry never changes what a pass
//! does, it only lets the engine tell whether the remote moved.
//!
//! Both kinds of entry share one key namespace, `notesync.<kind>.<profile>.<type>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CacheError;
use crate::local::atomic_write;
use crate::models::{CollectionType, IndexEntry, Record};

const KEY_NAMESPACE: &str = "notesync";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    entries: BTreeMap<String, Value>,
    #[serde(default)]
    last_pass_at: Option<DateTime<Utc>>,
}

/// Namespaced key-value cache, optionally persisted to a JSON file
#[derive(Debug)]
pub struct IndexCache {
    profile: String,
    path: Option<PathBuf>,
    data: CacheFile,
}

impl IndexCache {
    /// Create a cache that lives only in memory
    pub fn in_memory(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            path: None,
            data: CacheFile::default(),
        }
    }

    /// Open a persisted cache, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>, profile: impl Into<String>) -> Result<Self, CacheError> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).map_err(|source| CacheError::Format {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheFile::default(),
            Err(source) => return Err(CacheError::Read { path, source }),
        };

        Ok(Self {
            profile: profile.into(),
            path: Some(path),
            data,
        })
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// When the last pass finished writing to this cache
    pub fn last_pass_at(&self) -> Option<DateTime<Utc>> {
        self.data.last_pass_at
    }

    fn listing_key(&self, collection: CollectionType) -> String {
        format!("{}.listing.{}.{}", KEY_NAMESPACE, self.profile, collection)
    }

    fn index_key(&self, collection: CollectionType) -> String {
        format!("{}.index.{}.{}", KEY_NAMESPACE, self.profile, collection)
    }

    /// Remote file names seen by the last pass
    pub fn listing(&self, collection: CollectionType) -> Option<Vec<String>> {
        self.get(&self.listing_key(collection))
    }

    /// `{id, updated}` pairs recorded by the last pass
    pub fn index(&self, collection: CollectionType) -> Option<Vec<IndexEntry>> {
        self.get(&self.index_key(collection))
    }

    /// Replace the listing for a collection and persist
    pub async fn store_listing(
        &mut self,
        collection: CollectionType,
        names: &[String],
    ) -> Result<(), CacheError> {
        let key = self.listing_key(collection);
        self.set(key, names).await
    }

    /// Replace the index for a collection from a record snapshot and persist
    pub async fn store_index(
        &mut self,
        collection: CollectionType,
        records: &[Record],
    ) -> Result<(), CacheError> {
        let entries: Vec<IndexEntry> = records.iter().map(Record::index_entry).collect();
        let key = self.index_key(collection);
        self.data.last_pass_at = Some(Utc::now());
        self.set(key, &entries).await
    }

    /// Number of records in the cached index, per collection
    pub fn indexed_counts(&self) -> Vec<(CollectionType, usize)> {
        CollectionType::ALL
            .iter()
            .filter_map(|&c| self.index(c).map(|entries| (c, entries.len())))
            .collect()
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        // An entry that no longer parses is treated as absent
        self.data
            .entries
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    async fn set<T: Serialize + ?Sized>(&mut self, key: String, value: &T) -> Result<(), CacheError> {
        let value = serde_json::to_value(value).map_err(|source| CacheError::Format {
            path: self.path.clone().unwrap_or_default(),
            source,
        })?;
        self.data.entries.insert(key, value);
        self.save().await
    }

    async fn save(&self) -> Result<(), CacheError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(&self.data).map_err(|source| CacheError::Format {
            path: path.clone(),
            source,
        })?;

        atomic_write(path, &json)
            .await
            .map_err(|source| CacheError::Write {
                path: path.clone(),
                source,
            })
    }
}
