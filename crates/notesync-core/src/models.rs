//! Data models for notesync
//!
//! Defines the record shape shared by the local collections and the remote
//! repository, and the collection types that group them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named category of records, synchronized independently within a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    Notes,
    Notebooks,
    Tags,
}

impl CollectionType {
    /// All collection types, in the order a pass visits them by default
    pub const ALL: [CollectionType; 3] = [
        CollectionType::Notes,
        CollectionType::Notebooks,
        CollectionType::Tags,
    ];

    /// Name used in remote paths, cache keys and commit messages
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionType::Notes => "notes",
            CollectionType::Notebooks => "notebooks",
            CollectionType::Tags => "tags",
        }
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for CollectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "notes" => Ok(CollectionType::Notes),
            "notebooks" => Ok(CollectionType::Notebooks),
            "tags" => Ok(CollectionType::Tags),
            other => Err(format!(
                "Unknown collection type '{}'. Valid types: notes, notebooks, tags",
                other
            )),
        }
    }
}

/// A single synchronized record
///
/// Serialized flat: `id` and `updated` sit next to the payload fields, which
/// is exactly the content of one remote `.json` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier, unique within a collection type and profile
    pub id: String,
    /// Last modification timestamp (milliseconds since the epoch)
    #[serde(default)]
    pub updated: i64,
    /// Every other field of the record
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Record {
    /// Create a record with an empty payload
    pub fn new(id: impl Into<String>, updated: i64) -> Self {
        Self {
            id: id.into(),
            updated,
            payload: Map::new(),
        }
    }

    /// Builder-style payload field setter
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Get a payload field
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Copy of this record with the given payload fields removed
    ///
    /// `id` and `updated` are never removed.
    pub fn redacted(&self, fields: &[String]) -> Record {
        let mut record = self.clone();
        for field in fields {
            record.payload.remove(field);
        }
        record
    }

    /// Minimal `{id, updated}` view used by the remote index cache
    pub fn index_entry(&self) -> IndexEntry {
        IndexEntry {
            id: self.id.clone(),
            updated: self.updated,
        }
    }
}

/// Minimal cached view of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub updated: i64,
}
