//! Local collection sources
//!
//! The engine never talks to local persistence directly. Each collection
//! type is backed by a [`CollectionSource`], which the surrounding
//! application implements; [`JsonFileSource`] is the file-backed one used by
//! the CLI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::Record;

/// Payload field marking a record whose content is encrypted
pub const ENCRYPTED_DATA_FIELD: &str = "encryptedData";

/// Local side of one collection type
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// Snapshot of every record in the collection
    async fn fetch_all(&self) -> Result<Vec<Record>>;

    /// Insert or replace the given records
    async fn save_all(&self, records: Vec<Record>) -> Result<()>;

    /// Payload fields to strip before the record leaves this machine
    fn redact_fields_for(&self, _record: &Record) -> Vec<String> {
        Vec::new()
    }
}

/// Collection stored as a JSON array in a single file
///
/// Writes go through a temp file and a rename so the collection is never
/// left half-written.
pub struct JsonFileSource {
    path: PathBuf,
    redact_fields: Vec<String>,
    write_lock: Mutex<()>,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            redact_fields: Vec::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Strip these fields from records carrying encrypted data
    pub fn with_redacted_fields(mut self, fields: Vec<String>) -> Self {
        self.redact_fields = fields;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up one record by id
    pub async fn get(&self, id: &str) -> Result<Option<Record>> {
        Ok(self.read_records().await?.into_iter().find(|r| r.id == id))
    }

    async fn read_records(&self) -> Result<Vec<Record>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {:?}", self.path));
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse collection file {:?}", self.path))
    }
}

#[async_trait]
impl CollectionSource for JsonFileSource {
    async fn fetch_all(&self) -> Result<Vec<Record>> {
        self.read_records().await
    }

    async fn save_all(&self, records: Vec<Record>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let mut existing = self.read_records().await?;

        let mut positions: HashMap<String, usize> = existing
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();

        let count = records.len();
        for record in records {
            match positions.get(&record.id) {
                Some(&i) => existing[i] = record,
                None => {
                    positions.insert(record.id.clone(), existing.len());
                    existing.push(record);
                }
            }
        }

        let json = serde_json::to_vec_pretty(&existing).context("Failed to serialize collection")?;
        atomic_write(&self.path, &json)
            .await
            .with_context(|| format!("Failed to write collection file {:?}", self.path))?;
        debug!("Saved {} record(s) to {:?}", count, self.path);
        Ok(())
    }

    fn redact_fields_for(&self, record: &Record) -> Vec<String> {
        let encrypted = match record.field(ENCRYPTED_DATA_FIELD) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        };

        if encrypted {
            self.redact_fields.clone()
        } else {
            Vec::new()
        }
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
pub(crate) async fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await
}
