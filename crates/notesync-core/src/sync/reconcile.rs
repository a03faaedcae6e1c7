//! Last-write-wins reconciliation of two snapshots
//!
//! Given the local and remote snapshot of one collection type, decide which
//! records travel in which direction. The record with the larger `updated`
//! wins as a whole; equal timestamps mean the sides already agree, even if
//! the payloads differ. Pure function, no I/O.

use std::collections::HashMap;

use crate::models::Record;

/// Records to apply in each direction for one collection type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    /// Remote records missing or older locally, in remote snapshot order
    pub to_local: Vec<Record>,
    /// Local records missing or older remotely, in local snapshot order
    pub to_remote: Vec<Record>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_local.is_empty() && self.to_remote.is_empty()
    }
}

/// Compute the records to push in each direction
///
/// Records without an id are never pushed.
pub fn reconcile(local: &[Record], remote: &[Record]) -> SyncPlan {
    let local_by_id = index_by_id(local);
    let remote_by_id = index_by_id(remote);

    let to_local = remote
        .iter()
        .filter(|r| !r.id.is_empty())
        .filter(|r| match local_by_id.get(r.id.as_str()) {
            Some(l) => l.updated < r.updated,
            None => true,
        })
        .cloned()
        .collect();

    let to_remote = local
        .iter()
        .filter(|l| !l.id.is_empty())
        .filter(|l| match remote_by_id.get(l.id.as_str()) {
            Some(r) => r.updated < l.updated,
            None => true,
        })
        .cloned()
        .collect();

    SyncPlan {
        to_local,
        to_remote,
    }
}

fn index_by_id(records: &[Record]) -> HashMap<&str, &Record> {
    let mut map: HashMap<&str, &Record> = HashMap::with_capacity(records.len());
    for record in records {
        // Duplicate ids in one snapshot: the newest copy stands for the id
        map.entry(record.id.as_str())
            .and_modify(|existing| {
                if record.updated > existing.updated {
                    *existing = record;
                }
            })
            .or_insert(record);
    }
    map
}
