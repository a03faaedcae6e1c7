//! Push command handler

use anyhow::{bail, Context, Result};

use notesync_core::{CollectionType, Config, JsonFileSource};

use super::{build_engine, explain};
use crate::output::Output;

/// Push one local record to the remote right away
pub async fn push(
    config: &Config,
    collection: CollectionType,
    id: String,
    output: &Output,
) -> Result<()> {
    if !config.collections.contains(&collection) {
        bail!(
            "Collection '{}' is not synced. Configured: {}",
            collection,
            config
                .collections
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let source = JsonFileSource::new(config.collection_path(collection));
    let Some(record) = source
        .get(&id)
        .await
        .with_context(|| format!("Failed to read local {}", collection))?
    else {
        bail!("No {} record with id '{}'", collection, id);
    };

    let engine = build_engine(config)?;
    engine
        .push_record(collection, &record)
        .await
        .map_err(|e| explain(&e))?;

    output.success(&format!("Pushed {}/{}", collection, id));
    Ok(())
}
