//! Command handlers

pub mod config;
pub mod push;
pub mod run;
pub mod status;
pub mod sync;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use notesync_core::{
    CollectionSource, CollectionType, Config, EngineOptions, GitlabStore, IndexCache,
    JsonFileSource, SyncEngine, SyncError,
};

/// Local JSON file source for every configured collection type
fn local_sources(config: &Config) -> Vec<(CollectionType, Arc<dyn CollectionSource>)> {
    config
        .collections
        .iter()
        .map(|&collection| {
            let source = JsonFileSource::new(config.collection_path(collection))
                .with_redacted_fields(config.redact_fields.clone());
            (collection, Arc::new(source) as Arc<dyn CollectionSource>)
        })
        .collect()
}

/// Open the index cache, falling back to an in-memory one if it is unreadable
fn open_cache(config: &Config) -> IndexCache {
    match IndexCache::open(config.index_cache_path(), &config.profile) {
        Ok(cache) => cache,
        Err(e) => {
            warn!("Ignoring index cache: {}", e);
            IndexCache::in_memory(&config.profile)
        }
    }
}

/// Build a GitLab-backed engine from configuration
pub(crate) fn build_engine(config: &Config) -> Result<SyncEngine> {
    config.validate()?;
    let settings = config.gitlab()?;

    std::fs::create_dir_all(config.profile_dir())
        .with_context(|| format!("Failed to create profile directory: {:?}", config.profile_dir()))?;

    let remote = GitlabStore::new(&settings, &config.profile)?;
    let engine = SyncEngine::new(
        Arc::new(remote),
        local_sources(config),
        open_cache(config),
        EngineOptions::from(config),
    )?;
    Ok(engine)
}

/// Attach the recovery hint, if any, to an engine error
pub(crate) fn explain(error: &SyncError) -> anyhow::Error {
    match error.recovery_suggestion() {
        Some(hint) => anyhow::anyhow!("{}\n{}", error, hint),
        None => anyhow::anyhow!("{}", error),
    }
}
