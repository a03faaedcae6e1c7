//! Notesync Core Library
//!
//! This crate provides the core of notesync, a periodic bidirectional sync
//! between local note collections (notes, notebooks, tags) and a GitLab
//! repository used as a document store.
//!
//! # Architecture
//!
//! - **Local collections**: JSON files, one per collection type, behind the
//!   [`CollectionSource`] trait
//! - **Remote store**: one JSON file per record in a GitLab repository,
//!   behind the [`RemoteStore`] trait
//! - **Engine**: reconciles both sides by last-write-wins and polls with an
//!   adaptive interval
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let remote = GitlabStore::new(&config.gitlab()?, &config.profile)?;
//! let cache = IndexCache::open(config.index_cache_path(), &config.profile)?;
//!
//! let engine = SyncEngine::new(Arc::new(remote), collections, cache, (&config).into())?;
//! let report = engine.sync_once().await?;
//! ```
//!
//! # Modules
//!
//! - `sync`: Engine, reconciliation, interval control and events
//! - `remote`: Remote store trait and the GitLab adapter
//! - `local`: Local collection sources
//! - `cache`: Persisted remote listing and index cache
//! - `models`: Records and collection types
//! - `config`: Application configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod local;
pub mod models;
pub mod remote;
pub mod sync;

pub use cache::IndexCache;
pub use config::{Config, GitlabSettings};
pub use error::{CacheError, ErrorKind, RemoteError, SyncError, SyncResult};
pub use local::{CollectionSource, JsonFileSource};
pub use models::{CollectionType, IndexEntry, Record};
pub use remote::{GitlabStore, RemoteStore};
pub use sync::{
    EngineOptions, EnginePhase, LocalMutation, PassReport, SyncEngine, SyncEvent,
};
