//! Periodic bidirectional sync
//!
//! Keeps local collections and a remote store converged with
//! last-write-wins reconciliation.
//!
//! ## Pass
//!
//! For every collection type, in configured order:
//! 1. Fetch the local snapshot and the remote snapshot
//! 2. Reconcile the two by `updated`
//! 3. Save remote winners locally
//! 4. Push local winners to the remote, one at a time
//! 5. Refresh the cached listing and index
//!
//! ## Usage
//!
//! ```ignore
//! let engine = SyncEngine::new(remote, collections, cache, EngineOptions::from(&config))?;
//! let mut events = engine.subscribe();
//! engine.authenticate().await?;
//! ```

mod engine;
mod events;
mod interval;
mod reconcile;

pub use engine::{EngineOptions, SyncEngine};
pub use events::{
    CollectionReport, EnginePhase, LocalMutation, PassReport, SyncErrorDetail, SyncEvent,
};
pub use interval::{IntervalController, PassTimer};
pub use reconcile::{reconcile, SyncPlan};
