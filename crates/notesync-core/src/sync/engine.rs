//! Sync engine
//!
//! Drives the control loop: authenticate, run a pass over every configured
//! collection type in order, adapt the polling interval and schedule the
//! next pass. Failures never escape the loop; they are reported as
//! [`SyncEvent::Error`] and turned into a recovery action:
//!
//! - rejected credentials: re-authenticate, go idle if that fails
//! - no connectivity: poll again at the slowest interval
//! - anything else: poll again at the current interval
//!
//! Locally changed records can be pushed immediately with
//! [`SyncEngine::push_record`]. Those pushes are not serialized against a
//! running pass; the read-before-write on the remote and last-write-wins
//! settle any overlap on the next pass.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::{
    CollectionReport, EnginePhase, LocalMutation, PassReport, SyncErrorDetail, SyncEvent,
};
use super::interval::{IntervalController, PassTimer};
use super::reconcile::reconcile;
use crate::cache::IndexCache;
use crate::config::Config;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::local::CollectionSource;
use crate::models::{CollectionType, IndexEntry, Record};
use crate::remote::{is_record_file, RemoteStore};

/// Re-authentications attempted after a pass was rejected, per trigger
const MAX_REAUTHENTICATIONS: usize = 3;

/// Remote reads in flight at once while fetching a snapshot
const MAX_CONCURRENT_READS: usize = 8;

/// Capacity of the event channel
const EVENT_CHANNEL_SIZE: usize = 64;

/// Tunables for an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub interval_min: Duration,
    pub interval_max: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Config::default().into()
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            interval_min: config.interval_min(),
            interval_max: config.interval_max(),
        }
    }
}

impl From<Config> for EngineOptions {
    fn from(config: Config) -> Self {
        (&config).into()
    }
}

/// Mutable per-engine state
#[derive(Debug)]
struct SyncState {
    interval: IntervalController,
    authenticated: bool,
}

struct EngineInner {
    /// Tag for log lines
    id: String,
    remote: Arc<dyn RemoteStore>,
    collections: Vec<(CollectionType, Arc<dyn CollectionSource>)>,
    cache: tokio::sync::Mutex<IndexCache>,
    state: Mutex<SyncState>,
    timer: Mutex<PassTimer>,
    /// Held for the whole of a pass; passes never overlap
    pass_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<SyncEvent>,
    phase: watch::Sender<EnginePhase>,
}

/// Periodic bidirectional sync between local collections and a remote store
///
/// Cheap to clone; clones share the same engine. Dropping the last handle
/// cancels the scheduled pass.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Create an engine syncing `collections` in the given order
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        collections: Vec<(CollectionType, Arc<dyn CollectionSource>)>,
        cache: IndexCache,
        options: EngineOptions,
    ) -> SyncResult<Self> {
        if collections.is_empty() {
            return Err(SyncError::InvalidConfig(
                "no collection types to sync".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for (collection, _) in &collections {
            if !seen.insert(*collection) {
                return Err(SyncError::InvalidConfig(format!(
                    "collection '{}' configured twice",
                    collection
                )));
            }
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (phase, _) = watch::channel(EnginePhase::Idle);
        let id = format!("notesync-{}", &uuid::Uuid::new_v4().to_string()[..8]);

        Ok(Self {
            inner: Arc::new(EngineInner {
                id,
                remote,
                collections,
                cache: tokio::sync::Mutex::new(cache),
                state: Mutex::new(SyncState {
                    interval: IntervalController::new(options.interval_min, options.interval_max),
                    authenticated: false,
                }),
                timer: Mutex::new(PassTimer::new()),
                pass_lock: tokio::sync::Mutex::new(()),
                events,
                phase,
            }),
        })
    }

    /// Identifier used in log lines
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Subscribe to phase changes
    pub fn subscribe_status(&self) -> watch::Receiver<EnginePhase> {
        self.inner.phase.subscribe()
    }

    pub fn phase(&self) -> EnginePhase {
        *self.inner.phase.borrow()
    }

    /// Current polling interval
    pub fn interval(&self) -> Duration {
        self.state().interval.interval()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().authenticated
    }

    /// Whether a pass is scheduled and has not started yet
    pub fn is_scheduled(&self) -> bool {
        lock(&self.inner.timer).is_armed()
    }

    /// Cached `{id, updated}` index for a collection
    pub async fn cached_index(&self, collection: CollectionType) -> Option<Vec<IndexEntry>> {
        self.inner.cache.lock().await.index(collection)
    }

    /// Run a pass now, replacing any scheduled one
    ///
    /// Returns immediately; follow progress through [`subscribe`](Self::subscribe).
    /// A pass already running is not interrupted: the new one starts when it
    /// finishes. Must be called from within a tokio runtime.
    pub fn start(&self) {
        self.schedule(Duration::ZERO);
    }

    /// Cancel the scheduled pass; a running pass completes normally
    pub fn stop(&self) {
        if lock(&self.inner.timer).cancel() {
            debug!("[{}] Scheduled pass cancelled", self.inner.id);
        }
        if self.phase() == EnginePhase::Waiting {
            self.set_phase(EnginePhase::Idle);
        }
    }

    /// Verify credentials and, when accepted, start a pass
    ///
    /// When the remote is unreachable a retry is scheduled at the slowest
    /// interval and the error is still returned.
    pub async fn authenticate(&self) -> SyncResult<()> {
        match self.authenticate_remote().await {
            Ok(()) => {
                self.start();
                Ok(())
            }
            Err(e @ SyncError::NetworkUnavailable(_)) => {
                let next = self.state().interval.force_max();
                self.schedule(next);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Run exactly one pass and return its report, without scheduling another
    pub async fn sync_once(&self) -> SyncResult<PassReport> {
        self.run(false).await
    }

    /// Push a locally changed record right away, outside the pass cycle
    ///
    /// Spawns the push; the outcome is reported as an event. Does not affect
    /// the polling interval.
    pub fn on_local_mutation(&self, collection: CollectionType, record: Record) {
        let engine = self.clone();
        tokio::spawn(async move {
            let _ = engine.push_record(collection, &record).await;
        });
    }

    /// Push a locally changed record and wait for the outcome
    pub async fn push_record(&self, collection: CollectionType, record: &Record) -> SyncResult<()> {
        if record.id.is_empty() {
            return Ok(());
        }

        let result = match self.source(collection) {
            Some(source) => self.push(collection, source.as_ref(), record).await,
            None => Err(SyncError::UnknownCollection(collection)),
        };

        match &result {
            Ok(()) => self.emit(SyncEvent::RecordPushed {
                collection,
                id: record.id.clone(),
            }),
            Err(e) => {
                warn!("[{}] Out-of-band push failed: {}", self.inner.id, e);
                self.emit(SyncEvent::Error(e.into()));
            }
        }
        result
    }

    /// Push every mutation received on `rx`, one at a time
    ///
    /// The task ends when the channel closes or the engine is dropped.
    pub fn watch_mutations(&self, mut rx: mpsc::Receiver<LocalMutation>) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(mutation) = rx.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let engine = SyncEngine { inner };
                let _ = engine
                    .push_record(mutation.collection, &mutation.record)
                    .await;
            }
        })
    }

    fn schedule(&self, delay: Duration) {
        self.arm(delay);
        // A pass in flight keeps its phase until it finishes
        if let Ok(_idle) = self.inner.pass_lock.try_lock() {
            self.set_phase(EnginePhase::Waiting);
        }
    }

    fn arm(&self, delay: Duration) {
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        lock(&self.inner.timer).arm(delay, async move {
            if let Some(inner) = weak.upgrade() {
                let engine = SyncEngine { inner };
                // Failures are already reported as events
                let _ = engine.run(true).await;
            }
        });
        debug!("[{}] Next pass in {:?}", self.inner.id, delay);
    }

    /// Authenticate if needed, run a pass and apply the recovery policy
    async fn run(&self, reschedule: bool) -> SyncResult<PassReport> {
        let _pass = self.inner.pass_lock.lock().await;
        let mut reauthentications = 0;

        loop {
            if !self.is_authenticated() {
                if let Err(e) = self.authenticate_remote().await {
                    if matches!(e, SyncError::NetworkUnavailable(_)) {
                        let next = self.state().interval.force_max();
                        self.finish(reschedule, next);
                    }
                    return Err(e);
                }
            }

            match self.run_pass().await {
                Ok(report) => {
                    let next = self.state().interval.record_pass(report.remote_changed());
                    debug!(
                        "[{}] Remote changed: {}, interval now {:?}",
                        self.inner.id,
                        report.remote_changed(),
                        next
                    );
                    self.finish(reschedule, next);
                    return Ok(report);
                }
                Err(SyncError::Authentication(e)) if reauthentications < MAX_REAUTHENTICATIONS => {
                    warn!("[{}] Access rejected mid-pass, re-authenticating: {}", self.inner.id, e);
                    reauthentications += 1;
                    self.state().authenticated = false;
                    self.set_phase(EnginePhase::Authenticating);
                }
                Err(e @ SyncError::Authentication(_)) => {
                    self.state().authenticated = false;
                    self.set_phase(EnginePhase::Idle);
                    return Err(e);
                }
                Err(e @ SyncError::NetworkUnavailable(_)) => {
                    let next = self.state().interval.force_max();
                    self.finish(reschedule, next);
                    return Err(e);
                }
                Err(e) => {
                    let next = self.interval();
                    self.finish(reschedule, next);
                    return Err(e);
                }
            }
        }
    }

    fn finish(&self, reschedule: bool, next: Duration) {
        if reschedule {
            // Called with the pass lock held
            self.arm(next);
            self.set_phase(EnginePhase::Waiting);
        } else {
            self.set_phase(EnginePhase::Idle);
        }
    }

    async fn authenticate_remote(&self) -> SyncResult<()> {
        self.set_phase(EnginePhase::Authenticating);

        match self.inner.remote.authenticate().await {
            Ok(()) => {
                info!("[{}] Authenticated", self.inner.id);
                self.state().authenticated = true;
                self.emit(SyncEvent::Authenticated);
                Ok(())
            }
            Err(e) => {
                let error = match SyncError::from(e) {
                    SyncError::Remote(other) => SyncError::Authentication(other),
                    classified => classified,
                };
                warn!("[{}] Authentication failed: {}", self.inner.id, error);
                self.state().authenticated = false;
                if matches!(error, SyncError::Authentication(_)) {
                    self.set_phase(EnginePhase::Idle);
                }
                self.emit(SyncEvent::Error((&error).into()));
                Err(error)
            }
        }
    }

    /// One full pass over every collection type, strictly in order
    async fn run_pass(&self) -> SyncResult<PassReport> {
        self.set_phase(EnginePhase::Syncing);
        self.emit(SyncEvent::Started);
        info!("[{}] Sync pass started", self.inner.id);

        let mut report = PassReport::default();
        let mut outcome = Ok(());

        for (collection, source) in &self.inner.collections {
            match self.sync_collection(*collection, source.as_ref()).await {
                Ok(collection_report) => report.collections.push(collection_report),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        match outcome {
            Ok(()) => {
                info!(
                    "[{}] Sync pass finished: pulled={}, pushed={}, failed={}",
                    self.inner.id,
                    report.pulled(),
                    report.pushed(),
                    report.failures().len()
                );
                self.emit(SyncEvent::Completed(report.clone()));
                self.emit(SyncEvent::Stopped);

                let failures = report.failures();
                if !failures.is_empty() {
                    let ids: Vec<String> = failures
                        .iter()
                        .map(|(c, id)| format!("{}/{}", c, id))
                        .collect();
                    self.emit(SyncEvent::Error(SyncErrorDetail {
                        kind: ErrorKind::RemoteWrite,
                        message: format!("Failed to push {}", ids.join(", ")),
                    }));
                }
                Ok(report)
            }
            Err(e) => {
                warn!("[{}] Sync pass failed: {}", self.inner.id, e);
                self.emit(SyncEvent::Stopped);
                self.emit(SyncEvent::Error((&e).into()));
                Err(e)
            }
        }
    }

    /// Reconcile one collection type and refresh its cache entries
    async fn sync_collection(
        &self,
        collection: CollectionType,
        source: &dyn CollectionSource,
    ) -> SyncResult<CollectionReport> {
        let previous_listing = self.inner.cache.lock().await.listing(collection);

        let (local, (listing, remote)) = tokio::try_join!(
            fetch_local(collection, source),
            self.fetch_remote(collection)
        )?;

        if previous_listing.as_ref().is_some_and(|prev| *prev != listing) {
            debug!("[{}] Remote listing of {} changed", self.inner.id, collection);
        }

        let plan = reconcile(&local, &remote);
        let mut report = CollectionReport::new(collection);

        if !plan.to_local.is_empty() {
            debug!(
                "[{}] {} remote change(s) in {}",
                self.inner.id,
                plan.to_local.len(),
                collection
            );
            report.pulled = plan.to_local.len();
            source
                .save_all(plan.to_local)
                .await
                .map_err(|e| local_error(collection, e))?;
        }

        for record in &plan.to_remote {
            match self.push(collection, source, record).await {
                Ok(()) => report.pushed += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("[{}] {}", self.inner.id, e);
                    report.failed.push(record.id.clone());
                }
            }
        }

        let listing = if report.pushed > 0 {
            self.inner.remote.list(collection).await?
        } else {
            listing
        };

        let refreshed = fetch_local(collection, source).await?;
        let indexed: Vec<Record> = refreshed
            .into_iter()
            .filter(|r| !report.failed.contains(&r.id))
            .collect();

        let mut cache = self.inner.cache.lock().await;
        if let Err(e) = cache.store_index(collection, &indexed).await {
            warn!("[{}] Could not update index cache: {}", self.inner.id, e);
        }
        if let Err(e) = cache.store_listing(collection, &listing).await {
            warn!("[{}] Could not update listing cache: {}", self.inner.id, e);
        }

        Ok(report)
    }

    /// List a collection and read every record in it
    async fn fetch_remote(
        &self,
        collection: CollectionType,
    ) -> SyncResult<(Vec<String>, Vec<Record>)> {
        let listing = self.inner.remote.list(collection).await?;
        let reads: Vec<_> = listing
            .iter()
            .filter(|name| is_record_file(name))
            .map(|name| self.inner.remote.read(collection, name))
            .collect();
        let records: Vec<Record> = stream::iter(reads)
            .buffered(MAX_CONCURRENT_READS)
            .try_collect()
            .await?;
        Ok((listing, records))
    }

    /// Push one record, creating it remotely when a read reports it missing
    async fn push(
        &self,
        collection: CollectionType,
        source: &dyn CollectionSource,
        record: &Record,
    ) -> SyncResult<()> {
        let exists = match self.inner.remote.read(collection, &record.id).await {
            Ok(_) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(SyncError::push_failed(collection, &record.id, e)),
        };

        let redact = source.redact_fields_for(record);
        let outgoing = if redact.is_empty() {
            Cow::Borrowed(record)
        } else {
            Cow::Owned(record.redacted(&redact))
        };

        self.inner
            .remote
            .write(collection, &outgoing, !exists)
            .await
            .map_err(|e| SyncError::push_failed(collection, &record.id, e))?;

        debug!(
            "[{}] Pushed {}/{} ({})",
            self.inner.id,
            collection,
            record.id,
            if exists { "update" } else { "create" }
        );
        Ok(())
    }

    fn source(&self, collection: CollectionType) -> Option<Arc<dyn CollectionSource>> {
        self.inner
            .collections
            .iter()
            .find(|(c, _)| *c == collection)
            .map(|(_, source)| source.clone())
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        lock(&self.inner.state)
    }

    fn set_phase(&self, phase: EnginePhase) {
        self.inner.phase.send_replace(phase);
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.inner.events.send(event);
    }
}

async fn fetch_local(
    collection: CollectionType,
    source: &dyn CollectionSource,
) -> SyncResult<Vec<Record>> {
    source
        .fetch_all()
        .await
        .map_err(|e| local_error(collection, e))
}

fn local_error(collection: CollectionType, error: anyhow::Error) -> SyncError {
    SyncError::Local {
        collection,
        message: format!("{:#}", error),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
