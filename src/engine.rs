//! # Sync Engine
//!
//! Cache-first, cursor-paginated workout sync.
//!
//! ## Architecture
//!
//! The engine owns the only mutable shared state (the canonical collection and
//! its pagination flags) and exposes three operations that can run
//! concurrently:
//!
//! - **Initial**: hydrate from cache; serve it and refresh in the background, or
//!   fetch the first page on a cold start
//! - **Refresh**: fetch records newer than the newest held
//! - **LoadMore**: fetch records older than the oldest held
//!
//! Each kind has at most one instance in flight; starting a new one cancels the
//! previous instance of the same kind. Fetches of different kinds overlap, but
//! every commit (merge + persist) goes through a single writer lock, so two
//! pages finishing together are applied one after the other and cache writes
//! land in commit order.
//!
//! The merge itself runs under a plain mutex and never suspends; readers get
//! copies and never see a half-merged collection. Cancellation is checked after
//! the fetch and again under the writer lock, so a cancelled operation neither
//! merges nor persists.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::cache::{KeyValueStore, RecordCache};
use crate::collection::{CanonicalCollection, MergeDirection};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::events::{EventBus, SyncEvent};
use crate::remote::RemoteSource;
use crate::types::{
    CachedPaginationInfo, OperationKind, OperationPhase, PageResult, PaginationState, Record,
    SyncOutcome,
};

// ============================================================================
// Operation Bookkeeping
// ============================================================================

/// Handle for one running operation.
#[derive(Debug, Clone)]
pub(crate) struct Ticket {
    kind: OperationKind,
    generation: u64,
    token: CancellationToken,
}

impl Ticket {
    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug, Default)]
struct OperationSlot {
    generation: u64,
    token: Option<CancellationToken>,
    phase: OperationPhase,
}

/// Per-kind generation counters, cancellation tokens and phases.
#[derive(Debug, Default)]
pub(crate) struct OperationSlots {
    slots: [OperationSlot; 3],
}

impl OperationSlots {
    /// Register a new operation of `kind`, cancelling the one in flight.
    pub(crate) fn begin(&mut self, kind: OperationKind, phase: OperationPhase) -> Ticket {
        let slot = &mut self.slots[kind.index()];
        if let Some(previous) = slot.token.take() {
            debug!("[SyncEngine] Superseding in-flight {} operation", kind);
            previous.cancel();
        }
        slot.generation += 1;
        let token = CancellationToken::new();
        slot.token = Some(token.clone());
        slot.phase = phase;
        Ticket {
            kind,
            generation: slot.generation,
            token,
        }
    }

    /// Record the final phase, unless the ticket was superseded or cancelled.
    pub(crate) fn finish(&mut self, ticket: &Ticket, phase: OperationPhase) -> bool {
        let slot = &mut self.slots[ticket.kind.index()];
        if slot.generation != ticket.generation {
            return false;
        }
        slot.token = None;
        slot.phase = phase;
        true
    }

    /// Cancel the in-flight operation of `kind`. Returns whether one was running.
    pub(crate) fn cancel(&mut self, kind: OperationKind) -> bool {
        let slot = &mut self.slots[kind.index()];
        slot.generation += 1;
        slot.phase = OperationPhase::Idle;
        match slot.token.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether `ticket` is still the live operation of its kind.
    pub(crate) fn is_current(&self, ticket: &Ticket) -> bool {
        self.slots[ticket.kind.index()].generation == ticket.generation && !ticket.is_cancelled()
    }

    pub(crate) fn phase(&self, kind: OperationKind) -> OperationPhase {
        self.slots[kind.index()].phase
    }
}

// ============================================================================
// Engine State
// ============================================================================

#[derive(Debug, Default)]
struct EngineState {
    collection: CanonicalCollection,
    last_synced_at: Option<DateTime<Utc>>,
    hydrated: bool,
}

/// What to ask the remote for.
enum FetchPlan {
    Initial,
    Newer(String),
    Older(String),
}

struct EngineInner {
    remote: Arc<dyn RemoteSource>,
    cache: RecordCache,
    config: SyncConfig,
    state: Mutex<EngineState>,
    /// Serializes commits and the cache writes that follow them
    writer: tokio::sync::Mutex<()>,
    operations: Mutex<OperationSlots>,
    events: EventBus,
}

impl EngineInner {
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_operations(&self) -> MutexGuard<'_, OperationSlots> {
        self.operations.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Sync Engine
// ============================================================================

/// Cache-first, bidirectional pagination engine.
///
/// Cheap to clone; clones share the same state. Construct one per signed-in
/// user at the composition root and hand clones to consumers.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Create an engine. The cache is not read until [`SyncEngine::hydrate`]
    /// or the first operation.
    pub fn new(remote: Arc<dyn RemoteSource>, cache: RecordCache, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let events = EventBus::new(config.event_capacity);
        Ok(Self {
            inner: Arc::new(EngineInner {
                remote,
                cache,
                config,
                state: Mutex::new(EngineState::default()),
                writer: tokio::sync::Mutex::new(()),
                operations: Mutex::new(OperationSlots::default()),
                events,
            }),
        })
    }

    /// Create an engine over a key/value store using the configured cache keys.
    pub fn with_store(
        remote: Arc<dyn RemoteSource>,
        store: Arc<dyn KeyValueStore>,
        config: SyncConfig,
    ) -> Result<Self> {
        let cache = RecordCache::new(store, &config);
        Self::new(remote, cache, config)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    // ========================================================================
    // Read Accessors
    // ========================================================================

    /// Copy of the current records, most recent first.
    pub fn current_records(&self) -> Vec<Record> {
        self.inner.lock_state().collection.records().to_vec()
    }

    pub fn pagination(&self) -> PaginationState {
        self.inner.lock_state().collection.pagination()
    }

    pub fn has_more_older(&self) -> bool {
        self.inner.lock_state().collection.has_more_older()
    }

    pub fn has_newer_available(&self) -> bool {
        self.inner.lock_state().collection.has_newer_available()
    }

    /// Time of the last successful remote merge, restored from cache on hydrate.
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock_state().last_synced_at
    }

    pub fn len(&self) -> usize {
        self.inner.lock_state().collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock_state().collection.is_empty()
    }

    pub fn phase(&self, kind: OperationKind) -> OperationPhase {
        self.inner.lock_operations().phase(kind)
    }

    /// Busy flag for one operation kind.
    pub fn is_loading(&self, kind: OperationKind) -> bool {
        self.phase(kind) == OperationPhase::Loading
    }

    /// Subscribe to change and failure events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Restore the cached collection. Only the first call reads the cache.
    ///
    /// Returns whether cached records were restored. Unreadable caches are a
    /// miss, never an error.
    pub async fn hydrate(&self) -> bool {
        if self.inner.lock_state().hydrated {
            return false;
        }

        let _writer = self.inner.writer.lock().await;
        if self.inner.lock_state().hydrated {
            return false;
        }

        let (records, info) = self.inner.cache.load().await;

        let restored = {
            let mut state = self.inner.lock_state();
            state.hydrated = true;
            match records {
                Some(records) if !records.is_empty() && state.collection.is_empty() => {
                    state.collection = CanonicalCollection::from_cached(records, info.as_ref());
                    state.last_synced_at = info.and_then(|i| i.last_synced_at);
                    info!(
                        "[SyncEngine] Hydrated {} records from cache (has_more_older={})",
                        state.collection.len(),
                        state.collection.has_more_older()
                    );
                    Some(state.collection.len())
                }
                _ => {
                    debug!("[SyncEngine] No cached records restored");
                    None
                }
            }
        };

        match restored {
            Some(total) => {
                self.inner.events.emit(SyncEvent::Hydrated { total });
                true
            }
            None => false,
        }
    }

    /// Populate the collection.
    ///
    /// With a warm cache this returns [`SyncOutcome::FromCache`] without waiting
    /// on the network and refreshes in the background. With a cold cache it
    /// fetches the first page.
    pub async fn load_initial(&self) -> Result<SyncOutcome> {
        self.hydrate().await;

        let (total, newest_id) = {
            let state = self.inner.lock_state();
            (
                state.collection.len(),
                state.collection.newest_id().map(str::to_string),
            )
        };

        if let Some(newest_id) = newest_id {
            if self.inner.config.background_refresh {
                let ticket = self
                    .inner
                    .lock_operations()
                    .begin(OperationKind::Initial, OperationPhase::Succeeded);
                let engine = self.clone();
                tokio::spawn(async move {
                    // Failures reach consumers through OperationFailed events
                    let _ = engine.run(ticket, FetchPlan::Newer(newest_id)).await;
                });
                debug!(
                    "[SyncEngine] Served {} cached records, refreshing in background",
                    total
                );
            }
            return Ok(SyncOutcome::FromCache { total });
        }

        let ticket = self
            .inner
            .lock_operations()
            .begin(OperationKind::Initial, OperationPhase::Loading);
        self.run(ticket, FetchPlan::Initial).await
    }

    /// Pull records newer than the newest held. With nothing held this is a
    /// cold first-page fetch.
    pub async fn refresh(&self) -> Result<SyncOutcome> {
        self.hydrate().await;

        let ticket = self
            .inner
            .lock_operations()
            .begin(OperationKind::Refresh, OperationPhase::Loading);
        let newest_id = self
            .inner
            .lock_state()
            .collection
            .newest_id()
            .map(str::to_string);

        let plan = match newest_id {
            Some(cursor) => FetchPlan::Newer(cursor),
            None => FetchPlan::Initial,
        };
        self.run(ticket, plan).await
    }

    /// Pull records older than the oldest held.
    ///
    /// Returns [`SyncOutcome::Skipped`] without a network call when nothing
    /// older exists or nothing is held.
    pub async fn load_more(&self) -> Result<SyncOutcome> {
        self.hydrate().await;

        let cursor = {
            let state = self.inner.lock_state();
            if state.collection.has_more_older() {
                state.collection.oldest_id().map(str::to_string)
            } else {
                None
            }
        };
        let Some(cursor) = cursor else {
            debug!("[SyncEngine] load_more skipped, nothing older to fetch");
            return Ok(SyncOutcome::Skipped);
        };

        let ticket = self
            .inner
            .lock_operations()
            .begin(OperationKind::LoadMore, OperationPhase::Loading);
        self.run(ticket, FetchPlan::Older(cursor)).await
    }

    /// Cancel the in-flight operation of `kind`. The cancelled call returns
    /// [`SyncOutcome::Cancelled`].
    pub fn cancel(&self, kind: OperationKind) -> bool {
        let cancelled = self.inner.lock_operations().cancel(kind);
        if cancelled {
            info!("[SyncEngine] Cancelled {} operation", kind);
        }
        cancelled
    }

    /// Drop everything: in-flight operations, the collection and the cache.
    pub async fn reset(&self) -> Result<()> {
        {
            let mut operations = self.inner.lock_operations();
            for kind in OperationKind::ALL {
                operations.cancel(kind);
            }
        }

        let _writer = self.inner.writer.lock().await;
        {
            let mut state = self.inner.lock_state();
            state.collection.clear();
            state.last_synced_at = None;
            state.hydrated = true;
        }
        let cleared = self.inner.cache.clear().await;
        if let Err(e) = &cleared {
            warn!("[SyncEngine] Failed to clear cache on reset: {}", e);
        }

        self.inner.events.emit(SyncEvent::Reset);
        info!("[SyncEngine] Reset complete");
        cleared
    }

    // ========================================================================
    // Fetch / Commit
    // ========================================================================

    async fn run(&self, ticket: Ticket, plan: FetchPlan) -> Result<SyncOutcome> {
        let page_size = self.inner.config.page_size;
        let timeout = self.inner.config.request_timeout();
        let remote = Arc::clone(&self.inner.remote);

        let (direction, fetch) = match &plan {
            FetchPlan::Initial => (MergeDirection::Initial, remote.fetch_initial(page_size)),
            FetchPlan::Newer(cursor) => (
                MergeDirection::Head,
                remote.fetch_newer(Some(cursor.as_str()), page_size),
            ),
            FetchPlan::Older(cursor) => (
                MergeDirection::Tail,
                remote.fetch_older(cursor.as_str(), page_size),
            ),
        };

        debug!("[SyncEngine] {} fetch started", ticket.kind);
        let fetched = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => return Ok(self.cancelled(&ticket)),
            result = tokio::time::timeout(timeout, fetch) => result,
        };

        if ticket.is_cancelled() {
            return Ok(self.cancelled(&ticket));
        }

        let page = match fetched {
            Ok(Ok(page)) => page,
            Ok(Err(error)) => return Err(self.fail(&ticket, error)),
            Err(_) => return Err(self.fail(&ticket, SyncError::Timeout { after: timeout })),
        };

        self.commit(&ticket, &page, direction).await
    }

    async fn commit(
        &self,
        ticket: &Ticket,
        page: &PageResult,
        direction: MergeDirection,
    ) -> Result<SyncOutcome> {
        let _writer = self.inner.writer.lock().await;

        // Operations before state; cancel and begin cannot land between the
        // liveness check and the merge.
        let (report, records, info) = {
            let mut operations = self.inner.lock_operations();
            if !operations.is_current(ticket) {
                return Ok(self.cancelled(ticket));
            }
            let mut state = self.inner.lock_state();
            // A concurrent operation may have filled the collection while this
            // first page was in flight; merge instead of replacing.
            let direction = match direction {
                MergeDirection::Initial if !state.collection.is_empty() => MergeDirection::Head,
                other => other,
            };
            let report = state.collection.merge_page(page, direction);
            let now = Utc::now();
            state.last_synced_at = Some(now);
            let info = CachedPaginationInfo::from_state(&state.collection.pagination(), Some(now));
            operations.finish(ticket, OperationPhase::Succeeded);
            (report, state.collection.records().to_vec(), info)
        };

        info!(
            "[SyncEngine] {} merged {} records ({} new, {} total, has_more_older={})",
            ticket.kind,
            page.records.len(),
            report.added,
            report.total,
            info.has_more_older
        );

        // The remote stays authoritative; a failed write only costs a refetch
        if let Err(e) = self.inner.cache.save(&records, &info).await {
            warn!("[SyncEngine] Failed to persist {} records: {}", records.len(), e);
        }

        self.inner.events.emit(SyncEvent::CollectionChanged {
            operation: ticket.kind,
            added: report.added,
            total: report.total,
        });

        Ok(SyncOutcome::Merged {
            added: report.added,
            total: report.total,
        })
    }

    fn cancelled(&self, ticket: &Ticket) -> SyncOutcome {
        debug!("[SyncEngine] {} operation cancelled before commit", ticket.kind);
        SyncOutcome::Cancelled
    }

    fn fail(&self, ticket: &Ticket, error: SyncError) -> SyncError {
        warn!("[SyncEngine] {} failed: {}", ticket.kind, error);
        let current = self
            .inner
            .lock_operations()
            .finish(ticket, OperationPhase::Failed);
        if current {
            self.inner.events.emit(SyncEvent::OperationFailed {
                operation: ticket.kind,
                error: error.clone(),
            });
        }
        error
    }
}
