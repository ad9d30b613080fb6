//! One scan run.
//!
//! A session enumerates groups, fingerprints their assets, and reconciles
//! persisted state when it completes. The coordinator creates one session per
//! run and never lets two overlap.
//!
//! Work units (one per in-flight group, one per in-flight asset) are tracked
//! by a single counter; the run is drained when the counter is zero *and* the
//! pending-group queue is empty. Either condition alone is not enough: a
//! group being enumerated keeps the counter positive while the queue empties,
//! and queued groups keep the queue non-empty while the counter is zero
//! between dispatches.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bridge_traits::library::{
    Asset, AssetFilter, AssetGroup, AssetLocation, EnumerationOrder, MediaLibrary, GROUP_ALL,
    GROUP_SAVED_PHOTOS,
};
use bridge_traits::storage::KeyValueStore;
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, ScanEvent};

use crate::catalog::CatalogIndex;
use crate::config::ScanConfig;
use crate::error::Result;
use crate::identity::{AssetIdentity, Fingerprint};
use crate::keys;

/// Whether a run detects deletions (full) or only picks up additions (quick).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Scan everything; compute the not-found set; stamp `last_full_asset_scan`.
    Full,
    /// Newest-first sweep that exits one asset past the last new one.
    Quick,
}

impl ScanMode {
    pub fn is_full(&self) -> bool {
        matches!(self, ScanMode::Full)
    }
}

/// What a finished session hands back to the coordinator.
pub(crate) struct ScanOutcome {
    pub cancelled: bool,
    /// A quick scan saw previously-known groups vanish; the coordinator
    /// immediately schedules a full scan.
    pub needs_full_rescan: bool,
    /// Identity keys verified this run.
    pub verified: Vec<String>,
    /// Group handles, retained so the platform keeps delivering change
    /// notifications for them.
    pub group_handles: HashMap<String, Arc<dyn AssetGroup>>,
}

/// Per-group quick-scan bookkeeping, shared between the group's enumeration
/// loop and its asset tasks.
struct GroupProgress {
    /// Set once enough known assets have been seen; the enumeration loop
    /// checks it before pulling the next asset.
    stop: AtomicBool,
    /// Assets still expected to be new, seeded from the count delta since the
    /// last run. Decremented (saturating) per unknown identity.
    remaining_new: AtomicU64,
}

#[derive(Default)]
struct SessionState {
    /// In-flight work units: one per dispatched group, one per spawned asset.
    still_scanning: u64,
    /// Groups currently being enumerated, bounded by `group_concurrency`.
    active_groups: usize,
    /// Groups discovered but not yet dispatched. Camera roll goes to the front.
    pending_groups: VecDeque<Arc<dyn AssetGroup>>,
    /// Counts persisted by the previous run, keyed by group id.
    prior_counts: HashMap<String, u64>,
    /// Counts observed this run.
    group_counts: HashMap<String, u64>,
    group_handles: HashMap<String, Arc<dyn AssetGroup>>,
    /// Full scans: locations not yet encountered. Whatever remains at the end
    /// was deleted.
    not_found: HashSet<AssetLocation>,
    verified: Vec<String>,
    assets_scanned: u64,
    sequence: u64,
    /// Enumeration failed somewhere (group stream, group count, or an asset
    /// stream); the run ends with no reconciliation. Unvisited locations must
    /// never be reported deleted on the strength of a partial walk.
    enumeration_failed: bool,
}

pub(crate) struct ScanSession {
    mode: ScanMode,
    cancel: CancellationToken,
    library: Arc<dyn MediaLibrary>,
    store: Arc<dyn KeyValueStore>,
    catalog: Arc<dyn CatalogIndex>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    group_concurrency: usize,
    state: Mutex<SessionState>,
    /// Signalled whenever the drain condition may have become true.
    done: Notify,
    /// Bounds concurrent fingerprinting. A slot is acquired *before* pulling
    /// the next asset from the stream, so at concurrency 1 the quick scan's
    /// stop flag is always observed with the previous asset fully processed.
    asset_slots: Arc<Semaphore>,
}

impl ScanSession {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        mode: ScanMode,
        cancel: CancellationToken,
        library: Arc<dyn MediaLibrary>,
        store: Arc<dyn KeyValueStore>,
        catalog: Arc<dyn CatalogIndex>,
        events: EventBus,
        clock: Arc<dyn Clock>,
        config: &ScanConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            mode,
            cancel,
            library,
            store,
            catalog,
            events,
            clock,
            group_concurrency: config.group_concurrency.max(1),
            state: Mutex::new(SessionState::default()),
            done: Notify::new(),
            asset_slots: Arc::new(Semaphore::new(config.asset_concurrency.max(1))),
        })
    }

    /// Run the session to completion (or cancellation) and reconcile.
    pub(crate) async fn run(self: Arc<Self>) -> Result<ScanOutcome> {
        let prior_counts = self.load_prior_counts().await?;
        {
            let mut state = self.lock_state();
            state.prior_counts = prior_counts;
            if self.mode.is_full() {
                state.not_found = self.catalog.known_locations().into_iter().collect();
            }
        }

        info!(mode = ?self.mode, "scan session starting");
        self.events
            .emit(CoreEvent::Scan(ScanEvent::Started {
                full: self.mode.is_full(),
            }))
            .ok();

        let mut groups = self.library.groups(GROUP_ALL);
        loop {
            let item = tokio::select! {
                _ = self.cancel.cancelled() => break,
                item = groups.next() => item,
            };
            match item {
                None => break,
                Some(Ok(group)) => {
                    let mut state = self.lock_state();
                    let id = group.persistent_id();
                    state.group_handles.insert(id, Arc::clone(&group));
                    // The camera roll is where new captures land; scan it first.
                    if group.group_type() & GROUP_SAVED_PHOTOS != 0 {
                        state.pending_groups.push_front(group);
                    } else {
                        state.pending_groups.push_back(group);
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "group enumeration failed; run ends without reconciliation");
                    self.fail_enumeration();
                    break;
                }
            }
        }
        drop(groups);

        // Dispatch only once the group list is complete, so the camera-roll
        // priority holds regardless of the order the platform yielded groups.
        {
            let mut state = self.lock_state();
            if state.enumeration_failed {
                state.pending_groups.clear();
            } else {
                Self::dispatch_groups(&self, &mut state);
            }
        }

        // Drain barrier.
        loop {
            {
                let mut state = self.lock_state();
                if self.cancel.is_cancelled() {
                    state.pending_groups.clear();
                }
                if state.still_scanning == 0 && state.pending_groups.is_empty() {
                    break;
                }
            }
            self.done.notified().await;
        }

        self.reconcile().await
    }

    /// Record an enumeration failure and drop the groups not yet dispatched;
    /// in-flight work drains normally, then `reconcile` persists nothing.
    fn fail_enumeration(&self) {
        let mut state = self.lock_state();
        state.enumeration_failed = true;
        state.pending_groups.clear();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        // Held only for field updates, never across an await; a poisoned lock
        // means a panicked scan task and the run cannot continue anyway.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn load_prior_counts(&self) -> Result<HashMap<String, u64>> {
        let mut counts = HashMap::new();
        for key in self.store.keys_with_prefix(keys::ASSET_COUNT_PREFIX).await? {
            if let Some(group_id) = key.strip_prefix(keys::ASSET_COUNT_PREFIX) {
                if let Some(count) = self.store.get_i64(&key).await? {
                    counts.insert(group_id.to_string(), count.max(0) as u64);
                }
            }
        }
        Ok(counts)
    }

    /// Pop pending groups into scan tasks up to the concurrency limit.
    /// Caller holds the state lock.
    fn dispatch_groups(this: &Arc<Self>, state: &mut SessionState) {
        while state.active_groups < this.group_concurrency && !this.cancel.is_cancelled() {
            let Some(group) = state.pending_groups.pop_front() else {
                break;
            };
            state.active_groups += 1;
            state.still_scanning += 1;
            tokio::spawn(Arc::clone(this).run_group(group));
        }
    }

    async fn run_group(self: Arc<Self>, group: Arc<dyn AssetGroup>) {
        if !self.cancel.is_cancelled() {
            Self::scan_group(&self, &group).await;
        }

        let mut state = self.lock_state();
        state.active_groups -= 1;
        state.still_scanning -= 1;
        if self.cancel.is_cancelled() || state.enumeration_failed {
            state.pending_groups.clear();
        } else {
            Self::dispatch_groups(&self, &mut state);
        }
        if state.still_scanning == 0 && state.pending_groups.is_empty() {
            self.done.notify_one();
        }
    }

    async fn scan_group(this: &Arc<Self>, group: &Arc<dyn AssetGroup>) {
        let group_id = group.persistent_id();

        group.set_assets_filter(AssetFilter::Photos);
        let count = match group.asset_count().await {
            Ok(count) => count,
            Err(e) => {
                warn!(group = %group_id, error = %e, "group count unavailable; run ends without reconciliation");
                this.fail_enumeration();
                return;
            }
        };

        let prior = {
            let mut state = this.lock_state();
            state.group_counts.insert(group_id.clone(), count);
            state.prior_counts.get(&group_id).copied().unwrap_or(0)
        };
        // Count delta since the last run seeds the new-asset estimate. It
        // under-counts when additions and removals offset, which only delays
        // the early exit, never skips assets.
        let expected_new = count.saturating_sub(prior);

        debug!(group = %group_id, count, expected_new, "scanning group");
        this.events
            .emit(CoreEvent::Scan(ScanEvent::GroupBegan {
                group_id: group_id.clone(),
                asset_count: count,
            }))
            .ok();

        let progress = Arc::new(GroupProgress {
            stop: AtomicBool::new(false),
            remaining_new: AtomicU64::new(expected_new),
        });

        let mut assets = group.assets(EnumerationOrder::NewestFirst);
        loop {
            let permit = tokio::select! {
                _ = this.cancel.cancelled() => break,
                permit = Arc::clone(&this.asset_slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            if this.mode == ScanMode::Quick && progress.stop.load(Ordering::Acquire) {
                debug!(group = %group_id, "quick scan early exit");
                break;
            }

            let item = tokio::select! {
                _ = this.cancel.cancelled() => break,
                item = assets.next() => item,
            };
            match item {
                None => break,
                Some(Ok(asset)) => {
                    this.lock_state().still_scanning += 1;
                    tokio::spawn(Arc::clone(this).run_asset(asset, Arc::clone(&progress), permit));
                }
                Some(Err(e)) => {
                    warn!(group = %group_id, error = %e, "asset enumeration failed; run ends without reconciliation");
                    this.fail_enumeration();
                    break;
                }
            }
        }
    }

    async fn run_asset(
        self: Arc<Self>,
        asset: Arc<dyn Asset>,
        progress: Arc<GroupProgress>,
        permit: OwnedSemaphorePermit,
    ) {
        if !self.cancel.is_cancelled() {
            self.scan_asset(&asset, &progress).await;
        }
        // The quick-scan stop flag must be in place before the enumeration
        // loop can pull the next asset.
        drop(permit);

        let mut state = self.lock_state();
        state.still_scanning -= 1;
        if self.cancel.is_cancelled() {
            state.pending_groups.clear();
        }
        if state.still_scanning == 0 && state.pending_groups.is_empty() {
            self.done.notify_one();
        }
    }

    async fn scan_asset(&self, asset: &Arc<dyn Asset>, progress: &GroupProgress) {
        let location = asset.location();

        let thumbnail = match asset.square_thumbnail().await {
            Ok(thumbnail) => thumbnail,
            Err(e) => {
                debug!(location = %location, error = %e, "thumbnail fetch failed; skipping asset");
                None
            }
        };

        if self.mode.is_full() {
            // Encountered means present, fingerprintable or not; never report
            // a skipped asset as deleted.
            self.lock_state().not_found.remove(&location);
        }

        let Some(thumbnail) = thumbnail else {
            debug!(location = %location, "no square thumbnail; skipping asset");
            return;
        };

        let identity = AssetIdentity::new(
            location.clone(),
            Fingerprint::from_square_thumbnail(&thumbnail),
        );
        let key = identity.key();

        if self.mode == ScanMode::Quick {
            if self.catalog.contains_identity(&key) {
                if progress.remaining_new.load(Ordering::Acquire) == 0 {
                    progress.stop.store(true, Ordering::Release);
                }
            } else {
                let _ = progress
                    .remaining_new
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
            }
        }

        let sequence = {
            let mut state = self.lock_state();
            state.assets_scanned += 1;
            state.sequence += 1;
            state.verified.push(key.clone());
            state.sequence
        };

        self.events
            .emit(CoreEvent::Scan(ScanEvent::Progress {
                location: location.into_string(),
                identity_key: key,
                sequence,
                thumbnail: Some(thumbnail.to_vec()),
            }))
            .ok();
    }

    async fn reconcile(&self) -> Result<ScanOutcome> {
        let cancelled = self.cancel.is_cancelled();
        let state = std::mem::take(&mut *self.lock_state());
        let mut needs_full_rescan = false;

        if cancelled {
            info!("scan cancelled; skipping reconciliation");
        } else if state.enumeration_failed {
            warn!("scan ended after enumeration failure; skipping reconciliation");
        } else {
            let mut tx = self.store.begin_transaction().await?;
            for (group_id, count) in &state.group_counts {
                tx.set_i64(&keys::asset_count_key(group_id), *count as i64)
                    .await?;
            }
            tx.set_string(keys::ASSETS_FORMAT, keys::ASSETS_FORMAT_VERSION)
                .await?;
            if self.mode.is_full() {
                tx.set_i64(keys::LAST_FULL_SCAN, self.clock.unix_timestamp())
                    .await?;
            } else {
                // A quick scan cannot tell which assets a vanished group held.
                // Drop its counter and the full-scan stamp so the next run is
                // a full scan that settles deletions properly.
                let missing: Vec<&String> = state
                    .prior_counts
                    .keys()
                    .filter(|id| !state.group_handles.contains_key(*id))
                    .collect();
                if !missing.is_empty() {
                    info!(
                        missing = missing.len(),
                        "previously seen groups vanished; next scan will be full"
                    );
                    for group_id in &missing {
                        tx.delete(&keys::asset_count_key(group_id)).await?;
                    }
                    tx.delete(keys::LAST_FULL_SCAN).await?;
                    needs_full_rescan = true;
                }
            }
            tx.commit().await?;

            if self.mode.is_full() && !state.not_found.is_empty() {
                info!(count = state.not_found.len(), "reporting deleted assets");
                // No engine lock is held here; the catalog may call back in.
                self.catalog
                    .mark_deleted(state.not_found.iter().cloned().collect());
            }
        }

        let completed = !cancelled && !state.enumeration_failed;
        let not_found = (self.mode.is_full() && completed).then(|| {
            state
                .not_found
                .iter()
                .map(|location| location.to_string())
                .collect()
        });

        info!(
            cancelled,
            assets_scanned = state.assets_scanned,
            groups = state.group_handles.len(),
            "scan session finished"
        );
        self.events
            .emit(CoreEvent::Scan(ScanEvent::Ended {
                full: self.mode.is_full(),
                cancelled,
                not_found,
                verified: state.verified.clone(),
                group_ids: state.group_handles.keys().cloned().collect(),
                assets_scanned: state.assets_scanned,
            }))
            .ok();

        Ok(ScanOutcome {
            cancelled,
            needs_full_rescan,
            verified: state.verified,
            group_handles: state.group_handles,
        })
    }
}
