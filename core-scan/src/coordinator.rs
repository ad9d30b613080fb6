//! Scan scheduling and the engine's public surface.
//!
//! The coordinator owns exactly one scan session at a time. Triggers
//! (explicit calls, library change notifications) are debounced: each trigger
//! cancels whatever is running or pending, waits out a quiet period, and the
//! last trigger standing starts the session. A superseded session is fully
//! drained before its replacement begins, so two sessions never touch the
//! store concurrently.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use bridge_traits::error::BridgeError;
use bridge_traits::library::{
    Asset, AssetGroup, AssetMetadata, AuthorizationStatus, MediaLibrary,
};
use bridge_traits::storage::KeyValueStore;
use bridge_traits::time::Clock;
use bytes::Bytes;
use core_runtime::events::EventBus;

use crate::catalog::CatalogIndex;
use crate::config::ScanConfig;
use crate::deletion::DeletionQueue;
use crate::error::Result;
use crate::identity::{AssetIdentity, Fingerprint, FingerprintKind};
use crate::keys;
use crate::session::{ScanMode, ScanOutcome, ScanSession};

/// Where the scheduler currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing running or pending.
    Idle,
    /// A trigger is waiting out the quiet period.
    Debouncing {
        /// Identifies the trigger; a newer trigger supersedes it.
        token: u64,
    },
    /// A session is running.
    Scanning,
}

struct ActiveSession {
    run_token: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct CoordinatorState {
    /// Cached platform authorization. Refreshed explicitly, never queried
    /// while this state is locked.
    authorization: AuthorizationStatus,
    scheduler: SchedulerState,
    /// Monotonic trigger counter; the latest value wins the debounce.
    debounce_token: u64,
    /// Token of the session currently (or last) running.
    current_run: u64,
    session: Option<ActiveSession>,
    stopped: bool,
    /// Whether any session has started since construction. The first scan
    /// after a launch is quick so startup stays cheap.
    scanned_once: bool,
    /// Bumped on every library change; the verified set belongs to one
    /// generation only.
    generation: u64,
    /// Identity keys verified since the last library change.
    verified: HashSet<String>,
    /// Group handles from the last completed run. Held so the platform keeps
    /// delivering change notifications for those groups.
    group_handles: HashMap<String, Arc<dyn AssetGroup>>,
    change_listener: Option<JoinHandle<()>>,
}

struct CoordinatorInner {
    library: Arc<dyn MediaLibrary>,
    store: Arc<dyn KeyValueStore>,
    catalog: Arc<dyn CatalogIndex>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    config: ScanConfig,
    deletions: DeletionQueue,
    state: Mutex<CoordinatorState>,
}

/// The scan engine's entry point.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ScanCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl ScanCoordinator {
    pub fn new(
        library: Arc<dyn MediaLibrary>,
        store: Arc<dyn KeyValueStore>,
        catalog: Arc<dyn CatalogIndex>,
        events: EventBus,
        clock: Arc<dyn Clock>,
        config: ScanConfig,
    ) -> Self {
        let deletions = DeletionQueue::new(
            Arc::clone(&library),
            Arc::clone(&store),
            events.clone(),
            config.deletion_backoff,
        );
        Self {
            inner: Arc::new(CoordinatorInner {
                library,
                store,
                catalog,
                events,
                clock,
                config,
                deletions,
                state: Mutex::new(CoordinatorState {
                    authorization: AuthorizationStatus::Undetermined,
                    scheduler: SchedulerState::Idle,
                    debounce_token: 0,
                    current_run: 0,
                    session: None,
                    stopped: false,
                    scanned_once: false,
                    generation: 0,
                    verified: HashSet::new(),
                    group_handles: HashMap::new(),
                    change_listener: None,
                }),
            }),
        }
    }

    /// Wire up the change listener and sweep deletion markers left over from
    /// a previous process. Does not scan; call [`scan`](Self::scan) for that.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        self.refresh_authorization().await;

        let mut rx = self.inner.library.subscribe_changes();
        {
            let mut state = self.inner.state.lock().await;
            if state.change_listener.is_some() {
                debug!("already started");
                return Ok(());
            }
            let inner = Arc::clone(&self.inner);
            state.change_listener = Some(tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        // A lagged receiver still means the library changed.
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            CoordinatorInner::on_library_changed(&inner).await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }

        self.inner.deletions.process();
        Ok(())
    }

    /// Re-query platform authorization and cache the result.
    pub async fn refresh_authorization(&self) -> AuthorizationStatus {
        let status = self.inner.library.authorization_status().await;
        self.inner.state.lock().await.authorization = status;
        status
    }

    /// The cached authorization status.
    pub async fn authorization_status(&self) -> AuthorizationStatus {
        self.inner.state.lock().await.authorization
    }

    /// Force the platform permission prompt if the user was never asked.
    #[instrument(skip(self))]
    pub async fn authorize(&self) -> Result<AuthorizationStatus> {
        let cached = self.inner.state.lock().await.authorization;
        if cached != AuthorizationStatus::Undetermined {
            return Ok(cached);
        }
        let status = self.inner.library.request_authorization().await?;
        info!(?status, "authorization resolved");
        self.inner.state.lock().await.authorization = status;
        Ok(status)
    }

    /// Request a scan if nothing is running or pending. The engine picks full
    /// vs quick.
    #[instrument(skip(self))]
    pub async fn scan(&self) {
        {
            let state = self.inner.state.lock().await;
            if state.stopped
                || !state.authorization.is_authorized()
                || state.scheduler != SchedulerState::Idle
            {
                debug!(scheduler = ?state.scheduler, "scan request ignored");
                return;
            }
        }
        CoordinatorInner::trigger_scan(&self.inner, true).await;
    }

    /// Request a scan unconditionally, superseding any running or pending one.
    /// With `allow_full` false the run is pinned to a quick scan.
    #[instrument(skip(self))]
    pub async fn force_scan(&self, allow_full: bool) {
        CoordinatorInner::trigger_scan(&self.inner, allow_full).await;
    }

    /// Cancel any active session and detach from change notifications.
    ///
    /// The listener lingers for the configured grace period to drain
    /// notifications already in flight; it ignores them because the stopped
    /// flag is already set.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let listener = {
            let mut state = self.inner.state.lock().await;
            state.stopped = true;
            state.scheduler = SchedulerState::Idle;
            if let Some(session) = state.session.take() {
                session.cancel.cancel();
            }
            state.change_listener.take()
        };
        info!("scan coordinator stopped");

        if let Some(listener) = listener {
            let grace = self.inner.config.stop_grace;
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                listener.abort();
            });
        }
    }

    /// Resolve an identity key to the asset that currently matches it.
    ///
    /// `Ok(None)` means the key decodes fine but no asset with that content
    /// is at that location anymore; the caller treats the asset as gone.
    #[instrument(skip(self))]
    pub async fn resolve_identity(&self, key: &str) -> Result<Option<Arc<dyn Asset>>> {
        let identity = AssetIdentity::parse(key)?;

        let verified = self.inner.state.lock().await.verified.contains(key);

        let asset = match self.inner.library.fetch_asset(&identity.location).await {
            Ok(asset) => asset,
            Err(e) => {
                debug!(location = %identity.location, error = %e, "location no longer resolves");
                return Ok(None);
            }
        };
        if verified {
            return Ok(Some(asset));
        }

        // The location resolved but locations are reused; confirm the content
        // actually matches before vouching for it.
        let kind = identity.fingerprint.kind();
        let thumbnail = match kind {
            FingerprintKind::Current => asset.square_thumbnail().await,
            FingerprintKind::Legacy => asset.aspect_ratio_thumbnail().await,
            FingerprintKind::Unknown => {
                // No thumbnail to recompute it from, so it can never verify.
                debug!(location = %identity.location, "unrecognized fingerprint format");
                return Ok(None);
            }
        };
        let Ok(Some(thumbnail)) = thumbnail else {
            return Ok(None);
        };
        let actual = match kind {
            FingerprintKind::Current => Fingerprint::from_square_thumbnail(&thumbnail),
            _ => Fingerprint::from_aspect_thumbnail(&thumbnail),
        };
        if actual == identity.fingerprint {
            self.inner
                .state
                .lock()
                .await
                .verified
                .insert(key.to_string());
            Ok(Some(asset))
        } else {
            debug!(location = %identity.location, "fingerprint mismatch; location was reused");
            Ok(None)
        }
    }

    /// Write a new asset into the library and return its identity.
    ///
    /// The identity is marked verified immediately: we just wrote the content,
    /// so no fingerprint re-check is needed until the next library change.
    #[instrument(skip(self, data))]
    pub async fn add_asset(&self, data: Bytes, metadata: AssetMetadata) -> Result<AssetIdentity> {
        let location = self.inner.library.write_asset(data, metadata).await?;
        let asset = self.inner.library.fetch_asset(&location).await?;
        let thumbnail = asset.square_thumbnail().await?.ok_or_else(|| {
            BridgeError::OperationFailed(format!("written asset at {location} has no thumbnail"))
        })?;
        let identity = AssetIdentity::new(location, Fingerprint::from_square_thumbnail(&thumbnail));

        info!(location = %identity.location, "asset written");
        self.inner
            .state
            .lock()
            .await
            .verified
            .insert(identity.key());
        Ok(identity)
    }

    /// Queue an asset for deletion. Persists a marker first, so the request
    /// survives a crash; the queue retries busy libraries with backoff.
    #[instrument(skip(self))]
    pub async fn queue_deletion(&self, key: &str) -> Result<()> {
        let identity = AssetIdentity::parse(key)?;
        self.inner.deletions.enqueue(&identity.location).await
    }

    /// Current scheduler state, for diagnostics.
    pub async fn scheduler_state(&self) -> SchedulerState {
        self.inner.state.lock().await.scheduler
    }
}

impl CoordinatorInner {
    async fn on_library_changed(inner: &Arc<Self>) {
        {
            let mut state = inner.state.lock().await;
            if state.stopped {
                return;
            }
            // Locations may have been reused; everything must re-verify.
            state.generation += 1;
            state.verified.clear();
            debug!(generation = state.generation, "library changed");
        }
        Self::trigger_scan(inner, true).await;
    }

    async fn trigger_scan(inner: &Arc<Self>, allow_full: bool) {
        let (token, superseded) = {
            let mut state = inner.state.lock().await;
            if state.stopped || !state.authorization.is_authorized() {
                debug!(stopped = state.stopped, "scan trigger ignored");
                return;
            }
            let superseded = state.session.take();
            if let Some(session) = &superseded {
                session.cancel.cancel();
            }
            state.debounce_token += 1;
            let token = state.debounce_token;
            state.scheduler = SchedulerState::Debouncing { token };
            (token, superseded)
        };

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            if let Some(superseded) = superseded {
                // Drain the cancelled run before its replacement may start.
                if let Err(e) = superseded.task.await {
                    error!(error = %e, "superseded scan task panicked");
                }
            }
            tokio::time::sleep(inner.config.debounce).await;
            Self::start_session(&inner, token, allow_full).await;
        });
    }

    async fn start_session(inner: &Arc<Self>, token: u64, allow_full: bool) {
        // Policy inputs are read before locking; the store locks internally.
        let format = inner
            .store
            .get_string(keys::ASSETS_FORMAT)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "format read failed; assuming missing");
                None
            });
        let last_full = inner
            .store
            .get_i64(keys::LAST_FULL_SCAN)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "full-scan stamp read failed; assuming missing");
                None
            });

        let mut state = inner.state.lock().await;
        if state.stopped || state.scheduler != (SchedulerState::Debouncing { token }) {
            debug!(token, "debounced trigger superseded");
            return;
        }

        let mode = choose_mode(
            allow_full,
            format.as_deref(),
            last_full,
            state.scanned_once,
            inner.clock.unix_timestamp(),
            inner.config.full_scan_interval,
        );
        state.scanned_once = true;
        state.scheduler = SchedulerState::Scanning;
        state.current_run = token;

        info!(?mode, token, "starting scan session");
        let cancel = CancellationToken::new();
        let session = ScanSession::new(
            mode,
            cancel.clone(),
            Arc::clone(&inner.library),
            Arc::clone(&inner.store),
            Arc::clone(&inner.catalog),
            inner.events.clone(),
            Arc::clone(&inner.clock),
            &inner.config,
        );
        let task_inner = Arc::clone(inner);
        let task = tokio::spawn(async move {
            let result = session.run().await;
            Self::on_session_finished(task_inner, token, result).await;
        });
        // Still under the state lock, so the finish handler cannot observe a
        // half-registered session.
        state.session = Some(ActiveSession {
            run_token: token,
            cancel,
            task,
        });
    }

    /// Boxed because the rescan chain re-enters [`Self::trigger_scan`], whose
    /// spawned task leads back here; without type erasure the future type is
    /// infinitely recursive.
    fn on_session_finished(
        inner: Arc<Self>,
        run_token: u64,
        result: Result<ScanOutcome>,
    ) -> BoxFuture<'static, ()> {
        async move {
            let outcome = match result {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    error!(error = %e, "scan session failed");
                    None
                }
            };

            let needs_full_rescan = {
                let mut state = inner.state.lock().await;
                if state
                    .session
                    .as_ref()
                    .is_some_and(|s| s.run_token == run_token)
                {
                    state.session = None;
                    if state.scheduler == SchedulerState::Scanning {
                        state.scheduler = SchedulerState::Idle;
                    }
                }
                match outcome {
                    Some(outcome) if !outcome.cancelled => {
                        state.verified.extend(outcome.verified);
                        state.group_handles = outcome.group_handles;
                        outcome.needs_full_rescan
                    }
                    _ => false,
                }
            };

            // Deletions queued while the scan held the library can proceed now.
            inner.deletions.process();

            if needs_full_rescan {
                info!("group set changed under a quick scan; scheduling full scan");
                Self::trigger_scan(&inner, true).await;
            }
        }
        .boxed()
    }
}

/// Full-vs-quick policy for one trigger.
fn choose_mode(
    allow_full: bool,
    format: Option<&str>,
    last_full: Option<i64>,
    scanned_once: bool,
    now: i64,
    full_interval: Duration,
) -> ScanMode {
    if !allow_full {
        return ScanMode::Quick;
    }
    // Missing or outdated persisted state always wins: deletions cannot be
    // settled until a full scan under the current format has run.
    let Some(last_full) = last_full else {
        return ScanMode::Full;
    };
    if format != Some(keys::ASSETS_FORMAT_VERSION) {
        return ScanMode::Full;
    }
    if !scanned_once {
        return ScanMode::Quick;
    }
    if now.saturating_sub(last_full) >= full_interval.as_secs() as i64 {
        ScanMode::Full
    } else {
        ScanMode::Quick
    }
}
