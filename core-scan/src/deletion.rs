//! Crash-safe asset deletion queue.
//!
//! Each request persists an `asset_deletion/<location>` marker before
//! anything touches the library, so requests survive process death; markers
//! found at startup are swept by [`ScanCoordinator::start`]. One worker at a
//! time drains the markers:
//! - library busy: keep the marker, retry after backoff
//! - asset gone or not written by us: drop the marker silently
//! - any other failure: drop the marker and log; retrying cannot help
//!
//! [`ScanCoordinator::start`]: crate::coordinator::ScanCoordinator::start

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use bridge_traits::library::{AssetLocation, MediaLibrary};
use bridge_traits::storage::KeyValueStore;
use core_runtime::events::{CoreEvent, DeletionEvent, EventBus};

use crate::error::Result;
use crate::keys;

/// The deletion queue. Cheap to clone; clones share the worker guard.
#[derive(Clone)]
pub(crate) struct DeletionQueue {
    library: Arc<dyn MediaLibrary>,
    store: Arc<dyn KeyValueStore>,
    events: EventBus,
    backoff: Duration,
    /// True while a drain worker is running; only one runs at a time.
    draining: Arc<Mutex<bool>>,
}

impl DeletionQueue {
    pub(crate) fn new(
        library: Arc<dyn MediaLibrary>,
        store: Arc<dyn KeyValueStore>,
        events: EventBus,
        backoff: Duration,
    ) -> Self {
        Self {
            library,
            store,
            events,
            backoff,
            draining: Arc::new(Mutex::new(false)),
        }
    }

    /// Persist a marker for `location` and kick the worker.
    pub(crate) async fn enqueue(&self, location: &AssetLocation) -> Result<()> {
        self.store
            .set_string(&keys::deletion_key(location), "1")
            .await?;
        debug!(%location, "deletion queued");
        self.events
            .emit(CoreEvent::Deletion(DeletionEvent::Queued {
                location: location.to_string(),
            }))
            .ok();
        self.process();
        Ok(())
    }

    /// Start a drain worker unless one is already running.
    pub(crate) fn process(&self) {
        if !self.claim() {
            return;
        }

        let queue = self.clone();
        tokio::spawn(async move {
            loop {
                let swept = queue.drain().await;
                *queue.lock_draining() = false;
                if !swept {
                    return;
                }
                // A marker enqueued between drain's final empty check and the
                // flag reset above has no worker yet; pick it up here.
                let pending = matches!(
                    queue.store.keys_with_prefix(keys::ASSET_DELETION_PREFIX).await,
                    Ok(markers) if !markers.is_empty()
                );
                if !pending || !queue.claim() {
                    return;
                }
            }
        });
    }

    /// Take the worker slot; false means another worker holds it.
    fn claim(&self) -> bool {
        let mut draining = self.lock_draining();
        if *draining {
            return false;
        }
        *draining = true;
        true
    }

    fn lock_draining(&self) -> MutexGuard<'_, bool> {
        match self.draining.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Drain markers until none remain. True when the queue emptied; false
    /// when the worker gave up on a store error.
    async fn drain(&self) -> bool {
        loop {
            let markers = match self.store.keys_with_prefix(keys::ASSET_DELETION_PREFIX).await {
                Ok(markers) => markers,
                Err(e) => {
                    warn!(error = %e, "deletion markers unreadable; worker exits");
                    return false;
                }
            };
            let Some(marker) = markers.into_iter().next() else {
                return true;
            };
            let Some(location) = keys::deletion_location(&marker) else {
                // Prefix-listed keys always carry the prefix.
                return false;
            };

            if self.delete_one(&location).await {
                if let Err(e) = self.store.delete(&marker).await {
                    warn!(error = %e, "deletion marker not removed; worker exits");
                    return false;
                }
                self.events
                    .emit(CoreEvent::Deletion(DeletionEvent::Completed {
                        location: location.to_string(),
                    }))
                    .ok();
            } else {
                self.events
                    .emit(CoreEvent::Deletion(DeletionEvent::Retrying {
                        location: location.to_string(),
                    }))
                    .ok();
                tokio::time::sleep(self.backoff).await;
            }
        }
    }

    /// Attempt one deletion. True means the marker is finished (deleted,
    /// vanished, or not ours); false means retry after backoff.
    async fn delete_one(&self, location: &AssetLocation) -> bool {
        let asset = match self.library.fetch_asset(location).await {
            Ok(asset) => asset,
            Err(e) if e.is_busy() => {
                info!(%location, "library busy fetching asset; will retry");
                return false;
            }
            Err(e) => {
                debug!(%location, error = %e, "asset already gone; dropping entry");
                return true;
            }
        };

        if !asset.editable() {
            // Only assets this app wrote may be deleted; anything else
            // succeeds silently so the queue never wedges.
            debug!(%location, "asset not editable; dropping entry");
            return true;
        }

        match self.library.delete_asset(&asset).await {
            Ok(()) => {
                info!(%location, "asset deleted");
                true
            }
            Err(e) if e.is_busy() => {
                info!(%location, "library busy deleting asset; will retry");
                false
            }
            Err(e) => {
                warn!(%location, error = %e, "permanent deletion failure; dropping entry");
                true
            }
        }
    }
}
