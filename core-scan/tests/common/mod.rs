//! Shared fakes for the scan engine integration tests: an in-memory media
//! library, a recording catalog, and a settable clock.
#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;

use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::library::{
    Asset, AssetFilter, AssetGroup, AssetLocation, AssetMetadata, AuthorizationStatus,
    EnumerationOrder, GroupTypeMask, LibraryChange, MediaLibrary,
};
use bridge_traits::storage::KeyValueStore;
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, Receiver, ScanEvent};
use core_scan::catalog::CatalogIndex;
use core_scan::identity::{AssetIdentity, Fingerprint};
use core_scan::{ScanConfig, ScanCoordinator};
use core_store::MemoryKeyValueStore;

// ============================================================================
// Fake Assets and Groups
// ============================================================================

pub struct FakeAsset {
    location: AssetLocation,
    pixels: Option<Bytes>,
    editable: bool,
    delay: Duration,
    thumbnail_fetches: AtomicUsize,
}

impl FakeAsset {
    pub fn new(location: &str, pixels: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            location: AssetLocation::new(location),
            pixels: Some(Bytes::copy_from_slice(pixels)),
            editable: true,
            delay: Duration::ZERO,
            thumbnail_fetches: AtomicUsize::new(0),
        })
    }

    /// An asset whose thumbnails cannot be produced.
    pub fn without_thumbnail(location: &str) -> Arc<Self> {
        Arc::new(Self {
            location: AssetLocation::new(location),
            pixels: None,
            editable: true,
            delay: Duration::ZERO,
            thumbnail_fetches: AtomicUsize::new(0),
        })
    }

    /// An asset not written by the app.
    pub fn read_only(location: &str, pixels: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            location: AssetLocation::new(location),
            pixels: Some(Bytes::copy_from_slice(pixels)),
            editable: false,
            delay: Duration::ZERO,
            thumbnail_fetches: AtomicUsize::new(0),
        })
    }

    /// An asset whose thumbnail takes `delay` to produce.
    pub fn slow(location: &str, pixels: &[u8], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            location: AssetLocation::new(location),
            pixels: Some(Bytes::copy_from_slice(pixels)),
            editable: true,
            delay,
            thumbnail_fetches: AtomicUsize::new(0),
        })
    }

    /// How many times either thumbnail was requested.
    pub fn fetches(&self) -> usize {
        self.thumbnail_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Asset for FakeAsset {
    fn location(&self) -> AssetLocation {
        self.location.clone()
    }

    fn editable(&self) -> bool {
        self.editable
    }

    async fn square_thumbnail(&self) -> BridgeResult<Option<Bytes>> {
        self.thumbnail_fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.pixels.clone())
    }

    async fn aspect_ratio_thumbnail(&self) -> BridgeResult<Option<Bytes>> {
        self.thumbnail_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.pixels.clone())
    }
}

pub struct FakeGroup {
    id: String,
    group_type: GroupTypeMask,
    assets: Mutex<Vec<Arc<FakeAsset>>>,
    count_error: AtomicBool,
    asset_error: AtomicBool,
}

impl FakeGroup {
    pub fn new(id: &str, group_type: GroupTypeMask) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            group_type,
            assets: Mutex::new(Vec::new()),
            count_error: AtomicBool::new(false),
            asset_error: AtomicBool::new(false),
        })
    }

    /// Append an asset. Later pushes are newer.
    pub fn push(&self, asset: Arc<FakeAsset>) {
        self.assets.lock().unwrap().push(asset);
    }

    pub fn asset(&self, index: usize) -> Arc<FakeAsset> {
        Arc::clone(&self.assets.lock().unwrap()[index])
    }

    /// Make `asset_count` fail.
    pub fn fail_asset_count(&self) {
        self.count_error.store(true, Ordering::SeqCst);
    }

    /// Make the asset stream yield one asset and then an error.
    pub fn fail_asset_enumeration(&self) {
        self.asset_error.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AssetGroup for FakeGroup {
    fn persistent_id(&self) -> String {
        self.id.clone()
    }

    fn group_type(&self) -> GroupTypeMask {
        self.group_type
    }

    fn set_assets_filter(&self, _filter: AssetFilter) {}

    async fn asset_count(&self) -> BridgeResult<u64> {
        if self.count_error.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed(
                "asset count failed".to_string(),
            ));
        }
        Ok(self.assets.lock().unwrap().len() as u64)
    }

    fn assets(&self, order: EnumerationOrder) -> BoxStream<'static, BridgeResult<Arc<dyn Asset>>> {
        let mut items = self.assets.lock().unwrap().clone();
        if order == EnumerationOrder::NewestFirst {
            items.reverse();
        }
        let mut results: Vec<BridgeResult<Arc<dyn Asset>>> =
            items.into_iter().map(|a| Ok(a as Arc<dyn Asset>)).collect();
        if self.asset_error.load(Ordering::SeqCst) {
            results.truncate(1);
            results.push(Err(BridgeError::OperationFailed(
                "asset enumeration failed".to_string(),
            )));
        }
        stream::iter(results).boxed()
    }
}

// ============================================================================
// Fake Media Library
// ============================================================================

pub struct FakeLibrary {
    groups: Mutex<Vec<Arc<FakeGroup>>>,
    authorization: Mutex<AuthorizationStatus>,
    changes: broadcast::Sender<LibraryChange>,
    group_error: AtomicBool,
    written: Mutex<Vec<Arc<FakeAsset>>>,
    next_written: AtomicUsize,
    /// Scripted `delete_asset` outcomes, consumed front to back. When empty,
    /// deletion succeeds and is recorded.
    delete_results: Mutex<VecDeque<BridgeResult<()>>>,
    deleted: Mutex<Vec<AssetLocation>>,
}

impl FakeLibrary {
    pub fn new() -> Arc<Self> {
        let (changes, _) = broadcast::channel(64);
        Arc::new(Self {
            groups: Mutex::new(Vec::new()),
            authorization: Mutex::new(AuthorizationStatus::Authorized),
            changes,
            group_error: AtomicBool::new(false),
            written: Mutex::new(Vec::new()),
            next_written: AtomicUsize::new(0),
            delete_results: Mutex::new(VecDeque::new()),
            deleted: Mutex::new(Vec::new()),
        })
    }

    pub fn add_group(&self, group: Arc<FakeGroup>) {
        self.groups.lock().unwrap().push(group);
    }

    pub fn set_authorization(&self, status: AuthorizationStatus) {
        *self.authorization.lock().unwrap() = status;
    }

    pub fn notify_change(&self) {
        self.changes.send(LibraryChange).ok();
    }

    /// Make the next `delete_asset` call produce `result`.
    pub fn script_delete(&self, result: BridgeResult<()>) {
        self.delete_results.lock().unwrap().push_back(result);
    }

    pub fn fail_group_enumeration(&self) {
        self.group_error.store(true, Ordering::SeqCst);
    }

    pub fn deleted_locations(&self) -> Vec<AssetLocation> {
        self.deleted.lock().unwrap().clone()
    }

    /// The `index`th asset created through `write_asset`.
    pub fn written_asset(&self, index: usize) -> Arc<FakeAsset> {
        Arc::clone(&self.written.lock().unwrap()[index])
    }

    fn find(&self, location: &AssetLocation) -> Option<Arc<FakeAsset>> {
        for group in self.groups.lock().unwrap().iter() {
            for asset in group.assets.lock().unwrap().iter() {
                if &asset.location == location {
                    return Some(Arc::clone(asset));
                }
            }
        }
        self.written
            .lock()
            .unwrap()
            .iter()
            .find(|a| &a.location == location)
            .map(Arc::clone)
    }
}

#[async_trait]
impl MediaLibrary for FakeLibrary {
    async fn authorization_status(&self) -> AuthorizationStatus {
        *self.authorization.lock().unwrap()
    }

    async fn request_authorization(&self) -> BridgeResult<AuthorizationStatus> {
        let mut status = self.authorization.lock().unwrap();
        if *status == AuthorizationStatus::Undetermined {
            *status = AuthorizationStatus::Authorized;
        }
        Ok(*status)
    }

    fn groups(
        &self,
        type_mask: GroupTypeMask,
    ) -> BoxStream<'static, BridgeResult<Arc<dyn AssetGroup>>> {
        if self.group_error.load(Ordering::SeqCst) {
            return stream::iter(vec![Err(BridgeError::OperationFailed(
                "group enumeration failed".to_string(),
            ))])
            .boxed();
        }
        let groups: Vec<_> = self
            .groups
            .lock()
            .unwrap()
            .iter()
            .filter(|g| g.group_type & type_mask != 0)
            .map(|g| Ok(Arc::clone(g) as Arc<dyn AssetGroup>))
            .collect();
        stream::iter(groups).boxed()
    }

    async fn fetch_asset(&self, location: &AssetLocation) -> BridgeResult<Arc<dyn Asset>> {
        self.find(location)
            .map(|a| a as Arc<dyn Asset>)
            .ok_or_else(|| BridgeError::NotFound(location.to_string()))
    }

    async fn write_asset(
        &self,
        data: Bytes,
        _metadata: AssetMetadata,
    ) -> BridgeResult<AssetLocation> {
        let n = self.next_written.fetch_add(1, Ordering::SeqCst);
        let asset = FakeAsset::new(&format!("lib://written/{n}"), &data);
        let location = asset.location();
        self.written.lock().unwrap().push(asset);
        Ok(location)
    }

    async fn delete_asset(&self, asset: &Arc<dyn Asset>) -> BridgeResult<()> {
        if let Some(result) = self.delete_results.lock().unwrap().pop_front() {
            if result.is_ok() {
                self.deleted.lock().unwrap().push(asset.location());
            }
            return result;
        }
        self.deleted.lock().unwrap().push(asset.location());
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<LibraryChange> {
        self.changes.subscribe()
    }
}

// ============================================================================
// Recording Catalog
// ============================================================================

#[derive(Default)]
pub struct MemoryCatalog {
    identities: Mutex<HashSet<String>>,
    locations: Mutex<HashSet<AssetLocation>>,
    deleted: Mutex<Vec<AssetLocation>>,
}

impl MemoryCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record an asset the catalog already indexed: identity and location.
    pub fn learn(&self, location: &str, pixels: &[u8]) {
        self.identities
            .lock()
            .unwrap()
            .insert(identity_key(location, pixels));
        self.locations
            .lock()
            .unwrap()
            .insert(AssetLocation::new(location));
    }

    /// Record a known location without an identity.
    pub fn learn_location(&self, location: &str) {
        self.locations
            .lock()
            .unwrap()
            .insert(AssetLocation::new(location));
    }

    pub fn deleted_locations(&self) -> Vec<AssetLocation> {
        self.deleted.lock().unwrap().clone()
    }
}

impl CatalogIndex for MemoryCatalog {
    fn contains_identity(&self, key: &str) -> bool {
        self.identities.lock().unwrap().contains(key)
    }

    fn known_locations(&self) -> Vec<AssetLocation> {
        self.locations.lock().unwrap().iter().cloned().collect()
    }

    fn mark_deleted(&self, locations: Vec<AssetLocation>) {
        let mut known = self.locations.lock().unwrap();
        for location in &locations {
            known.remove(location);
        }
        self.deleted.lock().unwrap().extend(locations);
    }
}

// ============================================================================
// Fake Clock
// ============================================================================

pub struct FakeClock {
    timestamp: Mutex<i64>,
}

impl FakeClock {
    pub fn new(timestamp: i64) -> Arc<Self> {
        Arc::new(Self {
            timestamp: Mutex::new(timestamp),
        })
    }

    pub fn timestamp(&self) -> i64 {
        *self.timestamp.lock().unwrap()
    }

    pub fn advance_secs(&self, secs: i64) {
        *self.timestamp.lock().unwrap() += secs;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp(), 0)
            .single()
            .expect("valid test timestamp")
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub library: Arc<FakeLibrary>,
    pub store: Arc<MemoryKeyValueStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub events: EventBus,
    pub clock: Arc<FakeClock>,
    pub coordinator: ScanCoordinator,
}

pub fn harness(config: ScanConfig) -> Harness {
    let library = FakeLibrary::new();
    let store = Arc::new(MemoryKeyValueStore::new());
    let catalog = MemoryCatalog::new();
    let events = EventBus::new(256);
    let clock = FakeClock::new(1_700_000_000);
    let coordinator = ScanCoordinator::new(
        Arc::clone(&library) as _,
        Arc::clone(&store) as _,
        Arc::clone(&catalog) as _,
        events.clone(),
        Arc::clone(&clock) as _,
        config,
    );
    Harness {
        library,
        store,
        catalog,
        events,
        clock,
        coordinator,
    }
}

/// Short durations so tests run fast; one fingerprint at a time so the quick
/// scan's early exit is exact.
pub fn test_config() -> ScanConfig {
    ScanConfig {
        debounce: Duration::from_millis(10),
        asset_concurrency: 1,
        deletion_backoff: Duration::from_millis(20),
        stop_grace: Duration::from_millis(50),
        ..ScanConfig::default()
    }
}

/// The identity key the engine computes for `pixels` at `location`.
pub fn identity_key(location: &str, pixels: &[u8]) -> String {
    AssetIdentity::new(
        AssetLocation::new(location),
        Fingerprint::from_square_thumbnail(pixels),
    )
    .key()
}

/// Write the persisted state a previous run would have left behind.
pub async fn seed_scanned_state(
    store: &MemoryKeyValueStore,
    last_full: i64,
    counts: &[(&str, i64)],
) {
    store
        .set_string(core_scan::keys::ASSETS_FORMAT, core_scan::keys::ASSETS_FORMAT_VERSION)
        .await
        .unwrap();
    store
        .set_i64(core_scan::keys::LAST_FULL_SCAN, last_full)
        .await
        .unwrap();
    for (group_id, count) in counts {
        store
            .set_i64(&core_scan::keys::asset_count_key(group_id), *count)
            .await
            .unwrap();
    }
}

// ============================================================================
// Event Helpers
// ============================================================================

pub async fn recv_event(rx: &mut Receiver<CoreEvent>) -> CoreEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event bus closed")
}

/// Collect events up to and including the next `ScanEvent::Ended`.
pub async fn events_until_ended(rx: &mut Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    loop {
        let event = recv_event(rx).await;
        let ended = matches!(event, CoreEvent::Scan(ScanEvent::Ended { .. }));
        events.push(event);
        if ended {
            return events;
        }
    }
}

/// The progress events in a collected batch, as (location, identity_key, sequence).
pub fn progress_entries(events: &[CoreEvent]) -> Vec<(String, String, u64)> {
    events
        .iter()
        .filter_map(|e| match e {
            CoreEvent::Scan(ScanEvent::Progress {
                location,
                identity_key,
                sequence,
                ..
            }) => Some((location.clone(), identity_key.clone(), *sequence)),
            _ => None,
        })
        .collect()
}

/// The `group_id`s of `GroupBegan` events, in emission order.
pub fn groups_began(events: &[CoreEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            CoreEvent::Scan(ScanEvent::GroupBegan { group_id, .. }) => Some(group_id.clone()),
            _ => None,
        })
        .collect()
}

/// Build a group with `n` assets whose locations are `lib://{id}/{i}` and
/// whose pixels are the location bytes.
pub fn group_with_assets(id: &str, group_type: GroupTypeMask, n: usize) -> Arc<FakeGroup> {
    let group = FakeGroup::new(id, group_type);
    for i in 0..n {
        let location = format!("lib://{id}/{i}");
        group.push(FakeAsset::new(&location, location.as_bytes()));
    }
    group
}

/// Per-test settle helper: a few debounce windows.
pub async fn settle(config: &ScanConfig) {
    tokio::time::sleep(config.debounce * 5).await;
}
