//! Consumer-side catalog interface.
//!
//! The engine does not own the photo catalog; the embedding app does. These
//! are the three questions the engine needs answered during a run. All three
//! are synchronous and must not call back into the engine, because the engine
//! invokes them from scan tasks.

use bridge_traits::library::AssetLocation;

/// The downstream catalog consulted and updated by scan sessions.
#[cfg_attr(test, mockall::automock)]
pub trait CatalogIndex: Send + Sync {
    /// Whether the catalog already holds this identity key. Drives the quick
    /// scan's early exit.
    fn contains_identity(&self, key: &str) -> bool;

    /// Every location the catalog currently knows. A full scan starts from
    /// this set and removes each location it encounters; the remainder is
    /// reported as deleted.
    fn known_locations(&self) -> Vec<AssetLocation>;

    /// Report locations a completed full scan did not encounter. Called with
    /// no engine lock held, so the catalog may call back into, for example,
    /// [`ScanCoordinator::queue_deletion`](crate::coordinator::ScanCoordinator::queue_deletion).
    fn mark_deleted(&self, locations: Vec<AssetLocation>);
}
