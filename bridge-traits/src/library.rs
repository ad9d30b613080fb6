//! Media Library Abstractions
//!
//! Platform-agnostic traits for the on-device photo/video library:
//! - Desktop/test: in-memory or filesystem-backed fakes
//! - iOS: asset library / photo framework adapters
//! - Android: MediaStore adapters
//!
//! The scan engine never talks to a platform SDK directly; everything flows
//! through these traits so the whole engine is test-fakeable.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::Result;

/// Bitmask describing group types. Matches the platform's container taxonomy.
pub type GroupTypeMask = u32;

/// The camera-roll / "saved photos" group. Always scanned first.
pub const GROUP_SAVED_PHOTOS: GroupTypeMask = 1 << 0;
/// User-created albums.
pub const GROUP_ALBUM: GroupTypeMask = 1 << 1;
/// Imported events.
pub const GROUP_EVENT: GroupTypeMask = 1 << 2;
/// All group types.
pub const GROUP_ALL: GroupTypeMask = GROUP_SAVED_PHOTOS | GROUP_ALBUM | GROUP_EVENT;

/// Platform library location of one asset.
///
/// This is the platform's *unstable* identifier (locations are reused across
/// library-sync events); the scan engine never treats it as an identity on
/// its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetLocation(String);

impl AssetLocation {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AssetLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetLocation {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AssetLocation {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Platform authorization state for library access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    /// The user has not been asked yet. Touching the library forces the prompt.
    Undetermined,
    /// The user denied access.
    Denied,
    /// Access restricted by device policy.
    Restricted,
    /// Full access granted.
    Authorized,
}

impl AuthorizationStatus {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthorizationStatus::Authorized)
    }
}

/// Asset filter applied to a group before enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssetFilter {
    /// Photos and videos.
    #[default]
    All,
    /// Photos only.
    Photos,
    /// Videos only.
    Videos,
}

/// Enumeration order for assets within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationOrder {
    /// Adapter-native order (oldest first on most platforms).
    Forward,
    /// Newest first. Enables the quick scan's early exit.
    NewestFirst,
}

/// Metadata attached to an asset written through [`MediaLibrary::write_asset`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetMetadata {
    /// Capture timestamp (Unix seconds), if known.
    pub taken_at: Option<i64>,
    /// Latitude/longitude, if known.
    pub coordinates: Option<(f64, f64)>,
    /// Original filename, if known.
    pub filename: Option<String>,
}

/// A library change notification. Carries no payload; the scan engine
/// rescans and diffs rather than trusting per-item hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryChange;

/// One photo/video entry in the platform media library.
#[async_trait]
pub trait Asset: Send + Sync {
    /// The asset's current library location.
    fn location(&self) -> AssetLocation;

    /// Whether this asset was written by the app (and may thus be deleted).
    fn editable(&self) -> bool;

    /// The square thumbnail used for current-format fingerprints.
    ///
    /// `Ok(None)` means the thumbnail cannot be produced; the caller skips the
    /// asset without error.
    async fn square_thumbnail(&self) -> Result<Option<Bytes>>;

    /// The aspect-ratio (non-square) thumbnail behind legacy fingerprints.
    async fn aspect_ratio_thumbnail(&self) -> Result<Option<Bytes>>;
}

/// A platform container of assets (album, event, camera roll).
///
/// Handles are retained by the scan engine across runs: the platform only
/// delivers change notifications for groups whose handles remain referenced.
#[async_trait]
pub trait AssetGroup: Send + Sync {
    /// Persistent group identifier, stable across app launches.
    fn persistent_id(&self) -> String;

    /// The group's type bitmask.
    fn group_type(&self) -> GroupTypeMask;

    /// Restrict subsequent enumeration/count to the given asset class.
    fn set_assets_filter(&self, filter: AssetFilter);

    /// Current asset count under the active filter.
    async fn asset_count(&self) -> Result<u64>;

    /// Enumerate assets in the requested order.
    ///
    /// The stream end is the termination sentinel; an `Err` item aborts this
    /// group's enumeration only.
    fn assets(&self, order: EnumerationOrder) -> BoxStream<'static, Result<Arc<dyn Asset>>>;
}

/// The on-device media library adapter.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::library::{MediaLibrary, GROUP_ALL};
/// use futures::StreamExt;
///
/// async fn count_groups(library: &dyn MediaLibrary) -> usize {
///     let mut groups = library.groups(GROUP_ALL);
///     let mut n = 0;
///     while let Some(Ok(_group)) = groups.next().await {
///         n += 1;
///     }
///     n
/// }
/// ```
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Current authorization status.
    ///
    /// May take platform-internal locks; callers must not invoke this while
    /// holding their own state locks.
    async fn authorization_status(&self) -> AuthorizationStatus;

    /// Touch the library once to force the platform permission prompt.
    ///
    /// Only meaningful while the status is
    /// [`AuthorizationStatus::Undetermined`]; idempotent otherwise.
    async fn request_authorization(&self) -> Result<AuthorizationStatus>;

    /// Enumerate groups matching the type mask.
    ///
    /// The stream end is the termination sentinel; an `Err` item is a
    /// whole-enumeration failure.
    fn groups(&self, type_mask: GroupTypeMask) -> BoxStream<'static, Result<Arc<dyn AssetGroup>>>;

    /// Resolve the asset currently at `location`.
    ///
    /// Returns [`BridgeError::NotFound`](crate::BridgeError::NotFound) when the
    /// location no longer resolves. Locations are reused by the platform, so a
    /// successful fetch says nothing about identity.
    async fn fetch_asset(&self, location: &AssetLocation) -> Result<Arc<dyn Asset>>;

    /// Write a new asset into the library, returning its location.
    async fn write_asset(&self, data: Bytes, metadata: AssetMetadata) -> Result<AssetLocation>;

    /// Delete an asset from the library.
    ///
    /// [`BridgeError::Busy`](crate::BridgeError::Busy) is the transient,
    /// retry-with-backoff class; all other errors are permanent.
    async fn delete_asset(&self, asset: &Arc<dyn Asset>) -> Result<()>;

    /// Subscribe to library-changed notifications.
    fn subscribe_changes(&self) -> broadcast::Receiver<LibraryChange>;
}
