//! Persisted key names.
//!
//! Everything the engine writes into the external [`KeyValueStore`] lives
//! under these names. The layout is part of the on-disk contract: changing it
//! requires bumping [`ASSETS_FORMAT_VERSION`], which forces a full rescan on
//! the next run.
//!
//! [`KeyValueStore`]: bridge_traits::storage::KeyValueStore

use bridge_traits::library::AssetLocation;

/// Fingerprint format version marker.
pub const ASSETS_FORMAT: &str = "assets_format";

/// Current fingerprint format version. Version 2 fingerprints hash the square
/// thumbnail and carry a one-byte format marker.
pub const ASSETS_FORMAT_VERSION: &str = "2";

/// Unix timestamp (seconds) of the last completed full scan.
pub const LAST_FULL_SCAN: &str = "last_full_asset_scan";

/// Per-group asset-count prefix; the group's persistent id follows.
pub const ASSET_COUNT_PREFIX: &str = "asset_count/";

/// Deletion-marker prefix; the asset's library location follows.
pub const ASSET_DELETION_PREFIX: &str = "asset_deletion/";

/// Asset-count key for one group.
pub fn asset_count_key(group_id: &str) -> String {
    format!("{ASSET_COUNT_PREFIX}{group_id}")
}

/// Deletion-marker key for one asset location.
pub fn deletion_key(location: &AssetLocation) -> String {
    format!("{ASSET_DELETION_PREFIX}{location}")
}

/// The location embedded in a deletion-marker key, if it is one.
pub fn deletion_location(marker_key: &str) -> Option<AssetLocation> {
    marker_key
        .strip_prefix(ASSET_DELETION_PREFIX)
        .map(AssetLocation::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_count_key() {
        assert_eq!(asset_count_key("roll-1"), "asset_count/roll-1");
    }

    #[test]
    fn test_deletion_key_round_trip() {
        let location = AssetLocation::new("assets-library://asset/42.JPG");
        let key = deletion_key(&location);
        assert_eq!(key, "asset_deletion/assets-library://asset/42.JPG");
        assert_eq!(deletion_location(&key), Some(location));
    }

    #[test]
    fn test_deletion_location_rejects_other_keys() {
        assert_eq!(deletion_location("asset_count/roll-1"), None);
    }
}
