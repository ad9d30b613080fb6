//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the catalog scan engine and the
//! platform-specific pieces it cannot own: the on-device media library, the
//! key-value persistence engine, and the system clock. Each trait represents a
//! capability the core requires but that is implemented differently per host
//! (iOS asset library, Android MediaStore, a test fake).
//!
//! ## Traits
//!
//! ### Media Library
//! - [`MediaLibrary`](library::MediaLibrary) - group/asset enumeration, asset
//!   fetch/write/delete, authorization, change notifications
//! - [`AssetGroup`](library::AssetGroup) - a platform container (album, event,
//!   camera roll)
//! - [`Asset`](library::Asset) - one photo/video entry and its thumbnails
//!
//! ### Persistence
//! - [`KeyValueStore`](storage::KeyValueStore) - the external key-value engine
//!   holding scan counters and deletion markers
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Implementations should map platform errors onto the transient
//! ([`BridgeError::Busy`]) and permanent classes faithfully: the scan engine's
//! retry behavior dispatches on them.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent
//! usage across async tasks.

pub mod error;
pub mod library;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use library::{
    Asset, AssetFilter, AssetGroup, AssetLocation, AssetMetadata, AuthorizationStatus,
    EnumerationOrder, GroupTypeMask, LibraryChange, MediaLibrary, GROUP_ALBUM, GROUP_ALL,
    GROUP_EVENT, GROUP_SAVED_PHOTOS,
};
pub use storage::{KeyValueStore, KeyValueTransaction};
pub use time::{Clock, SystemClock};
