//! # Core Scan
//!
//! Catalog scan engine: walks the platform media library, assigns each asset
//! a stable identity (location plus content fingerprint), and keeps the
//! downstream photo catalog in sync as assets are added, deleted, and moved.
//!
//! Platform locations are reused across library syncs, so identity rests on
//! the fingerprint; see [`identity`]. Scans come in two flavors: **full**
//! scans visit everything and settle deletions, **quick** scans sweep
//! newest-first and exit one asset past the last new one. [`ScanCoordinator`]
//! schedules them and is the only type most embedders touch.
//!
//! ## Usage
//!
//! ```ignore
//! use core_scan::{ScanConfig, ScanCoordinator};
//!
//! let coordinator = ScanCoordinator::new(library, store, catalog, events, clock, ScanConfig::default());
//! coordinator.start().await?;
//! coordinator.authorize().await?;
//! coordinator.scan().await;
//! ```

pub mod catalog;
pub mod config;
mod coordinator;
mod deletion;
pub mod error;
pub mod identity;
pub mod keys;
mod session;

pub use catalog::CatalogIndex;
pub use config::ScanConfig;
pub use coordinator::{ScanCoordinator, SchedulerState};
pub use error::{Result, ScanError};
pub use identity::{AssetIdentity, Fingerprint, FingerprintKind};
pub use session::ScanMode;
