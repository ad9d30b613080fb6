//! Scan engine tuning knobs.

use std::time::Duration;

/// Configuration for [`ScanCoordinator`](crate::coordinator::ScanCoordinator).
///
/// Defaults match production behavior; tests shrink the durations.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Quiet period between a scan trigger and the session actually starting.
    /// Triggers arriving inside the window coalesce into one run.
    pub debounce: Duration,

    /// Groups enumerated concurrently within one session.
    pub group_concurrency: usize,

    /// Assets fingerprinted concurrently within one session. At 1, the quick
    /// scan's early exit lands exactly one asset past the last new one.
    pub asset_concurrency: usize,

    /// Age after which a quick scan is promoted to a full scan.
    pub full_scan_interval: Duration,

    /// Pause after the library reports busy before retrying a deletion.
    pub deletion_backoff: Duration,

    /// How long the change listener survives after `stop`, to drain
    /// notifications already in flight.
    pub stop_grace: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            group_concurrency: 1,
            asset_concurrency: 2,
            full_scan_interval: Duration::from_secs(24 * 60 * 60),
            deletion_backoff: Duration::from_secs(1),
            stop_grace: Duration::from_millis(500),
        }
    }
}
