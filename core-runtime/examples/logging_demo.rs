//! Logging demonstration.
//!
//! Run with:
//! ```bash
//! cargo run --example logging_demo
//! cargo run --example logging_demo -- compact
//! RUST_LOG=core_runtime=trace cargo run --example logging_demo
//! ```

use core_runtime::events::{CoreEvent, EventBus, ScanEvent};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::env;
use tracing::{debug, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let format = match env::args().nth(1).as_deref() {
        Some("compact") => LogFormat::Compact,
        _ => LogFormat::Pretty,
    };

    init_logging(
        LoggingConfig::default()
            .with_filter("core_runtime=trace,info")
            .with_format(format),
    )
    .expect("failed to initialize logging");

    info!(?format, "logging initialized");
    debug!("debug output enabled for core_runtime");

    // Log events the way the scan engine's consumers would.
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();

    bus.emit(CoreEvent::Scan(ScanEvent::Started { full: true }))
        .ok();
    bus.emit(CoreEvent::Scan(ScanEvent::Progress {
        location: "lib://demo/1".to_string(),
        identity_key: "0102#lib://demo/1".to_string(),
        sequence: 1,
        thumbnail: None,
    }))
    .ok();

    while let Ok(event) = rx.try_recv() {
        info!(
            severity = ?event.severity(),
            description = event.description(),
            "event received"
        );
    }

    warn!("demo complete");
}
