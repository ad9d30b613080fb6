//! # Core Runtime
//!
//! Shared runtime infrastructure for the catalog scan engine:
//! - [`events`]: typed event bus over `tokio::sync::broadcast`
//! - [`logging`]: `tracing` subscriber initialization

pub mod error;
pub mod events;
pub mod logging;

pub use error::{CoreError, Result};
pub use events::{CoreEvent, DeletionEvent, EventBus, ScanEvent};
