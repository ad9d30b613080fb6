//! # Core Store
//!
//! Concrete [`KeyValueStore`](bridge_traits::storage::KeyValueStore)
//! implementations backing the scan engine's persisted counters and deletion
//! markers:
//! - [`MemoryKeyValueStore`]: in-process store for tests and embedders whose
//!   host app supplies no database
//! - [`SqliteKeyValueStore`]: SQLite-backed store for desktop/server builds
//!
//! ## Testing
//!
//! ```ignore
//! let pool = core_store::create_test_pool().await?;
//! let store = core_store::SqliteKeyValueStore::new(pool).await?;
//! ```

pub mod db;
pub mod memory;
pub mod sqlite;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use memory::MemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;
