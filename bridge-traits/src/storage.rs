//! Persistence Abstractions
//!
//! The scan engine persists its counters and deletion markers through an
//! external key-value engine it does not own. This trait is the consumed
//! surface of that engine:
//! - iOS/Android: the app's existing settings database
//! - Desktop/server: SQLite (see `core-store`)
//! - Tests: an in-memory store

use async_trait::async_trait;

use crate::error::Result;

/// Key-value persistence trait.
///
/// Values are small (counters, version strings, markers); implementations may
/// store everything as text. Writes performed outside a transaction are
/// individually durable.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::KeyValueStore;
///
/// async fn bump(store: &dyn KeyValueStore) -> bridge_traits::error::Result<()> {
///     let n = store.get_i64("counter").await?.unwrap_or(0);
///     store.set_i64("counter", n + 1).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieve a string value. `Ok(None)` if the key doesn't exist.
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a string value.
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve an integer value. `Ok(None)` if the key doesn't exist.
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// Store an integer value.
    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check whether a key exists.
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List every key starting with `prefix`, in unspecified order.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Begin a transaction for atomic multi-key updates.
    ///
    /// Nothing is visible to readers until `commit`; dropping the transaction
    /// without committing rolls it back.
    async fn begin_transaction(&self) -> Result<Box<dyn KeyValueTransaction>>;
}

/// Transaction for atomic key-value updates.
#[async_trait]
pub trait KeyValueTransaction: Send {
    /// Set a string value within the transaction.
    async fn set_string(&mut self, key: &str, value: &str) -> Result<()>;

    /// Set an integer value within the transaction.
    async fn set_i64(&mut self, key: &str, value: i64) -> Result<()>;

    /// Delete a key within the transaction.
    async fn delete(&mut self, key: &str) -> Result<()>;

    /// Commit the transaction.
    async fn commit(self: Box<Self>) -> Result<()>;
}
