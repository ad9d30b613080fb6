//! SQLite-backed key-value store.
//!
//! One `catalog_kv` table; values stored as text. Transactions map directly
//! onto SQLite transactions, so the scan engine's reconciliation writes are
//! atomic and crash-safe.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::storage::{KeyValueStore, KeyValueTransaction};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

/// SQLite [`KeyValueStore`] over a shared connection pool.
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Create the store, bootstrapping the schema if needed.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS catalog_kv (
                key   TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(to_bridge_error)?;

        debug!("catalog_kv schema ready");
        Ok(Self { pool })
    }
}

fn to_bridge_error(e: sqlx::Error) -> BridgeError {
    BridgeError::DatabaseError(e.to_string())
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM catalog_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_bridge_error)?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO catalog_kv (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(to_bridge_error)?;
        Ok(())
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        Ok(self
            .get_string(key)
            .await?
            .and_then(|v| v.parse::<i64>().ok()))
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.set_string(key, &value.to_string()).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM catalog_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(to_bridge_error)?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        // LIKE with a trailing % matches the prefix; escape LIKE wildcards in
        // the prefix itself.
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let rows = sqlx::query("SELECT key FROM catalog_kv WHERE key LIKE ? ESCAPE '\\'")
            .bind(format!("{escaped}%"))
            .fetch_all(&self.pool)
            .await
            .map_err(to_bridge_error)?;

        Ok(rows.iter().map(|r| r.get::<String, _>("key")).collect())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn KeyValueTransaction>> {
        let tx = self.pool.begin().await.map_err(to_bridge_error)?;
        Ok(Box::new(SqliteKvTransaction { tx }))
    }
}

struct SqliteKvTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl KeyValueTransaction for SqliteKvTransaction {
    async fn set_string(&mut self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO catalog_kv (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *self.tx)
        .await
        .map_err(to_bridge_error)?;
        Ok(())
    }

    async fn set_i64(&mut self, key: &str, value: i64) -> Result<()> {
        self.set_string(key, &value.to_string()).await
    }

    async fn delete(&mut self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM catalog_kv WHERE key = ?")
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .map_err(to_bridge_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(to_bridge_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_basic_ops() {
        let pool = create_test_pool().await.unwrap();
        let store = SqliteKeyValueStore::new(pool).await.unwrap();

        store.set_string("assets_format", "2").await.unwrap();
        store.set_i64("asset_count/roll", 5).await.unwrap();

        assert_eq!(
            store.get_string("assets_format").await.unwrap().as_deref(),
            Some("2")
        );
        assert_eq!(store.get_i64("asset_count/roll").await.unwrap(), Some(5));

        // Upsert overwrites.
        store.set_i64("asset_count/roll", 7).await.unwrap();
        assert_eq!(store.get_i64("asset_count/roll").await.unwrap(), Some(7));

        store.delete("asset_count/roll").await.unwrap();
        assert_eq!(store.get_i64("asset_count/roll").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_with_prefix() {
        let pool = create_test_pool().await.unwrap();
        let store = SqliteKeyValueStore::new(pool).await.unwrap();

        store.set_i64("asset_count/a", 1).await.unwrap();
        store.set_i64("asset_count/b", 2).await.unwrap();
        store.set_string("asset_deletion/x", "1").await.unwrap();

        let mut keys = store.keys_with_prefix("asset_count/").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["asset_count/a", "asset_count/b"]);
    }

    #[tokio::test]
    async fn test_transaction_commit_and_rollback() {
        let pool = create_test_pool().await.unwrap();
        let store = SqliteKeyValueStore::new(pool).await.unwrap();

        let mut tx = store.begin_transaction().await.unwrap();
        tx.set_i64("asset_count/roll", 5).await.unwrap();
        tx.set_string("assets_format", "2").await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get_i64("asset_count/roll").await.unwrap(), Some(5));

        {
            let mut tx = store.begin_transaction().await.unwrap();
            tx.delete("asset_count/roll").await.unwrap();
            // dropped without commit
        }
        assert_eq!(store.get_i64("asset_count/roll").await.unwrap(), Some(5));
    }
}
