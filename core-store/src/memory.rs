//! In-memory key-value store.
//!
//! Backs tests and embedders whose host app persists elsewhere. Transactions
//! buffer their writes and apply them atomically under the single store lock
//! at commit time.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::storage::{KeyValueStore, KeyValueTransaction};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-memory [`KeyValueStore`]. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    data: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the full contents, for test assertions.
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.data.lock().await.clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.data
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        Ok(self
            .data
            .lock()
            .await
            .get(key)
            .and_then(|v| v.parse::<i64>().ok()))
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.set_string(key, &value.to_string()).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.lock().await.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .data
            .lock()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn KeyValueTransaction>> {
        Ok(Box::new(MemoryTransaction {
            data: Arc::clone(&self.data),
            ops: Vec::new(),
        }))
    }
}

enum Op {
    Set(String, String),
    Delete(String),
}

struct MemoryTransaction {
    data: Arc<Mutex<BTreeMap<String, String>>>,
    ops: Vec<Op>,
}

#[async_trait]
impl KeyValueTransaction for MemoryTransaction {
    async fn set_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.ops.push(Op::Set(key.to_string(), value.to_string()));
        Ok(())
    }

    async fn set_i64(&mut self, key: &str, value: i64) -> Result<()> {
        self.ops.push(Op::Set(key.to_string(), value.to_string()));
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<()> {
        self.ops.push(Op::Delete(key.to_string()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut data = self.data.lock().await;
        for op in self.ops {
            match op {
                Op::Set(k, v) => {
                    data.insert(k, v);
                }
                Op::Delete(k) => {
                    data.remove(&k);
                }
            }
        }
        Ok(())
    }
}
