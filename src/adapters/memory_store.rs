//! In-process `StoreAdapter` implementation.
//!
//! Backs a single process's worth of the shared store with a locked hash
//! map. Suitable for single-process deployments and for the test/bench
//! suites; a cross-process deployment plugs in a different adapter (e.g. a
//! vector database client) behind the same trait.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::error::StoreError;
use crate::domain::ports::store::{Record, StoreAdapter};

#[derive(Debug, Clone)]
struct Entry {
    metadata: serde_json::Value,
    #[allow(dead_code)]
    vector: Option<Vec<f32>>,
}

/// An in-memory `StoreAdapter` backed by a single `RwLock<HashMap>`.
///
/// `compare_and_swap` is genuinely linearizable here (the write lock
/// serializes the whole check-and-set), so the distributed lock primitive
/// built on top of this adapter is a real lock, not merely advisory.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, Entry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreAdapter for InMemoryStore {
    async fn upsert(
        &self,
        id: &str,
        metadata: serde_json::Value,
        vector: Option<Vec<f32>>,
    ) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(id.to_string(), Entry { metadata, vector });
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.records.read().await.get(id).map(|e| e.metadata.clone()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| (k.clone(), e.metadata.clone()))
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        id: &str,
        expected: Option<serde_json::Value>,
        new: serde_json::Value,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let current = records.get(id).map(|e| e.metadata.clone());
        if current == expected {
            records.insert(
                id.to_string(),
                Entry {
                    metadata: new,
                    vector: None,
                },
            );
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
