//! Store adapter port — the keyed record store the core treats as shared
//! memory across messages, agent registrations, locks, counters, and
//! per-task envelopes/results.
//!
//! The core never depends on similarity-search semantics for correctness;
//! an adapter backed by a vector database may ignore the optional `vector`
//! argument entirely.

use async_trait::async_trait;

use crate::domain::error::StoreError;

/// A single record as returned by `list`/`get`: its full key and metadata.
pub type Record = (String, serde_json::Value);

/// Keyed record store. Implementations MUST provide linearizable upserts on
/// the same key; multi-key operations are best-effort. `compare_and_swap` is
/// the one primitive that must be real (not advisory) for the distributed
/// lock to be correct under concurrent acquirers — an adapter that cannot
/// offer it should document the lock as advisory-only (see design notes).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Write-through upsert keyed by `id`. `vector` is accepted for adapters
    /// backed by similarity search and ignored otherwise.
    async fn upsert(
        &self,
        id: &str,
        metadata: serde_json::Value,
        vector: Option<Vec<f32>>,
    ) -> Result<(), StoreError>;

    /// Read the latest record for `id`.
    async fn get(&self, id: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Enumerate all records whose id starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<Record>, StoreError>;

    /// Delete the record at `id`, if any.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Atomically replace the value at `id` with `new` iff the current value
    /// equals `expected` (`None` meaning "the key must not exist"). Returns
    /// whether the swap took effect. Adapters unable to provide linearizable
    /// compare-and-swap should fall back to a best-effort read-then-write
    /// and document the weakened guarantee.
    async fn compare_and_swap(
        &self,
        id: &str,
        expected: Option<serde_json::Value>,
        new: serde_json::Value,
    ) -> Result<bool, StoreError>;
}
