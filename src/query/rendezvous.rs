// Rendezvous Store (spec.md S4.F): a keyed key-value store with merge
// semantics. `put` inserts/overwrites `document[query_key][sub_key]`
// atomically; `get` returns the current map or `None`. This is the
// completion-detection channel between the Orchestrator and Map Workers.

use crate::errors::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One worker's scored answer for a single community (spec.md S4.E step 3-4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialAnswer {
    pub community_uid: String,
    pub community_title: String,
    pub response: String,
    pub score: i32,
}

#[async_trait]
pub trait RendezvousStore: Send + Sync {
    /// Insert or overwrite `value` at `document[query_key][sub_key]`. Concurrent
    /// writes to the same `(query_key, sub_key)` are last-write-wins (spec.md
    /// S4.D "Idempotence & partial failure").
    async fn put(&self, query_key: &str, sub_key: &str, value: PartialAnswer) -> Result<()>;

    /// The current document for `query_key`, or `None` if nothing has been
    /// written yet.
    async fn get(&self, query_key: &str) -> Result<Option<BTreeMap<String, PartialAnswer>>>;
}

/// The production `RendezvousStore`: one document per query key, each
/// document a small map guarded by its own lock so `put` is atomic per key
/// without serializing unrelated queries.
#[derive(Default)]
pub struct InMemoryRendezvousStore {
    documents: DashMap<String, Arc<Mutex<BTreeMap<String, PartialAnswer>>>>,
}

impl InMemoryRendezvousStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RendezvousStore for InMemoryRendezvousStore {
    async fn put(&self, query_key: &str, sub_key: &str, value: PartialAnswer) -> Result<()> {
        let document = self.documents.entry(query_key.to_string()).or_default().clone();
        document.lock().insert(sub_key.to_string(), value);
        Ok(())
    }

    async fn get(&self, query_key: &str) -> Result<Option<BTreeMap<String, PartialAnswer>>> {
        Ok(self.documents.get(query_key).map(|doc| doc.lock().clone()))
    }
}

pub type SharedRendezvousStore = Arc<dyn RendezvousStore>;

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(score: i32) -> PartialAnswer {
        PartialAnswer { community_uid: "c1".into(), community_title: "C1".into(), response: "r".into(), score }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryRendezvousStore::new();
        store.put("query-1", "community_L0_0", answer(5)).await.unwrap();
        let doc = store.get("query-1").await.unwrap().unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc["community_L0_0"].score, 5);
    }

    #[tokio::test]
    async fn repeated_put_to_same_subkey_is_last_write_wins() {
        let store = InMemoryRendezvousStore::new();
        store.put("query-1", "c1", answer(3)).await.unwrap();
        store.put("query-1", "c1", answer(8)).await.unwrap();
        let doc = store.get("query-1").await.unwrap().unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc["c1"].score, 8);
    }

    #[tokio::test]
    async fn scenario_5_three_sub_keys_accumulate() {
        let store = InMemoryRendezvousStore::new();
        store.put("Who won X?", "c1", answer(8)).await.unwrap();
        store.put("Who won X?", "c2", answer(3)).await.unwrap();
        store.put("Who won X?", "c3", answer(0)).await.unwrap();
        let doc = store.get("Who won X?").await.unwrap().unwrap();
        assert_eq!(doc.len(), 3);
    }

    #[tokio::test]
    async fn absent_key_returns_none() {
        let store = InMemoryRendezvousStore::new();
        assert!(store.get("nothing-yet").await.unwrap().is_none());
    }
}
