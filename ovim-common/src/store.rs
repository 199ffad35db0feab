//! Seam for the external object store referenced by the reconcilers'
//! "external sync" steps. The concrete persistence backend is out of scope;
//! this trait is what "external sync" steps are actually written against.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upsert(&self, id: &str, record: Value) -> anyhow::Result<()>;
    async fn get(&self, id: &str) -> anyhow::Result<Option<Value>>;
    async fn delete(&self, id: &str) -> anyhow::Result<()>;
    /// Lists every `(id, record)` whose id starts with `prefix`. Used by
    /// reconcilers that key related records under a shared prefix (e.g. all
    /// VM records belonging to one VDC).
    async fn list_prefix(&self, prefix: &str) -> anyhow::Result<Vec<(String, Value)>>;
}

/// Discards every write and logs a warning. Wired in by default: the CRD
/// remains the source of truth, so a missing external store never blocks
/// reconciliation.
pub struct NullStore;

#[async_trait]
impl ObjectStore for NullStore {
    async fn upsert(&self, id: &str, _record: Value) -> anyhow::Result<()> {
        crate::response::print_warning(format!("external store not configured, discarding upsert for {id}"));
        Ok(())
    }

    async fn get(&self, _id: &str) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }

    async fn delete(&self, _id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn list_prefix(&self, _prefix: &str) -> anyhow::Result<Vec<(String, Value)>> {
        Ok(Vec::new())
    }
}

/// In-memory store used by reconciler unit tests.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<String, Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn upsert(&self, id: &str, record: Value) -> anyhow::Result<()> {
        self.records.lock().unwrap().insert(id.to_string(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.records.lock().unwrap().get(id).cloned())
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        self.records.lock().unwrap().remove(id);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> anyhow::Result<Vec<(String, Value)>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id.starts_with(prefix))
            .map(|(id, v)| (id.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn in_memory_store_round_trips_records() {
        let store = InMemoryStore::new();
        store.upsert("acme", json!({"cpuQuota": 10})).await.unwrap();
        assert_eq!(store.get("acme").await.unwrap(), Some(json!({"cpuQuota": 10})));
        store.delete("acme").await.unwrap();
        assert_eq!(store.get("acme").await.unwrap(), None);
    }

    #[tokio::test]
    async fn null_store_get_is_always_none() {
        let store = NullStore;
        store.upsert("x", json!({})).await.unwrap();
        assert_eq!(store.get("x").await.unwrap(), None);
        store.delete("x").await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_store_lists_by_prefix() {
        let store = InMemoryStore::new();
        store.upsert("vm:vdc-a:web-1", json!({"status": "running"})).await.unwrap();
        store.upsert("vm:vdc-a:web-2", json!({"status": "pending"})).await.unwrap();
        store.upsert("vm:vdc-b:web-1", json!({"status": "running"})).await.unwrap();
        let matched = store.list_prefix("vm:vdc-a:").await.unwrap();
        assert_eq!(matched.len(), 2);
    }
}
