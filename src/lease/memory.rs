//! In-Memory Lease Store
//!
//! Process-local store with compare-and-swap updates. Backs tests and
//! ephemeral lease servers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{LeaseRecord, LeaseStore};
use crate::error::{Error, Result};

/// Lease store held entirely in memory
#[derive(Default)]
pub struct MemoryLeaseStore {
    /// Records keyed by (namespace, name)
    leases: RwLock<HashMap<(String, String), LeaseRecord>>,
    /// Last version handed out
    last_version: AtomicU64,
}

impl MemoryLeaseStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> u64 {
        self.last_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of leases currently stored
    pub async fn len(&self) -> usize {
        self.leases.read().await.len()
    }

    /// Whether the store holds no leases
    pub async fn is_empty(&self) -> bool {
        self.leases.read().await.is_empty()
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<LeaseRecord> {
        self.leases
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found(namespace, name))
    }

    async fn create(&self, record: &LeaseRecord) -> Result<LeaseRecord> {
        let key = (record.namespace.clone(), record.name.clone());
        let mut leases = self.leases.write().await;

        if leases.contains_key(&key) {
            return Err(Error::Conflict(format!("lease {} already exists", record.key())));
        }

        let mut stored = record.clone();
        stored.version = Some(self.next_version());
        leases.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(&self, record: &LeaseRecord) -> Result<LeaseRecord> {
        let key = (record.namespace.clone(), record.name.clone());
        let mut leases = self.leases.write().await;

        let current = leases
            .get(&key)
            .ok_or_else(|| Error::not_found(&record.namespace, &record.name))?;

        if let Some(expected) = record.version {
            if current.version != Some(expected) {
                return Err(Error::Conflict(format!(
                    "lease {} changed (expected version {}, found {:?})",
                    record.key(),
                    expected,
                    current.version
                )));
            }
        }

        let mut stored = record.clone();
        stored.version = Some(self.next_version());
        leases.insert(key, stored.clone());
        Ok(stored)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lease(holder: &str) -> LeaseRecord {
        LeaseRecord {
            holder_identity: Some(holder.to_string()),
            lease_duration_seconds: 15,
            ..LeaseRecord::new("default", "leader")
        }
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryLeaseStore::new();
        let err = store.get("default", "leader").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_twice_conflicts() {
        let store = MemoryLeaseStore::new();
        let created = store.create(&lease("node-1")).await.unwrap();
        assert_eq!(created.version, Some(1));

        let err = store.create(&lease("node-2")).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_checks_version() {
        let store = MemoryLeaseStore::new();
        let created = store.create(&lease("node-1")).await.unwrap();

        // Two writers both read version 1; only the first write lands
        let mut first = created.clone();
        first.holder_identity = Some("node-2".into());
        let mut second = created.clone();
        second.holder_identity = Some("node-3".into());

        let updated = store.update(&first).await.unwrap();
        assert_eq!(updated.version, Some(2));
        assert!(store.update(&second).await.unwrap_err().is_conflict());

        let current = store.get("default", "leader").await.unwrap();
        assert!(current.is_held_by("node-2"));
    }

    #[tokio::test]
    async fn test_unversioned_update_is_unconditional() {
        let store = MemoryLeaseStore::new();
        store.create(&lease("node-1")).await.unwrap();

        let updated = store.update(&lease("node-2")).await.unwrap();
        assert!(updated.is_held_by("node-2"));
    }

    #[tokio::test]
    async fn test_update_missing() {
        let store = MemoryLeaseStore::new();
        assert!(store.update(&lease("node-1")).await.unwrap_err().is_not_found());
    }
}
