//! `ApiKeyStore` port plus an in-memory reference implementation keyed by
//! a truncated-hash prefix for O(1) candidate lookup, with full-hash
//! constant-time verification against the stored hash.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::primitives::hash::{constant_time_eq_hex, full_sha256_hex, truncated_sha256_hex};

#[derive(Clone, Debug)]
pub struct ApiKeyRecord {
    pub id: String,
    pub name: String,
    pub full_hash_hex: String,
    pub revoked: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiKeyStoreError {
    #[error("api key store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn find_by_prefix(&self, prefix_hex: &str) -> Result<Vec<ApiKeyRecord>, ApiKeyStoreError>;
    /// Full verification: constant-time compare the raw key's full hash
    /// against each candidate returned for its prefix; rejects revoked
    /// keys.
    async fn verify(&self, raw_key: &str) -> Result<Option<ApiKeyRecord>, ApiKeyStoreError>;
    async fn record_use(&self, key_id: &str) -> Result<(), ApiKeyStoreError>;
}

pub struct InMemoryApiKeyStore {
    by_prefix: DashMap<String, Vec<ApiKeyRecord>>,
    use_counts: DashMap<String, u64>,
}

impl InMemoryApiKeyStore {
    pub fn new() -> Self {
        Self {
            by_prefix: DashMap::new(),
            use_counts: DashMap::new(),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Provision a key record from its raw secret. A persistent store and
    /// admin CLI for provisioning keys are out of scope here; this exists
    /// so the in-memory reference implementation is self-sufficient for
    /// tests.
    pub fn insert_raw(&self, id: &str, name: &str, raw_key: &str) {
        let prefix = truncated_sha256_hex(raw_key);
        let record = ApiKeyRecord {
            id: id.to_string(),
            name: name.to_string(),
            full_hash_hex: full_sha256_hex(raw_key),
            revoked: false,
        };
        self.by_prefix.entry(prefix).or_default().push(record);
    }

    pub fn revoke(&self, key_id: &str) {
        for mut entry in self.by_prefix.iter_mut() {
            for record in entry.value_mut().iter_mut() {
                if record.id == key_id {
                    record.revoked = true;
                }
            }
        }
    }

    /// All provisioned records, for the admin API's listing endpoint.
    pub fn list(&self) -> Vec<ApiKeyRecord> {
        self.by_prefix.iter().flat_map(|e| e.value().clone()).collect()
    }
}

impl Default for InMemoryApiKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApiKeyStore for InMemoryApiKeyStore {
    async fn find_by_prefix(&self, prefix_hex: &str) -> Result<Vec<ApiKeyRecord>, ApiKeyStoreError> {
        Ok(self.by_prefix.get(prefix_hex).map(|e| e.value().clone()).unwrap_or_default())
    }

    async fn verify(&self, raw_key: &str) -> Result<Option<ApiKeyRecord>, ApiKeyStoreError> {
        let prefix = truncated_sha256_hex(raw_key);
        let full = full_sha256_hex(raw_key);
        let candidates = self.find_by_prefix(&prefix).await?;
        for candidate in candidates {
            if candidate.revoked {
                continue;
            }
            if constant_time_eq_hex(&candidate.full_hash_hex, &full) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn record_use(&self, key_id: &str) -> Result<(), ApiKeyStoreError> {
        *self.use_counts.entry(key_id.to_string()).or_insert(0) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn verify_accepts_matching_raw_key() {
        let store = InMemoryApiKeyStore::new();
        store.insert_raw("key-1", "ci bot", "super-secret-raw-key");
        let record = store.verify("super-secret-raw-key").await.unwrap().unwrap();
        assert_eq!(record.id, "key-1");
    }

    #[tokio::test]
    async fn verify_rejects_wrong_key() {
        let store = InMemoryApiKeyStore::new();
        store.insert_raw("key-1", "ci bot", "super-secret-raw-key");
        assert!(store.verify("wrong-key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoked_key_is_rejected() {
        let store = InMemoryApiKeyStore::new();
        store.insert_raw("key-1", "ci bot", "super-secret-raw-key");
        store.revoke("key-1");
        assert!(store.verify("super-secret-raw-key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_use_increments_counter() {
        let store = InMemoryApiKeyStore::new();
        store.record_use("key-1").await.unwrap();
        store.record_use("key-1").await.unwrap();
        assert_eq!(*store.use_counts.get("key-1").unwrap(), 2);
    }
}
