//! `ServiceStore` port plus an in-memory reference implementation.
//!
//! A persistent registration store is out of scope here; this module
//! defines the trait boundary the rest of the gateway programs against,
//! and a `DashMap`-backed implementation so the crate runs standalone.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::model::ServiceRegistration;

#[derive(Clone, Debug)]
pub enum ChangeEvent {
    Put(ServiceRegistration),
    Delete(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Durable registration storage port. Implementations must enforce
/// optimistic-concurrency CAS on `version` inside `put` when the caller
/// passes a non-zero expected version.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn list(&self) -> Result<Vec<ServiceRegistration>, StoreError>;
    async fn get(&self, service_id: &str) -> Result<Option<ServiceRegistration>, StoreError>;
    /// Insert or update. `expected_version` of `0` means "create, must not
    /// already exist or will be overwritten unconditionally" -- the
    /// `ServiceRegistry` layer is responsible for the exists/CAS distinction
    /// between registering a new service and updating an existing one.
    async fn put(
        &self,
        reg: ServiceRegistration,
        expected_version: Option<u64>,
    ) -> Result<ServiceRegistration, StoreError>;
    async fn delete(&self, service_id: &str) -> Result<bool, StoreError>;
    /// A change stream for cache invalidation. The in-memory implementation
    /// is its own source of truth, so this is mostly useful when the real
    /// store is a remote service with fan-out instances.
    fn watch(&self) -> broadcast::Receiver<ChangeEvent>;
}

pub struct InMemoryServiceStore {
    services: DashMap<String, ServiceRegistration>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl InMemoryServiceStore {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            services: DashMap::new(),
            changes: tx,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for InMemoryServiceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceStore for InMemoryServiceStore {
    async fn list(&self) -> Result<Vec<ServiceRegistration>, StoreError> {
        Ok(self.services.iter().map(|e| e.value().clone()).collect())
    }

    async fn get(&self, service_id: &str) -> Result<Option<ServiceRegistration>, StoreError> {
        Ok(self.services.get(service_id).map(|e| e.value().clone()))
    }

    async fn put(
        &self,
        reg: ServiceRegistration,
        expected_version: Option<u64>,
    ) -> Result<ServiceRegistration, StoreError> {
        if let Some(expected) = expected_version {
            if let Some(existing) = self.services.get(&reg.service_id) {
                if existing.version != expected {
                    return Err(StoreError::VersionConflict {
                        expected,
                        found: existing.version,
                    });
                }
            }
        }
        self.services.insert(reg.service_id.clone(), reg.clone());
        let _ = self.changes.send(ChangeEvent::Put(reg.clone()));
        Ok(reg)
    }

    async fn delete(&self, service_id: &str) -> Result<bool, StoreError> {
        let removed = self.services.remove(service_id).is_some();
        if removed {
            let _ = self.changes.send(ChangeEvent::Delete(service_id.to_string()));
        }
        Ok(removed)
    }

    fn watch(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::model::Visibility;

    fn sample(service_id: &str, version: u64) -> ServiceRegistration {
        ServiceRegistration {
            service_id: service_id.to_string(),
            display_name: None,
            base_url: "http://backend:9000".into(),
            route_prefix: None,
            default_visibility: Visibility::Private,
            default_auth_required: false,
            visibility_rules: vec![],
            endpoints: vec![],
            access_config: None,
            cors_config: None,
            permission_policy: None,
            rate_limit_config: None,
            sampling_config: None,
            version,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryServiceStore::new();
        store.put(sample("svc-a", 1), None).await.unwrap();
        let got = store.get("svc-a").await.unwrap().unwrap();
        assert_eq!(got.service_id, "svc-a");
    }

    #[tokio::test]
    async fn cas_mismatch_is_rejected() {
        let store = InMemoryServiceStore::new();
        store.put(sample("svc-a", 1), None).await.unwrap();
        let result = store.put(sample("svc-a", 2), Some(99)).await;
        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn delete_of_absent_id_is_a_no_op() {
        let store = InMemoryServiceStore::new();
        assert!(!store.delete("missing").await.unwrap());
    }

    #[tokio::test]
    async fn watch_observes_put() {
        let store = InMemoryServiceStore::new();
        let mut rx = store.watch();
        store.put(sample("svc-a", 1), None).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ChangeEvent::Put(r) if r.service_id == "svc-a"));
    }
}
