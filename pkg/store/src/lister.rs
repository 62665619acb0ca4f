use dashmap::DashMap;
use std::sync::Arc;

use pkg_types::configmap::ConfigMap;
use pkg_types::endpoint::Endpoint;
use pkg_types::ingress::Ingress;
use pkg_types::meta::Resource;
use pkg_types::secret::Secret;
use pkg_types::service::Service;

/// Read access to a cache of resources keyed by `namespace/name`.
pub trait Lister<T>: Send + Sync {
    fn get_by_key(&self, key: &str) -> Option<Arc<T>>;
    fn list(&self) -> Vec<Arc<T>>;
}

/// In-memory lister backed by a `DashMap`.
///
/// Cloning shares the underlying map, so the writer side (a watch or a
/// manifest source) and every reader observe the same content.
#[derive(Debug)]
pub struct MemoryLister<T> {
    items: Arc<DashMap<String, Arc<T>>>,
}

impl<T> Clone for MemoryLister<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Default for MemoryLister<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(DashMap::new()),
        }
    }
}

impl<T: Resource> MemoryLister<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a resource, returning the previous version.
    pub fn upsert(&self, item: T) -> Option<Arc<T>> {
        self.items.insert(item.key(), Arc::new(item))
    }

    /// Remove a resource by key, returning it if it existed.
    pub fn remove(&self, key: &str) -> Option<Arc<T>> {
        self.items.remove(key).map(|(_, v)| v)
    }

    /// All keys currently cached.
    pub fn keys(&self) -> Vec<String> {
        self.items.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Resource + Send + Sync> Lister<T> for MemoryLister<T> {
    fn get_by_key(&self, key: &str) -> Option<Arc<T>> {
        self.items.get(key).map(|e| Arc::clone(e.value()))
    }

    fn list(&self) -> Vec<Arc<T>> {
        self.items.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

/// The listers the reconciliation engine reads from.
#[derive(Clone)]
pub struct StoreListers {
    pub ingress: Arc<dyn Lister<Ingress>>,
    pub service: Arc<dyn Lister<Service>>,
    pub endpoint: Arc<dyn Lister<Endpoint>>,
    pub secret: Arc<dyn Lister<Secret>>,
    pub configmap: Arc<dyn Lister<ConfigMap>>,
}

/// Writable in-memory listers, convertible into [`StoreListers`].
#[derive(Clone, Default)]
pub struct MemoryListers {
    pub ingress: MemoryLister<Ingress>,
    pub service: MemoryLister<Service>,
    pub endpoint: MemoryLister<Endpoint>,
    pub secret: MemoryLister<Secret>,
    pub configmap: MemoryLister<ConfigMap>,
}

impl MemoryListers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listers(&self) -> StoreListers {
        StoreListers {
            ingress: Arc::new(self.ingress.clone()),
            service: Arc::new(self.service.clone()),
            endpoint: Arc::new(self.endpoint.clone()),
            secret: Arc::new(self.secret.clone()),
            configmap: Arc::new(self.configmap.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_secret(ns: &str, name: &str) -> Secret {
        Secret {
            name: name.to_string(),
            namespace: ns.to_string(),
            resource_version: "1".to_string(),
            data: HashMap::new(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let lister = MemoryLister::new();
        assert!(lister.upsert(make_secret("default", "tls")).is_none());
        assert!(lister.upsert(make_secret("default", "tls")).is_some());

        let found = lister.get_by_key("default/tls").expect("should find secret");
        assert_eq!(found.name, "tls");
        assert!(lister.get_by_key("other/tls").is_none());
        assert_eq!(lister.len(), 1);
    }

    #[test]
    fn test_clones_share_content() {
        let writer = MemoryLister::new();
        let reader: Arc<dyn Lister<Secret>> = Arc::new(writer.clone());

        writer.upsert(make_secret("a", "one"));
        writer.upsert(make_secret("b", "two"));
        assert_eq!(reader.list().len(), 2);

        writer.remove("a/one");
        assert!(reader.get_by_key("a/one").is_none());
        assert_eq!(reader.list().len(), 1);
    }
}
