use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Cache of values derived from a resource, valid for one resource version.
///
/// Used to avoid re-extracting annotations when an Ingress has not changed.
#[derive(Debug)]
pub struct VersionedCache<T> {
    entries: Arc<DashMap<String, (String, Arc<T>)>>,
}

impl<T> Clone for VersionedCache<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for VersionedCache<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

impl<T> VersionedCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value if it was computed for `version`,
    /// otherwise compute, store and return a fresh one.
    pub fn get_or_insert_with(&self, key: &str, version: &str, f: impl FnOnce() -> T) -> Arc<T> {
        if let Some(entry) = self.entries.get(key) {
            let (cached_version, value) = entry.value();
            if cached_version == version {
                return Arc::clone(value);
            }
        }
        debug!("computing cache entry for {} (version {})", key, version);
        let value = Arc::new(f());
        self.entries
            .insert(key.to_string(), (version.to_string(), Arc::clone(&value)));
        value
    }

    /// Replace the entry for `key` unconditionally.
    pub fn insert(&self, key: &str, version: &str, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.entries
            .insert(key.to_string(), (version.to_string(), Arc::clone(&value)));
        value
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop every entry, forcing recomputation on next access.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_reuses_value_for_same_version() {
        let cache = VersionedCache::new();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            calls.get()
        };

        assert_eq!(*cache.get_or_insert_with("ns/ing", "1", compute), 1);
        assert_eq!(*cache.get_or_insert_with("ns/ing", "1", compute), 1);
        assert_eq!(calls.get(), 1);

        assert_eq!(*cache.get_or_insert_with("ns/ing", "2", compute), 2);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_clear_forces_recompute() {
        let cache = VersionedCache::new();
        cache.insert("ns/ing", "1", 10);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(*cache.get_or_insert_with("ns/ing", "1", || 20), 20);
    }
}
