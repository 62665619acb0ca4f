//! In-memory certificate tracking.
//!
//! Maps secret identity (`namespace/name`) to the certificate material
//! written to disk for it. Entries are never evicted implicitly; stale
//! ones are harmless and get refreshed the next time the secret is synced.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use pkg_types::ssl::SslCert;

/// Concurrent certificate store.
///
/// Backed by a shared `DashMap`. Written by secret sync (listener callbacks
/// and the missing-secrets check) and read by the reconciliation worker.
#[derive(Debug, Clone, Default)]
pub struct CertificateStore {
    certs: Arc<DashMap<String, SslCert>>,
}

impl CertificateStore {
    /// Create an empty certificate store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the certificate tracked for a secret.
    pub fn get(&self, key: &str) -> Option<SslCert> {
        self.certs.get(key).map(|e| e.value().clone())
    }

    /// Track or replace the certificate for a secret.
    pub fn put(&self, key: &str, cert: SslCert) {
        self.certs.insert(key.to_string(), cert);
    }

    /// Stop tracking a secret. Returns `true` if it was tracked.
    pub fn delete(&self, key: &str) -> bool {
        self.certs.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.certs.contains_key(key)
    }

    /// Point-in-time copy used as a synthesis input.
    pub fn snapshot(&self) -> HashMap<String, SslCert> {
        self.certs
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_cert(sha: &str) -> SslCert {
        SslCert {
            pem_file_name: "/etc/ssl/default-tls.pem".to_string(),
            pem_sha: sha.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_put_and_get() {
        let store = CertificateStore::new();
        assert!(store.get("default/tls").is_none());

        store.put("default/tls", make_cert("abc"));
        let cert = store.get("default/tls").expect("should find certificate");
        assert_eq!(cert.pem_sha, "abc");
        assert!(store.contains("default/tls"));
    }

    #[test]
    fn test_put_replaces() {
        let store = CertificateStore::new();
        store.put("default/tls", make_cert("abc"));
        store.put("default/tls", make_cert("def"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("default/tls").unwrap().pem_sha, "def");
    }

    #[test]
    fn test_delete() {
        let store = CertificateStore::new();
        store.put("default/tls", make_cert("abc"));
        assert!(store.delete("default/tls"));
        assert!(!store.delete("default/tls"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let store = CertificateStore::new();
        store.put("a/one", make_cert("1"));
        let snap = store.snapshot();
        store.put("b/two", make_cert("2"));
        assert_eq!(snap.len(), 1);
        assert_eq!(store.len(), 2);
    }
}
