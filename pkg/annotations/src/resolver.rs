use std::sync::Arc;

use pkg_types::secret::Secret;
use pkg_types::service::Service;
use pkg_types::ssl::AuthSslCert;

/// Lookups the annotation parsers (and status publishers) may perform
/// against the controller's caches. Names are `namespace/name`.
pub trait Resolver: Send + Sync {
    /// Resolve a secret into certificate files, syncing it first if it
    /// has not been seen yet.
    fn get_auth_certificate(&self, name: &str) -> anyhow::Result<AuthSslCert>;

    fn get_secret(&self, name: &str) -> anyhow::Result<Arc<Secret>>;

    fn get_service(&self, name: &str) -> anyhow::Result<Arc<Service>>;
}
