use std::sync::Arc;

use pkg_annotations::Resolver;
use pkg_store::StoreListers;
use pkg_types::secret::Secret;
use pkg_types::service::Service;
use pkg_types::ssl::AuthSslCert;

use crate::secrets::SecretSync;

/// [`Resolver`] backed by the controller's listers and certificate store.
pub struct StoreResolver {
    secrets: Arc<SecretSync>,
    listers: StoreListers,
}

impl StoreResolver {
    pub fn new(secrets: Arc<SecretSync>, listers: StoreListers) -> Self {
        Self { secrets, listers }
    }
}

impl Resolver for StoreResolver {
    fn get_auth_certificate(&self, name: &str) -> anyhow::Result<AuthSslCert> {
        self.secrets.get_auth_certificate(name)
    }

    fn get_secret(&self, name: &str) -> anyhow::Result<Arc<Secret>> {
        self.listers
            .secret
            .get_by_key(name)
            .ok_or_else(|| anyhow::anyhow!("secret {} was not found", name))
    }

    fn get_service(&self, name: &str) -> anyhow::Result<Arc<Service>> {
        self.listers
            .service
            .get_by_key(name)
            .ok_or_else(|| anyhow::anyhow!("service {} was not found", name))
    }
}
