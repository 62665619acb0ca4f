//! Keeps the certificate store in step with the secrets Ingresses reference.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use pkg_annotations::AnnotationConfig;
use pkg_constants::annotations::AUTH_TLS_SECRET;
use pkg_store::{CertificateStore, Lister};
use pkg_types::ingress::Ingress;
use pkg_types::secret::Secret;
use pkg_types::ssl::{AuthSslCert, SslCert};

pub struct SecretSync {
    secrets: Arc<dyn Lister<Secret>>,
    certificates: CertificateStore,
    ssl_dir: PathBuf,
    annotations: AnnotationConfig,
}

impl SecretSync {
    pub fn new(
        secrets: Arc<dyn Lister<Secret>>,
        certificates: CertificateStore,
        ssl_dir: impl Into<PathBuf>,
        annotations: AnnotationConfig,
    ) -> Self {
        Self {
            secrets,
            certificates,
            ssl_dir: ssl_dir.into(),
            annotations,
        }
    }

    pub fn certificates(&self) -> &CertificateStore {
        &self.certificates
    }

    fn get_pem_certificate(&self, key: &str) -> anyhow::Result<SslCert> {
        let secret = self
            .secrets
            .get_by_key(key)
            .ok_or_else(|| anyhow::anyhow!("secret {} not found", key))?;
        pkg_pki::write_secret_certificate(&self.ssl_dir, &secret)
    }

    /// Write the secret's certificate files and store their metadata.
    /// Returns `true` when the store changed.
    pub fn sync_secret(&self, key: &str) -> bool {
        debug!("starting syncing of secret {}", key);

        let cert = match self.get_pem_certificate(key) {
            Ok(cert) => cert,
            Err(e) => {
                warn!("error obtaining PEM from secret {}: {:#}", key, e);
                return false;
            }
        };

        match self.certificates.get(key) {
            Some(existing) if existing.pem_sha == cert.pem_sha => {
                debug!("secret {} has no changes", key);
                false
            }
            Some(_) => {
                info!("updating secret {} in the local store", key);
                self.certificates.put(key, cert);
                true
            }
            None => {
                info!("adding secret {} to the local store", key);
                self.certificates.put(key, cert);
                true
            }
        }
    }

    /// `namespace/name` of every secret an Ingress references.
    pub fn referenced_secrets(&self, ing: &Ingress) -> Vec<String> {
        let mut keys: Vec<String> = ing
            .tls_secret_names()
            .map(|name| format!("{}/{}", ing.namespace, name))
            .collect();
        if let Ok(key) = self.annotations.get_string(AUTH_TLS_SECRET, ing) {
            if !key.is_empty() {
                keys.push(key);
            }
        }
        keys
    }

    /// Sync every secret referenced by an Ingress.
    pub fn read_secrets(&self, ing: &Ingress) {
        for key in self.referenced_secrets(ing) {
            self.sync_secret(&key);
        }
    }

    /// Sync referenced secrets that are not in the store yet.
    /// Returns `true` when any of them could be added.
    pub fn check_missing_secrets(&self, ingresses: &[Arc<Ingress>]) -> bool {
        let mut changed = false;
        for ing in ingresses {
            for key in self.referenced_secrets(ing) {
                if !self.certificates.contains(&key) {
                    changed |= self.sync_secret(&key);
                }
            }
        }
        changed
    }

    /// Whether any of the Ingresses references `key`.
    pub fn is_referenced(&self, key: &str, ingresses: &[Arc<Ingress>]) -> bool {
        ingresses
            .iter()
            .any(|ing| self.referenced_secrets(ing).iter().any(|k| k == key))
    }

    /// Resolve a secret into certificate files, syncing it on first use.
    pub fn get_auth_certificate(&self, name: &str) -> anyhow::Result<AuthSslCert> {
        if !self.certificates.contains(name) {
            self.sync_secret(name);
        }
        if self.secrets.get_by_key(name).is_none() {
            anyhow::bail!("secret {} not found", name);
        }
        let cert = self
            .certificates
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("secret {} does not exist", name))?;
        Ok(AuthSslCert {
            secret: name.to_string(),
            ca_file_name: cert.ca_file_name,
            pem_file_name: cert.pem_file_name,
            pem_sha: cert.pem_sha,
        })
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use std::collections::HashMap;

    use pkg_types::secret::{CA_CERT_KEY, Secret, TLS_CERT_KEY, TLS_PRIVATE_KEY_KEY};

    /// A TLS secret holding a fresh self-signed certificate for `hosts`.
    pub fn make_tls_secret(name: &str, hosts: &[&str]) -> Secret {
        let names: Vec<String> = hosts.iter().map(|h| h.to_string()).collect();
        let certified = rcgen::generate_simple_self_signed(names).unwrap();
        let mut data = HashMap::new();
        data.insert(
            TLS_CERT_KEY.to_string(),
            STANDARD.encode(certified.cert.pem()),
        );
        data.insert(
            TLS_PRIVATE_KEY_KEY.to_string(),
            STANDARD.encode(certified.key_pair.serialize_pem()),
        );
        Secret {
            name: name.to_string(),
            namespace: "default".to_string(),
            resource_version: "1".to_string(),
            data,
            created_at: chrono::Utc::now(),
        }
    }

    /// A secret holding only a CA bundle.
    pub fn make_ca_secret(name: &str) -> Secret {
        let certified = rcgen::generate_simple_self_signed(vec!["ca.local".to_string()]).unwrap();
        let mut data = HashMap::new();
        data.insert(CA_CERT_KEY.to_string(), STANDARD.encode(certified.cert.pem()));
        Secret {
            name: name.to_string(),
            namespace: "default".to_string(),
            resource_version: "1".to_string(),
            data,
            created_at: chrono::Utc::now(),
        }
    }
}
