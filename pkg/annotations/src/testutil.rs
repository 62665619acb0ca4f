use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use pkg_types::ingress::{
    Ingress, IngressBackend, IngressHTTP, IngressPath, IngressRule, IngressSpec, PathType,
    ServicePort,
};
use pkg_types::secret::Secret;
use pkg_types::service::Service;
use pkg_types::ssl::AuthSslCert;

use crate::parser::AnnotationConfig;
use crate::resolver::Resolver;

/// Resolver backed by a fixed set of certificates.
#[derive(Default)]
pub struct MockResolver {
    pub certs: HashMap<String, AuthSslCert>,
}

impl MockResolver {
    pub fn with_cert(name: &str) -> Self {
        let mut certs = HashMap::new();
        certs.insert(
            name.to_string(),
            AuthSslCert {
                secret: name.to_string(),
                ca_file_name: format!("/etc/ssl/{}-ca.pem", name.replace('/', "-")),
                pem_file_name: format!("/etc/ssl/{}.pem", name.replace('/', "-")),
                pem_sha: "abc".to_string(),
            },
        );
        Self { certs }
    }
}

impl Resolver for MockResolver {
    fn get_auth_certificate(&self, name: &str) -> anyhow::Result<AuthSslCert> {
        self.certs
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("secret not found: {}", name))
    }

    fn get_secret(&self, name: &str) -> anyhow::Result<Arc<Secret>> {
        anyhow::bail!("secret not found: {}", name)
    }

    fn get_service(&self, name: &str) -> anyhow::Result<Arc<Service>> {
        anyhow::bail!("service not found: {}", name)
    }
}

pub fn config() -> AnnotationConfig {
    AnnotationConfig::default()
}

/// Prefixed annotation key for a directive.
pub fn key(name: &str) -> String {
    config().key(name)
}

pub fn make_ingress(annotations: &[(&str, &str)]) -> Ingress {
    let backend = IngressBackend {
        service_name: "default-backend".to_string(),
        service_port: ServicePort::Number(80),
    };
    Ingress {
        name: "foo".to_string(),
        namespace: "default".to_string(),
        resource_version: "1".to_string(),
        annotations: annotations
            .iter()
            .map(|(k, v)| (key(k), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
        spec: IngressSpec {
            default_backend: Some(backend.clone()),
            rules: vec![IngressRule {
                host: "foo.bar.com".to_string(),
                http: Some(IngressHTTP {
                    paths: vec![IngressPath {
                        path: "/foo".to_string(),
                        path_type: PathType::Prefix,
                        backend,
                    }],
                }),
            }],
            tls: vec![],
        },
        created_at: chrono::Utc::now(),
    }
}
