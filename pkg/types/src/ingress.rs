use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Path matching type for Ingress rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathType {
    #[default]
    Prefix,
    Exact,
    ImplementationSpecific,
}

/// A service port referenced by number or by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServicePort {
    Number(u16),
    Name(String),
}

impl Default for ServicePort {
    fn default() -> Self {
        ServicePort::Number(0)
    }
}

impl fmt::Display for ServicePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServicePort::Number(n) => write!(f, "{}", n),
            ServicePort::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Backend service target for an Ingress path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressBackend {
    pub service_name: String,
    pub service_port: ServicePort,
}

impl IngressBackend {
    /// Upstream name shared by every path targeting the same `(namespace, service, port)`.
    pub fn upstream_name(&self, namespace: &str) -> String {
        format!("{}-{}-{}", namespace, self.service_name, self.service_port)
    }
}

/// A single path rule within an Ingress HTTP rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressPath {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub path_type: PathType,
    pub backend: IngressBackend,
}

/// HTTP rules for a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressHTTP {
    #[serde(default)]
    pub paths: Vec<IngressPath>,
}

/// A single host-based Ingress rule. An empty host targets the catch-all server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub http: Option<IngressHTTP>,
}

/// TLS configuration for an Ingress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressTLS {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub secret_name: String,
}

/// Ingress specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressSpec {
    #[serde(default)]
    pub default_backend: Option<IngressBackend>,
    #[serde(default)]
    pub rules: Vec<IngressRule>,
    #[serde(default)]
    pub tls: Vec<IngressTLS>,
}

/// Ingress resource for external traffic routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingress {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub spec: IngressSpec,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

crate::impl_resource!(Ingress);

impl Ingress {
    /// Secret names referenced by the TLS section, skipping empty ones.
    pub fn tls_secret_names(&self) -> impl Iterator<Item = &str> {
        self.spec
            .tls
            .iter()
            .map(|t| t.secret_name.as_str())
            .filter(|s| !s.is_empty())
    }
}
