//! The canonical configuration synthesized from routing resources.
//!
//! Everything here is plain data with value equality: two synthesis passes
//! over the same inputs produce equal values, and equality of
//! [`Configuration`] is the only input to the reload decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::directives::{ConnectionConfig, ProxyConfig, RewriteConfig};
use crate::ingress::ServicePort;
use crate::ssl::AuthSslCert;

/// Snapshot of the service a backend or location resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRef {
    pub namespace: String,
    pub name: String,
    pub cluster_ip: String,
}

/// A deduplicated upstream keyed by `(namespace, service, port)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backend {
    pub name: String,
    pub service: Option<ServiceRef>,
    /// Empty when the service is unknown; such backends never reach the output.
    pub cluster_ip: String,
    pub port: ServicePort,
    pub secure: bool,
    pub secure_ca_cert: AuthSslCert,
    pub client_ca_cert: AuthSslCert,
    pub upstream_hash_by: String,
}

impl Backend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.cluster_ip.is_empty()
    }
}

/// One path's routing directives within a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    pub backend: String,
    pub service: Option<ServiceRef>,
    pub port: ServicePort,
    /// `namespace/name` of the Ingress this location was derived from.
    pub ingress: Option<String>,
    /// Reason the location is denied; rendered as an error response.
    pub denied: Option<String>,
    pub auth_type: String,
    pub authz_type: String,
    pub configuration_snippet: String,
    pub location_modifier: String,
    pub upstream_uri: String,
    pub rewrite: RewriteConfig,
    pub proxy: ProxyConfig,
    pub x_forwarded_prefix: bool,
    pub connection: ConnectionConfig,
}

/// All locations sharing one hostname, plus its TLS binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub hostname: String,
    pub alias: String,
    pub ssl_certificate: String,
    pub ssl_full_chain_certificate: String,
    pub ssl_pem_checksum: String,
    pub ssl_expire_time: Option<DateTime<Utc>>,
    pub locations: Vec<Location>,
}

impl Server {
    pub fn has_certificate(&self) -> bool {
        !self.ssl_certificate.is_empty()
    }
}

/// The synthesized, sorted and deduplicated model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub backends: Vec<Backend>,
    pub servers: Vec<Server>,
}

impl Configuration {
    pub fn backend(&self, name: &str) -> Option<&Backend> {
        self.backends.iter().find(|b| b.name == name)
    }

    pub fn server(&self, hostname: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.hostname == hostname)
    }
}
