//! Typed values produced by the routing annotation parsers.

use serde::{Deserialize, Serialize};

use crate::ssl::AuthSslCert;

/// Per-location rewrite settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Target URI where the traffic must be redirected.
    pub target: String,
    /// Inject a `<base>` tag in the head of upstream responses.
    pub add_base_url: bool,
    /// Scheme override for the injected base tag.
    pub base_url_scheme: String,
    /// Application root the `/` context is redirected to.
    pub app_root: String,
}

/// Proxy timeouts (seconds) and buffer sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub body_size: String,
    pub connect_timeout: u32,
    pub send_timeout: u32,
    pub read_timeout: u32,
    pub buffer_size: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            body_size: "1m".to_string(),
            connect_timeout: 5,
            send_timeout: 60,
            read_timeout: 60,
            buffer_size: "4k".to_string(),
        }
    }
}

/// TLS towards the upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureUpstreamConfig {
    pub secure: bool,
    pub ca_cert: AuthSslCert,
    pub client_ca_cert: AuthSslCert,
}

/// Override of the `Connection` header sent upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub header: String,
    pub enabled: bool,
}
