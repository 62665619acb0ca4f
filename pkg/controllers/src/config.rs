use std::path::PathBuf;
use std::time::Duration;

use pkg_constants::annotations::{DEFAULT_ANNOTATIONS_PREFIX, DEFAULT_INGRESS_CLASS};
use pkg_constants::controller::{
    DEFAULT_SSL_CERTIFICATE, DEFAULT_SYNC_PERIOD_SECS, DEFAULT_SYNC_RATE_LIMIT,
    MISSING_SECRETS_INTERVAL_SECS,
};
use pkg_constants::paths::{DEFAULT_SSL_DIR, SSL_SESSION_TICKET_KEY_FILE};
use pkg_proxy::ListenPorts;

/// Resolved controller settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub ssl_dir: PathBuf,
    pub listen_ports: ListenPorts,
    pub annotations_prefix: String,
    pub ingress_class: String,
    /// `namespace/name` of the secret used by the catch-all server.
    pub default_ssl_certificate: String,
    /// Maximum synchronizations per second.
    pub sync_rate_limit: f64,
    pub sync_period: Duration,
    /// `namespace/name` of the ConfigMap holding proxy settings.
    pub configmap: Option<String>,
    pub session_ticket_key_path: PathBuf,
    pub missing_secrets_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            ssl_dir: PathBuf::from(DEFAULT_SSL_DIR),
            listen_ports: ListenPorts::default(),
            annotations_prefix: DEFAULT_ANNOTATIONS_PREFIX.to_string(),
            ingress_class: DEFAULT_INGRESS_CLASS.to_string(),
            default_ssl_certificate: DEFAULT_SSL_CERTIFICATE.to_string(),
            sync_rate_limit: DEFAULT_SYNC_RATE_LIMIT,
            sync_period: Duration::from_secs(DEFAULT_SYNC_PERIOD_SECS),
            configmap: None,
            session_ticket_key_path: PathBuf::from(SSL_SESSION_TICKET_KEY_FILE),
            missing_secrets_interval: Duration::from_secs(MISSING_SECRETS_INTERVAL_SECS),
        }
    }
}
