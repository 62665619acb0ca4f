//! Reconciliation engine constants.

/// Hostname of the catch-all server.
pub const DEFAULT_SERVER_NAME: &str = "_";

/// Path used when an ingress path is empty.
pub const ROOT_LOCATION: &str = "/";

/// Internal location routing to the cluster API.
pub const KUBERNETES_LOCATION: &str = "/kubernetes/";

/// `namespace/name` of the cluster API service.
pub const KUBERNETES_SERVICE: &str = "default/kubernetes";

/// Name of the synthetic cluster API upstream.
pub const KUBERNETES_UPSTREAM_NAME: &str = "upstream-kubernetes";

/// Default secret holding the catch-all certificate.
pub const DEFAULT_SSL_CERTIFICATE: &str = "kube-system/router-certs";

/// Name used for the generated self-signed certificate.
pub const FAKE_CERTIFICATE_NAME: &str = "default-fake-certificate";

/// Default upper bound of synchronizations per second.
pub const DEFAULT_SYNC_RATE_LIMIT: f64 = 0.3;

/// Default relist period, in seconds.
pub const DEFAULT_SYNC_PERIOD_SECS: u64 = 600;

/// Lowest accepted relist period, in seconds.
pub const MIN_SYNC_PERIOD_SECS: u64 = 10;

/// Interval of the missing-secrets check, in seconds.
pub const MISSING_SECRETS_INTERVAL_SECS: u64 = 30;

/// Poll interval while waiting for the proxy to exit, in milliseconds.
pub const PROCESS_POLL_INTERVAL_MS: u64 = 1000;

/// Poll interval while waiting for the listen port to be released, in milliseconds.
pub const PORT_POLL_INTERVAL_MS: u64 = 100;

/// Time to wait after stopping before the process exits, in seconds.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;
