//! Filesystem path constants.

// ─── Proxy ────────────────────────────────────────────────────────────────

/// Default path of the proxy binary.
/// Overridden by the `NGINX_BINARY` environment variable or `--nginx-binary`.
pub const DEFAULT_NGINX_BINARY: &str = "/usr/sbin/nginx";

/// Environment variable consulted for the proxy binary path.
pub const NGINX_BINARY_ENV: &str = "NGINX_BINARY";

/// Live configuration file, fully regenerated on every applied change.
pub const DEFAULT_NGINX_CONFIG: &str = "/etc/nginx/nginx.conf";

/// Directory where pem files extracted from secrets are written.
pub const DEFAULT_SSL_DIR: &str = "/etc/ingress-controller/ssl";

/// Session ticket key file written from the `ssl-session-ticket-key` entry.
pub const SSL_SESSION_TICKET_KEY_FILE: &str = "/etc/nginx/tickets.key";

/// Prefix of temporary files holding configurations under validation.
pub const TEMP_CONFIG_PREFIX: &str = "nginx-cfg";

/// Prefix of temporary files holding configurations used for the diff log.
pub const TEMP_DIFF_PREFIX: &str = "new-nginx-cfg";

/// `somaxconn` sysctl path.
pub const SOMAXCONN_PATH: &str = "/proc/sys/net/core/somaxconn";

// ─── Controller ───────────────────────────────────────────────────────────

/// Default config file path for the controller.
pub const DEFAULT_CONTROLLER_CONFIG: &str = "/etc/ingress-controller/config.yaml";

/// Default directory scanned for resource manifests.
pub const DEFAULT_MANIFESTS_DIR: &str = "/etc/ingress-controller/manifests";
