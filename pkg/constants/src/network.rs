//! Network-related constants.

/// Default port the proxy listens on for plain HTTP traffic.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default port the proxy listens on for HTTPS traffic.
pub const DEFAULT_HTTPS_PORT: u16 = 8443;

/// Port of the cluster API service targeted by the synthetic upstream.
pub const KUBERNETES_API_PORT: u16 = 443;

/// Fallback listen backlog when `net.core.somaxconn` cannot be read or is too low.
pub const DEFAULT_BACKLOG_SIZE: u32 = 511;

/// Lowest `net.core.somaxconn` value that is used as-is.
pub const MIN_SOMAXCONN: u32 = 512;

/// File descriptors kept in reserve per worker when computing `worker_rlimit_nofile`.
pub const RESERVED_OPEN_FILES: u64 = 1024;
