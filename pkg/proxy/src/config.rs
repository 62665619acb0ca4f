//! Proxy-wide settings and the input handed to the template.

use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, warn};

use pkg_constants::network::{DEFAULT_HTTP_PORT, DEFAULT_HTTPS_PORT};
use pkg_types::model::{Backend, Server};

/// Ports the proxy listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListenPorts {
    pub http: u16,
    pub https: u16,
}

impl Default for ListenPorts {
    fn default() -> Self {
        Self {
            http: DEFAULT_HTTP_PORT,
            https: DEFAULT_HTTPS_PORT,
        }
    }
}

/// Global proxy settings, read from the configuration ConfigMap.
///
/// Unknown keys are ignored; values that fail to parse keep their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NginxConfig {
    pub worker_processes: String,
    pub worker_connections: u32,
    pub worker_shutdown_timeout: String,
    pub keep_alive: u32,
    pub keep_alive_requests: u32,
    pub client_header_buffer_size: String,
    pub large_client_header_buffers: String,
    pub client_body_buffer_size: String,
    pub server_name_hash_bucket_size: u32,
    pub server_name_hash_max_size: u32,
    pub error_log_level: String,
    pub access_log_path: String,
    pub error_log_path: String,
    pub disable_access_log: bool,
    pub ssl_protocols: String,
    pub ssl_ciphers: String,
    pub ssl_session_cache: bool,
    pub ssl_session_cache_size: String,
    pub ssl_session_timeout: String,
    pub ssl_session_tickets: bool,
    /// Base64 encoded 48 or 80 byte key; written to disk, never rendered.
    pub ssl_session_ticket_key: String,
    pub use_http2: bool,
    pub use_gzip: bool,
    pub gzip_types: String,
    pub enable_underscores_in_headers: bool,
    pub forwarded_for_header: String,
    pub disable_ipv6: bool,
    pub http_snippet: String,
}

impl Default for NginxConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            worker_processes: workers.to_string(),
            worker_connections: 16384,
            worker_shutdown_timeout: "10s".to_string(),
            keep_alive: 75,
            keep_alive_requests: 100,
            client_header_buffer_size: "1k".to_string(),
            large_client_header_buffers: "4 8k".to_string(),
            client_body_buffer_size: "8k".to_string(),
            server_name_hash_bucket_size: 64,
            server_name_hash_max_size: 1024,
            error_log_level: "notice".to_string(),
            access_log_path: "/dev/stdout".to_string(),
            error_log_path: "/dev/stderr".to_string(),
            disable_access_log: false,
            ssl_protocols: "TLSv1.2 TLSv1.3".to_string(),
            ssl_ciphers: "ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:ECDHE-ECDSA-AES256-GCM-SHA384:ECDHE-RSA-AES256-GCM-SHA384:ECDHE-ECDSA-CHACHA20-POLY1305:ECDHE-RSA-CHACHA20-POLY1305".to_string(),
            ssl_session_cache: true,
            ssl_session_cache_size: "10m".to_string(),
            ssl_session_timeout: "10m".to_string(),
            ssl_session_tickets: true,
            ssl_session_ticket_key: String::new(),
            use_http2: true,
            use_gzip: true,
            gzip_types: "application/javascript application/json application/xml text/css text/plain text/xml".to_string(),
            enable_underscores_in_headers: false,
            forwarded_for_header: "X-Forwarded-For".to_string(),
            disable_ipv6: false,
            http_snippet: String::new(),
        }
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, value: &str, target: &mut T) {
    match value.trim().parse::<T>() {
        Ok(v) => *target = v,
        Err(_) => warn!(
            "invalid value {:?} for configuration key {}, keeping default",
            value, key
        ),
    }
}

fn parse_bool_or_warn(key: &str, value: &str, target: &mut bool) {
    match value.trim() {
        "true" | "True" | "TRUE" | "1" => *target = true,
        "false" | "False" | "FALSE" | "0" => *target = false,
        _ => warn!(
            "invalid value {:?} for configuration key {}, keeping default",
            value, key
        ),
    }
}

/// Build the proxy settings from ConfigMap data, starting from defaults.
pub fn read_config(data: &HashMap<String, String>) -> NginxConfig {
    let mut cfg = NginxConfig::default();

    for (key, value) in data {
        match key.as_str() {
            "worker-processes" => cfg.worker_processes = value.clone(),
            "max-worker-connections" => parse_or_warn(key, value, &mut cfg.worker_connections),
            "worker-shutdown-timeout" => cfg.worker_shutdown_timeout = value.clone(),
            "keep-alive" => parse_or_warn(key, value, &mut cfg.keep_alive),
            "keep-alive-requests" => parse_or_warn(key, value, &mut cfg.keep_alive_requests),
            "client-header-buffer-size" => cfg.client_header_buffer_size = value.clone(),
            "large-client-header-buffers" => cfg.large_client_header_buffers = value.clone(),
            "client-body-buffer-size" => cfg.client_body_buffer_size = value.clone(),
            "server-name-hash-bucket-size" => {
                parse_or_warn(key, value, &mut cfg.server_name_hash_bucket_size)
            }
            "server-name-hash-max-size" => {
                parse_or_warn(key, value, &mut cfg.server_name_hash_max_size)
            }
            "error-log-level" => cfg.error_log_level = value.clone(),
            "access-log-path" => cfg.access_log_path = value.clone(),
            "error-log-path" => cfg.error_log_path = value.clone(),
            "disable-access-log" => parse_bool_or_warn(key, value, &mut cfg.disable_access_log),
            "ssl-protocols" => cfg.ssl_protocols = value.clone(),
            "ssl-ciphers" => cfg.ssl_ciphers = value.clone(),
            "ssl-session-cache" => parse_bool_or_warn(key, value, &mut cfg.ssl_session_cache),
            "ssl-session-cache-size" => cfg.ssl_session_cache_size = value.clone(),
            "ssl-session-timeout" => cfg.ssl_session_timeout = value.clone(),
            "ssl-session-tickets" => parse_bool_or_warn(key, value, &mut cfg.ssl_session_tickets),
            "ssl-session-ticket-key" => cfg.ssl_session_ticket_key = value.clone(),
            "use-http2" => parse_bool_or_warn(key, value, &mut cfg.use_http2),
            "use-gzip" => parse_bool_or_warn(key, value, &mut cfg.use_gzip),
            "gzip-types" => cfg.gzip_types = value.clone(),
            "enable-underscores-in-headers" => {
                parse_bool_or_warn(key, value, &mut cfg.enable_underscores_in_headers)
            }
            "forwarded-for-header" => cfg.forwarded_for_header = value.clone(),
            "disable-ipv6" => parse_bool_or_warn(key, value, &mut cfg.disable_ipv6),
            "http-snippet" => cfg.http_snippet = value.clone(),
            _ => debug!("ignoring unknown configuration key {}", key),
        }
    }

    cfg
}

/// Everything the template needs to produce the configuration text.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateConfig {
    pub max_open_files: u64,
    pub backlog_size: u32,
    pub backends: Vec<Backend>,
    pub servers: Vec<Server>,
    pub cfg: NginxConfig,
    pub resolvers: Vec<IpAddr>,
    pub is_ipv6_enabled: bool,
    pub listen_ports: ListenPorts,
    /// Written by the controller when a session ticket key is configured.
    pub ssl_session_ticket_key_file: Option<String>,
}
