//! Configuration text generation.
//!
//! The output is a pure function of the [`TemplateConfig`]: the same input
//! always yields the same text.

use std::fmt::Write;
use std::net::IpAddr;
use tracing::{enabled, error, trace, Level};

use pkg_constants::controller::DEFAULT_SERVER_NAME;
use pkg_types::model::{Backend, Location, Server};

use crate::config::TemplateConfig;
use crate::error::ProxyError;

const SLASH: &str = "/";
const BASE_TAG_REGEX: &str = r#"(<(?:H|h)(?:E|e)(?:A|a)(?:D|d)(?:[^">]|"[^"]*")*>)"#;

/// Wrap IPv6 addresses in brackets. Anything else is returned unchanged.
pub fn format_ip(input: &str) -> String {
    match input.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => format!("[{}]", input),
        _ => input.to_string(),
    }
}

/// `resolver` directive for the given nameservers, or an empty string.
pub fn build_resolvers(resolvers: &[IpAddr]) -> String {
    if resolvers.is_empty() {
        return String::new();
    }
    let mut parts = vec!["resolver".to_string()];
    for ns in resolvers {
        match ns {
            IpAddr::V4(v4) => parts.push(v4.to_string()),
            IpAddr::V6(v6) => parts.push(format!("[{}]", v6)),
        }
    }
    parts.push("valid=30s;".to_string());
    parts.join(" ")
}

/// Variable holding the client address header, e.g. `$http_x_forwarded_for`.
pub fn build_forwarded_for(header: &str) -> String {
    format!("$http_{}", header.replace('-', "_").to_lowercase())
}

/// Location match expression. Rewritten locations become case-insensitive
/// regexes capturing the remainder of the path as `$baseuri`.
pub fn build_location(location: &Location) -> String {
    let path = location.path.as_str();
    let target = location.rewrite.target.as_str();
    if !target.is_empty() && target != path {
        if path == SLASH {
            return format!("~* {}", path);
        }
        let mut baseuri = "(?<baseuri>.*)".to_string();
        if !path.ends_with(SLASH) {
            baseuri = format!(r"\/?{}", baseuri);
        }
        return format!("~* ^{}{}", path, baseuri);
    }
    path.to_string()
}

/// `proxy_pass` (and any rewrite rules) for a location.
pub fn build_proxy_pass(backends: &[Backend], location: &Location) -> String {
    let upstream_name = location.backend.as_str();
    let proto = match backends.iter().find(|b| b.name == upstream_name) {
        Some(b) if b.secure => "https",
        _ => "http",
    };

    let default_proxy_pass = format!("proxy_pass {}://{};", proto, upstream_name);
    let target = location.rewrite.target.as_str();
    if location.path == target {
        return default_proxy_pass;
    }

    let mut path = location.path.clone();
    if !path.ends_with(SLASH) {
        path.push_str(SLASH);
    }

    if target.is_empty() {
        if !location.upstream_uri.is_empty() {
            return format!(
                "proxy_pass {}://{}{};",
                proto, upstream_name, location.upstream_uri
            );
        }
        return default_proxy_pass;
    }

    let mut abu = String::new();
    if location.rewrite.add_base_url {
        let base_path = format!("{}$baseuri", path);
        let scheme = if location.rewrite.base_url_scheme.is_empty() {
            "$scheme"
        } else {
            location.rewrite.base_url_scheme.as_str()
        };
        abu = format!(
            "subs_filter '{}' '$1<base href=\"{}://$http_host{}\">' ro;\n\t    ",
            BASE_TAG_REGEX, scheme, base_path
        );
    }

    let mut x_forwarded_prefix = String::new();
    if location.x_forwarded_prefix {
        x_forwarded_prefix = format!(
            "proxy_set_header X-Forwarded-Prefix \"{}\";\n\t    ",
            path
        );
    }

    if target == SLASH {
        return format!(
            "\n\t    rewrite {}(.*) /$1 break;\n\t    rewrite {} / break;\n\t    {}proxy_pass {}://{};\n\t    {}",
            path, location.path, x_forwarded_prefix, proto, upstream_name, abu
        );
    }

    format!(
        "\n\t    rewrite {}(.*) {}/$1 break;\n\t    {}proxy_pass {}://{};\n\t    {}",
        path, target, x_forwarded_prefix, proto, upstream_name, abu
    )
}

/// Upstream certificate verification for secure backends.
pub fn build_ssl_verify(backends: &[Backend], location: &Location) -> String {
    let Some(backend) = backends.iter().find(|b| b.name == location.backend) else {
        return String::new();
    };
    if !backend.secure {
        return String::new();
    }
    if backend.secure_ca_cert.ca_file_name.is_empty() {
        return "proxy_ssl_verify off;".to_string();
    }
    format!(
        "\n\t    proxy_ssl_verify on;\n\t    proxy_ssl_trusted_certificate {};\n\t    ",
        backend.secure_ca_cert.ca_file_name
    )
}

/// Client certificate presented to secure backends.
pub fn build_client_ca_auth(backends: &[Backend], location: &Location) -> String {
    let Some(backend) = backends.iter().find(|b| b.name == location.backend) else {
        return String::new();
    };
    if !backend.secure || backend.client_ca_cert.secret.is_empty() {
        return String::new();
    }
    format!(
        "\n\t    proxy_ssl_certificate {};\n\t    proxy_ssl_certificate_key {};\n\t    ",
        backend.client_ca_cert.pem_file_name, backend.client_ca_cert.pem_file_name
    )
}

/// Whether a size is a plain number optionally suffixed by `k` or `m`.
pub fn is_valid_client_body_buffer_size(size: &str) -> bool {
    if size.is_empty() {
        return false;
    }
    let lower = size.to_lowercase();
    let digits = lower
        .strip_suffix('k')
        .or_else(|| lower.strip_suffix('m'))
        .unwrap_or(&lower);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Render the complete configuration text.
pub fn render(tc: &TemplateConfig) -> Result<String, ProxyError> {
    if enabled!(Level::TRACE) {
        match serde_json::to_string(tc) {
            Ok(json) => trace!("NGINX configuration: {}", json),
            Err(e) => error!("unexpected error: {}", e),
        }
    }

    let mut out = String::with_capacity(16 * 1024);
    let cfg = &tc.cfg;

    writeln!(out, "daemon off;")?;
    writeln!(out, "worker_processes {};", cfg.worker_processes)?;
    writeln!(out, "worker_rlimit_nofile {};", tc.max_open_files)?;
    writeln!(out, "worker_shutdown_timeout {};", cfg.worker_shutdown_timeout)?;
    writeln!(out)?;
    writeln!(out, "events {{")?;
    writeln!(out, "    multi_accept on;")?;
    writeln!(out, "    worker_connections {};", cfg.worker_connections)?;
    writeln!(out, "    use epoll;")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    writeln!(out, "http {{")?;

    let resolvers = build_resolvers(&tc.resolvers);
    if !resolvers.is_empty() {
        writeln!(out, "    {}", resolvers)?;
    }
    writeln!(out, "    sendfile on;")?;
    writeln!(out, "    tcp_nopush on;")?;
    writeln!(out, "    tcp_nodelay on;")?;
    writeln!(out, "    reset_timedout_connection on;")?;
    writeln!(out, "    keepalive_timeout {}s;", cfg.keep_alive)?;
    writeln!(out, "    keepalive_requests {};", cfg.keep_alive_requests)?;
    writeln!(out, "    client_header_buffer_size {};", cfg.client_header_buffer_size)?;
    writeln!(out, "    large_client_header_buffers {};", cfg.large_client_header_buffers)?;
    if is_valid_client_body_buffer_size(&cfg.client_body_buffer_size) {
        writeln!(out, "    client_body_buffer_size {};", cfg.client_body_buffer_size)?;
    } else {
        error!(
            "client-body-buffer-size '{}' was provided in an incorrect format, hence it will not be set.",
            cfg.client_body_buffer_size
        );
    }
    writeln!(out, "    types_hash_max_size 2048;")?;
    writeln!(out, "    server_names_hash_max_size {};", cfg.server_name_hash_max_size)?;
    writeln!(out, "    server_names_hash_bucket_size {};", cfg.server_name_hash_bucket_size)?;
    writeln!(out, "    include /etc/nginx/mime.types;")?;
    writeln!(out, "    default_type text/html;")?;
    writeln!(out, "    server_tokens off;")?;
    if cfg.enable_underscores_in_headers {
        writeln!(out, "    underscores_in_headers on;")?;
    }
    if cfg.use_gzip {
        writeln!(out, "    gzip on;")?;
        writeln!(out, "    gzip_comp_level 5;")?;
        writeln!(out, "    gzip_proxied any;")?;
        writeln!(out, "    gzip_vary on;")?;
        writeln!(out, "    gzip_types {};", cfg.gzip_types)?;
    }
    writeln!(
        out,
        "    log_format upstreaminfo '$remote_addr - [{}] - $remote_user [$time_local] \"$request\" $status $body_bytes_sent \"$http_referer\" \"$http_user_agent\" $request_length $request_time [$proxy_upstream_name] $upstream_addr $upstream_response_length $upstream_response_time $upstream_status';",
        build_forwarded_for(&cfg.forwarded_for_header)
    )?;
    if cfg.disable_access_log {
        writeln!(out, "    access_log off;")?;
    } else {
        writeln!(out, "    access_log {} upstreaminfo;", cfg.access_log_path)?;
    }
    writeln!(out, "    error_log {} {};", cfg.error_log_path, cfg.error_log_level)?;
    writeln!(out)?;
    writeln!(out, "    map $http_upgrade $connection_upgrade {{")?;
    writeln!(out, "        default upgrade;")?;
    writeln!(out, "        ''      close;")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;
    writeln!(out, "    ssl_protocols {};", cfg.ssl_protocols)?;
    if cfg.ssl_session_cache {
        writeln!(out, "    ssl_session_cache builtin:1000 shared:SSL:{};", cfg.ssl_session_cache_size)?;
        writeln!(out, "    ssl_session_timeout {};", cfg.ssl_session_timeout)?;
    }
    writeln!(
        out,
        "    ssl_session_tickets {};",
        if cfg.ssl_session_tickets { "on" } else { "off" }
    )?;
    if let Some(key_file) = &tc.ssl_session_ticket_key_file {
        writeln!(out, "    ssl_session_ticket_key {};", key_file)?;
    }
    writeln!(out, "    ssl_ciphers '{}';", cfg.ssl_ciphers)?;
    writeln!(out, "    ssl_prefer_server_ciphers on;")?;
    if !cfg.http_snippet.is_empty() {
        writeln!(out, "    {}", cfg.http_snippet)?;
    }

    for backend in &tc.backends {
        write_upstream(&mut out, backend)?;
    }

    for server in &tc.servers {
        write_server(&mut out, tc, server)?;
    }

    writeln!(out, "}}")?;
    Ok(out)
}

fn write_upstream(out: &mut String, backend: &Backend) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(out, "    upstream {} {{", backend.name)?;
    if !backend.upstream_hash_by.is_empty() {
        writeln!(out, "        hash {} consistent;", backend.upstream_hash_by)?;
    }
    writeln!(
        out,
        "        server {}:{} max_fails=0 fail_timeout=0;",
        format_ip(&backend.cluster_ip),
        backend.port
    )?;
    writeln!(out, "        keepalive 32;")?;
    writeln!(out, "    }}")
}

fn write_server(out: &mut String, tc: &TemplateConfig, server: &Server) -> std::fmt::Result {
    let is_default = server.hostname == DEFAULT_SERVER_NAME;
    let default_flag = if is_default { " default_server reuseport" } else { "" };
    let ipv6 = tc.is_ipv6_enabled && !tc.cfg.disable_ipv6;

    writeln!(out)?;
    writeln!(out, "    server {{")?;
    if server.alias.is_empty() {
        writeln!(out, "        server_name {};", server.hostname)?;
    } else {
        writeln!(out, "        server_name {} {};", server.hostname, server.alias)?;
    }
    writeln!(out, "        listen {}{};", tc.listen_ports.http, default_flag)?;
    if ipv6 {
        writeln!(out, "        listen [::]:{}{};", tc.listen_ports.http, default_flag)?;
    }
    if server.has_certificate() {
        let http2 = if tc.cfg.use_http2 { " http2" } else { "" };
        writeln!(
            out,
            "        listen {} ssl{}{} backlog={};",
            tc.listen_ports.https, http2, default_flag, tc.backlog_size
        )?;
        if ipv6 {
            writeln!(
                out,
                "        listen [::]:{} ssl{}{};",
                tc.listen_ports.https, http2, default_flag
            )?;
        }
        writeln!(out, "        # PEM sha: {}", server.ssl_pem_checksum)?;
        writeln!(out, "        ssl_certificate {};", server.ssl_certificate)?;
        writeln!(out, "        ssl_certificate_key {};", server.ssl_certificate)?;
        if !server.ssl_full_chain_certificate.is_empty() {
            writeln!(out, "        ssl_trusted_certificate {};", server.ssl_full_chain_certificate)?;
        }
    }

    for location in &server.locations {
        write_location(out, tc, server, location)?;
    }

    if is_default {
        writeln!(out)?;
        writeln!(out, "        location = /healthz {{")?;
        writeln!(out, "            access_log off;")?;
        writeln!(out, "            return 200;")?;
        writeln!(out, "        }}")?;
    }
    writeln!(out, "    }}")
}

fn write_location(
    out: &mut String,
    tc: &TemplateConfig,
    server: &Server,
    location: &Location,
) -> std::fmt::Result {
    let path = build_location(location);
    // A rewritten location is already a regex and takes no second modifier.
    let modifier = if location.location_modifier.is_empty() || path.starts_with('~') {
        String::new()
    } else {
        format!("{} ", location.location_modifier)
    };

    writeln!(out)?;
    writeln!(out, "        location {}{} {{", modifier, path)?;

    if let Some(reason) = &location.denied {
        writeln!(out, "            # Location denied. Reason: {:?}", reason)?;
        writeln!(out, "            return 503;")?;
        return writeln!(out, "        }}");
    }

    let service = location
        .service
        .as_ref()
        .map(|s| format!("{}/{}", s.namespace, s.name))
        .unwrap_or_default();
    writeln!(out, "            set $proxy_upstream_name \"{}\";", location.backend)?;
    writeln!(out, "            set $service_name \"{}\";", service)?;
    writeln!(out, "            set $service_port \"{}\";", location.port)?;
    if !location.auth_type.is_empty() {
        writeln!(out, "            set $auth_type \"{}\";", location.auth_type)?;
    }
    if !location.authz_type.is_empty() {
        writeln!(out, "            set $authz_type \"{}\";", location.authz_type)?;
    }
    if !location.rewrite.app_root.is_empty() && location.path == SLASH {
        writeln!(out, "            if ($uri = /) {{")?;
        writeln!(out, "                return 302 {};", location.rewrite.app_root)?;
        writeln!(out, "            }}")?;
    }
    writeln!(out, "            port_in_redirect off;")?;
    writeln!(out, "            client_max_body_size {};", location.proxy.body_size)?;
    writeln!(out, "            proxy_set_header Host $host;")?;
    writeln!(out, "            proxy_set_header Upgrade $http_upgrade;")?;
    if location.connection.enabled {
        writeln!(out, "            proxy_set_header Connection {};", location.connection.header)?;
    } else {
        writeln!(out, "            proxy_set_header Connection $connection_upgrade;")?;
    }
    writeln!(out, "            proxy_set_header X-Real-IP $remote_addr;")?;
    writeln!(
        out,
        "            proxy_set_header X-Forwarded-For {};",
        build_forwarded_for(&tc.cfg.forwarded_for_header)
    )?;
    writeln!(out, "            proxy_set_header X-Forwarded-Host $host;")?;
    writeln!(out, "            proxy_set_header X-Forwarded-Port $server_port;")?;
    writeln!(out, "            proxy_set_header X-Forwarded-Proto $scheme;")?;
    writeln!(out, "            proxy_set_header Proxy \"\";")?;
    writeln!(out, "            proxy_connect_timeout {}s;", location.proxy.connect_timeout)?;
    writeln!(out, "            proxy_send_timeout {}s;", location.proxy.send_timeout)?;
    writeln!(out, "            proxy_read_timeout {}s;", location.proxy.read_timeout)?;
    writeln!(out, "            proxy_buffering off;")?;
    writeln!(out, "            proxy_buffer_size {};", location.proxy.buffer_size)?;
    writeln!(out, "            proxy_buffers 4 {};", location.proxy.buffer_size)?;
    writeln!(out, "            proxy_http_version 1.1;")?;
    if server.has_certificate() {
        writeln!(out, "            proxy_redirect http:// https://;")?;
    }

    let ssl_verify = build_ssl_verify(&tc.backends, location);
    if !ssl_verify.is_empty() {
        writeln!(out, "            {}", ssl_verify)?;
    }
    let client_ca = build_client_ca_auth(&tc.backends, location);
    if !client_ca.is_empty() {
        writeln!(out, "            {}", client_ca)?;
    }
    if !location.configuration_snippet.is_empty() {
        writeln!(out, "            {}", location.configuration_snippet)?;
    }
    writeln!(out, "            {}", build_proxy_pass(&tc.backends, location))?;
    writeln!(out, "        }}")
}
