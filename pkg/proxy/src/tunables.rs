//! Host-derived values the template depends on.

use nix::sys::resource::{Resource, getrlimit};
use std::net::IpAddr;
use std::path::Path;
use tracing::{debug, error};

use pkg_constants::network::{DEFAULT_BACKLOG_SIZE, MIN_SOMAXCONN, RESERVED_OPEN_FILES};
use pkg_constants::paths::SOMAXCONN_PATH;

const RESOLV_CONF: &str = "/etc/resolv.conf";
const IF_INET6: &str = "/proc/net/if_inet6";

/// Hard limit of `RLIMIT_NOFILE`, or 0 if it cannot be read.
pub fn rlimit_max_num_files() -> u64 {
    match getrlimit(Resource::RLIMIT_NOFILE) {
        Ok((_, hard)) => {
            debug!("rlimit.max={}", hard);
            hard
        }
        Err(e) => {
            error!(
                "error reading system maximum number of open file descriptors (RLIMIT_NOFILE): {}",
                e
            );
            0
        }
    }
}

/// Open files allowed per worker, leaving room for the master.
/// Never below [`RESERVED_OPEN_FILES`].
pub fn max_open_files(rlimit: u64, worker_processes: &str) -> u64 {
    let workers = worker_processes
        .parse::<u64>()
        .ok()
        .filter(|w| *w > 0)
        .unwrap_or(1);
    (rlimit / workers)
        .saturating_sub(RESERVED_OPEN_FILES)
        .max(RESERVED_OPEN_FILES)
}

/// Listen backlog from `net.core.somaxconn`, falling back to the system default
/// when the value is unreadable or too low.
pub fn sysctl_somaxconn() -> u32 {
    somaxconn_from(Path::new(SOMAXCONN_PATH))
}

fn somaxconn_from(path: &Path) -> u32 {
    let value = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok());
    match value {
        Some(v) if v >= MIN_SOMAXCONN => v,
        other => {
            debug!("system net.core.somaxconn={:?} (using system default)", other);
            DEFAULT_BACKLOG_SIZE
        }
    }
}

/// Nameservers listed in `/etc/resolv.conf`.
pub fn system_resolvers() -> Vec<IpAddr> {
    std::fs::read_to_string(RESOLV_CONF)
        .map(|content| parse_resolv_conf(&content))
        .unwrap_or_default()
}

pub fn parse_resolv_conf(content: &str) -> Vec<IpAddr> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match fields.next() {
                Some("nameserver") => fields.next()?.parse::<IpAddr>().ok(),
                _ => None,
            }
        })
        .collect()
}

pub fn is_ipv6_enabled() -> bool {
    Path::new(IF_INET6).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_open_files() {
        assert_eq!(max_open_files(1_048_576, "4"), 261_120);
        assert_eq!(max_open_files(1_048_576, "auto"), 1_047_552);
        assert_eq!(max_open_files(4096, "8"), 1024);
        assert_eq!(max_open_files(0, "1"), 1024);
    }

    #[test]
    fn test_parse_resolv_conf() {
        let content = "# generated\nsearch svc.cluster.local\nnameserver 10.0.0.10\nnameserver 2001:db8::1\nnameserver bogus\noptions ndots:5\n";
        let resolvers = parse_resolv_conf(content);
        assert_eq!(
            resolvers,
            vec![
                "10.0.0.10".parse::<IpAddr>().unwrap(),
                "2001:db8::1".parse::<IpAddr>().unwrap()
            ]
        );
    }

    #[test]
    fn test_somaxconn_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("somaxconn");

        assert_eq!(somaxconn_from(&path), DEFAULT_BACKLOG_SIZE);

        std::fs::write(&path, "128\n").unwrap();
        assert_eq!(somaxconn_from(&path), DEFAULT_BACKLOG_SIZE);

        std::fs::write(&path, "4096\n").unwrap();
        assert_eq!(somaxconn_from(&path), 4096);
    }
}
