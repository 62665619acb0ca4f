use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Certificate material extracted from a secret and written to disk.
///
/// Keyed by secret identity (`namespace/name`) in the certificate store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslCert {
    /// Path of the pem file holding certificate and key.
    pub pem_file_name: String,
    /// Path of the pem file holding the full chain, when it differs.
    pub full_chain_pem_file_name: String,
    /// Path of the CA bundle, if the secret carried one.
    pub ca_file_name: String,
    /// SHA-256 of the pem file content, hex encoded.
    pub pem_sha: String,
    /// `notAfter` of the leaf certificate.
    pub expire_time: Option<DateTime<Utc>>,
    /// Common name and DNS subject alternative names of the leaf.
    pub hostnames: Vec<String>,
}

impl SslCert {
    /// Whether the leaf certificate covers `host`, honouring single-label wildcards.
    pub fn matches_hostname(&self, host: &str) -> bool {
        self.hostnames.iter().any(|name| {
            if name.eq_ignore_ascii_case(host) {
                return true;
            }
            match name.strip_prefix("*.") {
                Some(suffix) => host
                    .split_once('.')
                    .is_some_and(|(_, rest)| rest.eq_ignore_ascii_case(suffix)),
                None => false,
            }
        })
    }
}

/// Reference to a certificate used to authenticate against or verify an upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSslCert {
    /// Secret identity (`namespace/name`).
    pub secret: String,
    pub ca_file_name: String,
    pub pem_file_name: String,
    pub pem_sha: String,
}

impl AuthSslCert {
    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_single_label() {
        let cert = SslCert {
            hostnames: vec!["*.example.com".to_string(), "example.org".to_string()],
            ..Default::default()
        };
        assert!(cert.matches_hostname("a.example.com"));
        assert!(cert.matches_hostname("EXAMPLE.org"));
        assert!(!cert.matches_hostname("a.b.example.com"));
        assert!(!cert.matches_hostname("example.com"));
    }
}
