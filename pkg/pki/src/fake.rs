use rcgen::{CertificateParams, DnType, IsCa, KeyPair, SanType};
use std::path::Path;
use tracing::info;

use pkg_types::ssl::SslCert;

use crate::ssl::write_pem_file;

const FAKE_COMMON_NAME: &str = "Kubernetes Ingress Controller Fake Certificate";
const FAKE_ORGANIZATION: &str = "Acme Co";
const FAKE_HOSTNAME: &str = "ingress.local";

/// Generate a self-signed certificate and write it to `<ssl_dir>/<name>.pem`.
///
/// Used for the catch-all server when no default certificate secret exists,
/// so that the HTTPS listener always has something to present.
pub fn generate_fake_certificate(ssl_dir: &Path, name: &str) -> anyhow::Result<SslCert> {
    info!("Generating self-signed fallback certificate {}", name);

    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, FAKE_COMMON_NAME);
    params
        .distinguished_name
        .push(DnType::OrganizationName, FAKE_ORGANIZATION);
    params.is_ca = IsCa::NoCa;
    params
        .subject_alt_names
        .push(SanType::DnsName(FAKE_HOSTNAME.try_into()?));

    let key_pair = KeyPair::generate()?;
    let expire_time = chrono::DateTime::from_timestamp(params.not_after.unix_timestamp(), 0);
    let cert = params.self_signed(&key_pair)?;

    let content = format!("{}{}", cert.pem(), key_pair.serialize_pem());
    let (path, sha) = write_pem_file(ssl_dir, name, &content)?;

    Ok(SslCert {
        pem_file_name: path,
        pem_sha: sha,
        expire_time,
        hostnames: vec![FAKE_HOSTNAME.to_string()],
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_fake_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let cert = generate_fake_certificate(dir.path(), "default-fake-certificate").unwrap();

        assert!(cert.pem_file_name.ends_with("default-fake-certificate.pem"));
        assert_eq!(cert.pem_sha.len(), 64);
        assert!(cert.matches_hostname("ingress.local"));
        assert!(cert.expire_time.is_some_and(|t| t > chrono::Utc::now()));

        let content = std::fs::read_to_string(&cert.pem_file_name).unwrap();
        assert!(content.contains("BEGIN CERTIFICATE"));
        assert!(content.contains("PRIVATE KEY"));
        assert_eq!(cert.pem_sha, crate::ssl::pem_checksum(content.as_bytes()));
    }
}
