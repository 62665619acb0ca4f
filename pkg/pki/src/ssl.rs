//! Secret to pem file conversion.

use anyhow::{Context, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use rcgen::{CertificateParams, DnType, DnValue, SanType};
use sha2::{Digest, Sha256};
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

use pkg_types::secret::{CA_CERT_KEY, Secret, TLS_CERT_KEY, TLS_PRIVATE_KEY_KEY};
use pkg_types::ssl::SslCert;

/// Hex-encoded SHA-256 of pem content.
pub fn pem_checksum(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Write `content` to `<dir>/<name>.pem`, returning the path and its checksum.
pub(crate) fn write_pem_file(
    dir: &Path,
    name: &str,
    content: &str,
) -> anyhow::Result<(String, String)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating ssl directory {}", dir.display()))?;
    let path = dir.join(format!("{}.pem", name));
    std::fs::write(&path, content)
        .with_context(|| format!("writing pem file {}", path.display()))?;
    Ok((
        path.to_string_lossy().into_owned(),
        pem_checksum(content.as_bytes()),
    ))
}

fn decode_entry(secret: &Secret, key: &str) -> anyhow::Result<Option<String>> {
    let Some(encoded) = secret.data.get(key) else {
        return Ok(None);
    };
    let raw = STANDARD
        .decode(encoded.trim())
        .with_context(|| format!("secret {}/{}: invalid base64 in {}", secret.namespace, secret.name, key))?;
    let text = String::from_utf8(raw)
        .with_context(|| format!("secret {}/{}: {} is not valid UTF-8", secret.namespace, secret.name, key))?;
    Ok(Some(text))
}

fn count_certificates(pem: &str) -> anyhow::Result<usize> {
    let mut reader = BufReader::new(pem.as_bytes());
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    Ok(certs.len())
}

fn dn_text(value: &DnValue) -> Option<String> {
    match value {
        DnValue::Utf8String(s) => Some(s.clone()),
        DnValue::PrintableString(s) => Some(s.as_str().to_string()),
        DnValue::Ia5String(s) => Some(s.as_str().to_string()),
        _ => None,
    }
}

/// Expiry and names (common name first, then DNS SANs) of the leaf certificate.
fn leaf_metadata(pem: &str) -> anyhow::Result<(Option<DateTime<Utc>>, Vec<String>)> {
    let params = CertificateParams::from_ca_cert_pem(pem).context("parsing leaf certificate")?;

    let mut hostnames = Vec::new();
    if let Some(cn) = params
        .distinguished_name
        .get(&DnType::CommonName)
        .and_then(dn_text)
    {
        hostnames.push(cn);
    }
    for san in &params.subject_alt_names {
        if let SanType::DnsName(name) = san {
            let name = name.as_str().to_string();
            if !hostnames.contains(&name) {
                hostnames.push(name);
            }
        }
    }

    let expire_time = DateTime::from_timestamp(params.not_after.unix_timestamp(), 0);
    Ok((expire_time, hostnames))
}

/// Extract the certificate material of a secret into pem files under `ssl_dir`.
///
/// A secret carrying `tls.crt` and `tls.key` yields `<ns>-<name>.pem` holding
/// the chain followed by the key. A `ca.crt` entry is written alongside as
/// `<ns>-<name>-ca.pem`. A secret with only `ca.crt` is treated as a CA bundle
/// used for upstream verification.
pub fn write_secret_certificate(ssl_dir: &Path, secret: &Secret) -> anyhow::Result<SslCert> {
    let base_name = format!("{}-{}", secret.namespace, secret.name);
    let cert = decode_entry(secret, TLS_CERT_KEY)?;
    let key = decode_entry(secret, TLS_PRIVATE_KEY_KEY)?;
    let ca = decode_entry(secret, CA_CERT_KEY)?;

    let mut ssl_cert = SslCert::default();

    if let Some(ca) = &ca {
        if count_certificates(ca)? == 0 {
            bail!("secret {}/{}: {} contains no certificate", secret.namespace, secret.name, CA_CERT_KEY);
        }
        let (path, sha) = write_pem_file(ssl_dir, &format!("{}-ca", base_name), ca)?;
        ssl_cert.ca_file_name = path;
        ssl_cert.pem_sha = sha;
    }

    match (cert, key) {
        (Some(cert), Some(key)) => {
            let chain_len = count_certificates(&cert)?;
            if chain_len == 0 {
                bail!("secret {}/{}: {} contains no certificate", secret.namespace, secret.name, TLS_CERT_KEY);
            }
            let mut key_reader = BufReader::new(key.as_bytes());
            if rustls_pemfile::private_key(&mut key_reader)?.is_none() {
                bail!("secret {}/{}: {} contains no private key", secret.namespace, secret.name, TLS_PRIVATE_KEY_KEY);
            }

            let (expire_time, hostnames) = leaf_metadata(&cert)?;
            let mut content = cert;
            if !content.ends_with('\n') {
                content.push('\n');
            }
            content.push_str(&key);

            let (path, sha) = write_pem_file(ssl_dir, &base_name, &content)?;
            if chain_len > 1 {
                ssl_cert.full_chain_pem_file_name = path.clone();
            }
            ssl_cert.pem_file_name = path;
            ssl_cert.pem_sha = sha;
            ssl_cert.expire_time = expire_time;
            ssl_cert.hostnames = hostnames;
            info!(
                "wrote certificate for secret {}/{} ({} certificate(s) in chain)",
                secret.namespace, secret.name, chain_len
            );
        }
        (None, None) if ca.is_some() => {
            ssl_cert.pem_file_name = ssl_cert.ca_file_name.clone();
            debug!("secret {}/{} only carries a CA bundle", secret.namespace, secret.name);
        }
        (Some(_), None) | (None, Some(_)) => {
            bail!(
                "secret {}/{} must contain both {} and {}",
                secret.namespace, secret.name, TLS_CERT_KEY, TLS_PRIVATE_KEY_KEY
            );
        }
        (None, None) => {
            bail!(
                "secret {}/{} contains neither {} nor {}",
                secret.namespace, secret.name, TLS_CERT_KEY, CA_CERT_KEY
            );
        }
    }

    Ok(ssl_cert)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::KeyPair;
    use std::collections::HashMap;

    fn make_keypair_pem(host: &str) -> (String, String) {
        let mut params = CertificateParams::new(vec![host.to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, host);
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    fn make_secret(data: &[(&str, &str)]) -> Secret {
        Secret {
            name: "tls".to_string(),
            namespace: "default".to_string(),
            resource_version: "1".to_string(),
            data: data
                .iter()
                .map(|(k, v)| (k.to_string(), STANDARD.encode(v)))
                .collect::<HashMap<_, _>>(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_write_tls_secret() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = make_keypair_pem("a.example.com");
        let secret = make_secret(&[(TLS_CERT_KEY, &cert), (TLS_PRIVATE_KEY_KEY, &key)]);

        let ssl = write_secret_certificate(dir.path(), &secret).unwrap();
        assert!(ssl.pem_file_name.ends_with("default-tls.pem"));
        assert!(ssl.full_chain_pem_file_name.is_empty());
        assert!(ssl.ca_file_name.is_empty());
        assert!(ssl.expire_time.is_some());
        assert!(ssl.matches_hostname("a.example.com"));

        let written = std::fs::read_to_string(&ssl.pem_file_name).unwrap();
        assert!(written.starts_with(&cert));
        assert!(written.ends_with(&key));
        assert_eq!(ssl.pem_sha, pem_checksum(written.as_bytes()));
    }

    #[test]
    fn test_checksum_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let (cert1, key1) = make_keypair_pem("a.example.com");
        let (cert2, key2) = make_keypair_pem("a.example.com");

        let first = write_secret_certificate(
            dir.path(),
            &make_secret(&[(TLS_CERT_KEY, &cert1), (TLS_PRIVATE_KEY_KEY, &key1)]),
        )
        .unwrap();
        let again = write_secret_certificate(
            dir.path(),
            &make_secret(&[(TLS_CERT_KEY, &cert1), (TLS_PRIVATE_KEY_KEY, &key1)]),
        )
        .unwrap();
        let second = write_secret_certificate(
            dir.path(),
            &make_secret(&[(TLS_CERT_KEY, &cert2), (TLS_PRIVATE_KEY_KEY, &key2)]),
        )
        .unwrap();

        assert_eq!(first.pem_sha, again.pem_sha);
        assert_ne!(first.pem_sha, second.pem_sha);
    }

    #[test]
    fn test_ca_only_secret() {
        let dir = tempfile::tempdir().unwrap();
        let (ca, _) = make_keypair_pem("ca.example.com");
        let secret = make_secret(&[(CA_CERT_KEY, &ca)]);

        let ssl = write_secret_certificate(dir.path(), &secret).unwrap();
        assert!(ssl.ca_file_name.ends_with("default-tls-ca.pem"));
        assert_eq!(ssl.pem_file_name, ssl.ca_file_name);
        assert!(!ssl.pem_sha.is_empty());
    }

    #[test]
    fn test_missing_key_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, _) = make_keypair_pem("a.example.com");
        let secret = make_secret(&[(TLS_CERT_KEY, &cert)]);
        assert!(write_secret_certificate(dir.path(), &secret).is_err());
    }

    #[test]
    fn test_empty_secret_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let secret = make_secret(&[]);
        let err = write_secret_certificate(dir.path(), &secret).unwrap_err();
        assert!(err.to_string().contains("contains neither"));
    }

    #[test]
    fn test_invalid_base64_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut secret = make_secret(&[]);
        secret
            .data
            .insert(TLS_CERT_KEY.to_string(), "!!not-base64!!".to_string());
        assert!(write_secret_certificate(dir.path(), &secret).is_err());
    }
}
