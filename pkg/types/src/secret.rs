use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key holding the PEM certificate chain.
pub const TLS_CERT_KEY: &str = "tls.crt";
/// Key holding the PEM private key.
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";
/// Key holding a PEM CA bundle.
pub const CA_CERT_KEY: &str = "ca.crt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub resource_version: String,
    /// Secret data stored as base64-encoded values.
    #[serde(default)]
    pub data: HashMap<String, String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

crate::impl_resource!(Secret);
