use std::sync::Arc;

use pkg_types::directives::SecureUpstreamConfig;
use pkg_types::ingress::Ingress;
use pkg_types::ssl::AuthSslCert;

use crate::error::AnnotationError;
use crate::extractor::AnnotationValue;
use crate::parser::{AnnotationConfig, IngressAnnotation};
use crate::resolver::Resolver;

/// TLS towards the upstream, with optional CA verification and client CA.
///
/// Referenced secrets are resolved through the [`Resolver`]; a failed
/// lookup denies the locations of the Ingress.
pub struct SecureUpstreamParser {
    cfg: AnnotationConfig,
    resolver: Arc<dyn Resolver>,
}

impl SecureUpstreamParser {
    pub fn new(cfg: AnnotationConfig, resolver: Arc<dyn Resolver>) -> Self {
        Self { cfg, resolver }
    }

    fn resolve(&self, ing: &Ingress, secret: &str, what: &str) -> Result<AuthSslCert, AnnotationError> {
        let key = format!("{}/{}", ing.namespace, secret);
        self.resolver
            .get_auth_certificate(&key)
            .map_err(|e| AnnotationError::denied(format!("error obtaining {}: {}", what, e)))
    }
}

impl IngressAnnotation for SecureUpstreamParser {
    fn parse(&self, ing: &Ingress) -> Result<AnnotationValue, AnnotationError> {
        let secure = self.cfg.get_bool("secure-backends", ing).unwrap_or(false);
        let ca = self
            .cfg
            .get_string("secure-verify-ca-secret", ing)
            .unwrap_or_default();
        let client_ca = self
            .cfg
            .get_string("secure-client-ca-secret", ing)
            .unwrap_or_default();

        if !secure && !ca.is_empty() {
            return Err(AnnotationError::denied(format!(
                "trying to use CA from secret {}/{} on a non secure backend",
                ing.namespace, ca
            )));
        }
        if !secure && !client_ca.is_empty() {
            return Err(AnnotationError::denied(format!(
                "trying to use Client CA from secret {}/{} on a non secure backend",
                ing.namespace, client_ca
            )));
        }

        let mut config = SecureUpstreamConfig {
            secure,
            ..Default::default()
        };
        if !ca.is_empty() {
            config.ca_cert = self.resolve(ing, &ca, "certificate")?;
        }
        if !client_ca.is_empty() {
            config.client_ca_cert = self.resolve(ing, &client_ca, "client certificate")?;
        }
        Ok(AnnotationValue::SecureUpstream(config))
    }
}
