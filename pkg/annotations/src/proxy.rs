use tracing::warn;

use pkg_types::directives::ProxyConfig;
use pkg_types::ingress::Ingress;

use crate::error::AnnotationError;
use crate::extractor::AnnotationValue;
use crate::parser::{AnnotationConfig, IngressAnnotation};

/// Proxy timeouts and buffer sizes. Always yields a value; anything absent
/// or unparseable falls back to the defaults.
pub struct ProxyParser {
    cfg: AnnotationConfig,
}

impl ProxyParser {
    pub fn new(cfg: AnnotationConfig) -> Self {
        Self { cfg }
    }

    fn timeout(&self, name: &str, ing: &Ingress, default: u32) -> u32 {
        match self.cfg.get_int(name, ing) {
            Ok(v) => v,
            Err(AnnotationError::Missing) => default,
            Err(e) => {
                warn!(
                    "ingress {}/{}: {}, using default {}",
                    ing.namespace, ing.name, e, default
                );
                default
            }
        }
    }

    fn size(&self, name: &str, ing: &Ingress, default: &str) -> String {
        match self.cfg.get_string(name, ing) {
            Ok(v) if !v.is_empty() => v,
            _ => default.to_string(),
        }
    }
}

impl IngressAnnotation for ProxyParser {
    fn parse(&self, ing: &Ingress) -> Result<AnnotationValue, AnnotationError> {
        let defaults = ProxyConfig::default();
        Ok(AnnotationValue::Proxy(ProxyConfig {
            connect_timeout: self.timeout("proxy-connect-timeout", ing, defaults.connect_timeout),
            send_timeout: self.timeout("proxy-send-timeout", ing, defaults.send_timeout),
            read_timeout: self.timeout("proxy-read-timeout", ing, defaults.read_timeout),
            buffer_size: self.size("proxy-buffer-size", ing, &defaults.buffer_size),
            body_size: self.size("proxy-body-size", ing, &defaults.body_size),
        }))
    }
}
