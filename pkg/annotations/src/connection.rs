use pkg_types::directives::ConnectionConfig;
use pkg_types::ingress::Ingress;

use crate::error::AnnotationError;
use crate::extractor::AnnotationValue;
use crate::parser::{AnnotationConfig, IngressAnnotation};

/// Override of the `Connection` header sent to the upstream.
pub struct ConnectionParser {
    cfg: AnnotationConfig,
}

impl ConnectionParser {
    pub fn new(cfg: AnnotationConfig) -> Self {
        Self { cfg }
    }
}

impl IngressAnnotation for ConnectionParser {
    fn parse(&self, ing: &Ingress) -> Result<AnnotationValue, AnnotationError> {
        let header = self.cfg.get_string("connection-proxy-header", ing)?;
        Ok(AnnotationValue::Connection(ConnectionConfig {
            header,
            enabled: true,
        }))
    }
}
