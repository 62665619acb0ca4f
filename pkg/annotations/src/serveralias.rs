use pkg_types::ingress::Ingress;

use crate::error::AnnotationError;
use crate::extractor::AnnotationValue;
use crate::parser::{AnnotationConfig, IngressAnnotation};

/// Additional server name for the hosts of the Ingress.
pub struct ServerAliasParser {
    cfg: AnnotationConfig,
}

impl ServerAliasParser {
    pub fn new(cfg: AnnotationConfig) -> Self {
        Self { cfg }
    }
}

impl IngressAnnotation for ServerAliasParser {
    fn parse(&self, ing: &Ingress) -> Result<AnnotationValue, AnnotationError> {
        self.cfg
            .get_string("server-alias", ing)
            .map(AnnotationValue::ServerAlias)
    }
}
