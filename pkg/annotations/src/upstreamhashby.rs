use pkg_types::ingress::Ingress;

use crate::error::AnnotationError;
use crate::extractor::AnnotationValue;
use crate::parser::{AnnotationConfig, IngressAnnotation};

/// Consistent-hash key for the upstream (e.g. `$request_uri`).
pub struct UpstreamHashByParser {
    cfg: AnnotationConfig,
}

impl UpstreamHashByParser {
    pub fn new(cfg: AnnotationConfig) -> Self {
        Self { cfg }
    }
}

impl IngressAnnotation for UpstreamHashByParser {
    fn parse(&self, ing: &Ingress) -> Result<AnnotationValue, AnnotationError> {
        self.cfg
            .get_string("upstream-hash-by", ing)
            .map(AnnotationValue::UpstreamHashBy)
    }
}
