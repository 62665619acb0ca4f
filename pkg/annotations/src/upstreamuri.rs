use pkg_types::ingress::Ingress;

use crate::error::AnnotationError;
use crate::extractor::AnnotationValue;
use crate::parser::{AnnotationConfig, IngressAnnotation};

/// URI appended to `proxy_pass` in place of the request URI.
pub struct UpstreamUriParser {
    cfg: AnnotationConfig,
}

impl UpstreamUriParser {
    pub fn new(cfg: AnnotationConfig) -> Self {
        Self { cfg }
    }
}

impl IngressAnnotation for UpstreamUriParser {
    fn parse(&self, ing: &Ingress) -> Result<AnnotationValue, AnnotationError> {
        self.cfg
            .get_string("upstream-uri", ing)
            .map(AnnotationValue::UpstreamUri)
    }
}
