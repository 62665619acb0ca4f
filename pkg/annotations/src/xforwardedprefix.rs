use pkg_types::ingress::Ingress;

use crate::error::AnnotationError;
use crate::extractor::AnnotationValue;
use crate::parser::{AnnotationConfig, IngressAnnotation};

/// Whether to send `X-Forwarded-Prefix` with the matched path.
pub struct XForwardedPrefixParser {
    cfg: AnnotationConfig,
}

impl XForwardedPrefixParser {
    pub fn new(cfg: AnnotationConfig) -> Self {
        Self { cfg }
    }
}

impl IngressAnnotation for XForwardedPrefixParser {
    fn parse(&self, ing: &Ingress) -> Result<AnnotationValue, AnnotationError> {
        self.cfg
            .get_bool("x-forwarded-prefix", ing)
            .map(AnnotationValue::XForwardedPrefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{config, make_ingress};

    #[test]
    fn test_parse() {
        let parser = XForwardedPrefixParser::new(config());
        assert_eq!(
            parser.parse(&make_ingress(&[("x-forwarded-prefix", "true")])),
            Ok(AnnotationValue::XForwardedPrefix(true))
        );
        assert!(matches!(
            parser.parse(&make_ingress(&[("x-forwarded-prefix", "maybe")])),
            Err(AnnotationError::InvalidContent { .. })
        ));
    }
}
