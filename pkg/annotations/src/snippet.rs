use pkg_types::ingress::Ingress;

use crate::error::AnnotationError;
use crate::extractor::AnnotationValue;
use crate::parser::{AnnotationConfig, IngressAnnotation};

/// Free-text configuration appended verbatim to each location.
pub struct SnippetParser {
    cfg: AnnotationConfig,
}

impl SnippetParser {
    pub fn new(cfg: AnnotationConfig) -> Self {
        Self { cfg }
    }
}

impl IngressAnnotation for SnippetParser {
    fn parse(&self, ing: &Ingress) -> Result<AnnotationValue, AnnotationError> {
        self.cfg
            .get_string("configuration-snippet", ing)
            .map(AnnotationValue::ConfigurationSnippet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{config, make_ingress};

    #[test]
    fn test_parse() {
        let parser = SnippetParser::new(config());
        let snippet = "more_set_headers \"Request-Id: $req_id\";";
        let ing = make_ingress(&[("configuration-snippet", snippet)]);
        assert_eq!(
            parser.parse(&ing),
            Ok(AnnotationValue::ConfigurationSnippet(snippet.to_string()))
        );
        assert_eq!(parser.parse(&make_ingress(&[])), Err(AnnotationError::Missing));
    }
}
