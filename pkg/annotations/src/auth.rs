use pkg_constants::annotations::{AUTH_ACCESS_TOKEN, AUTH_ID_TOKEN};
use pkg_types::ingress::Ingress;

use crate::error::AnnotationError;
use crate::extractor::AnnotationValue;
use crate::parser::{AnnotationConfig, IngressAnnotation};

const ANNOTATION: &str = "auth-type";

/// Token validation mode applied in front of a location.
pub struct AuthParser {
    cfg: AnnotationConfig,
}

impl AuthParser {
    pub fn new(cfg: AnnotationConfig) -> Self {
        Self { cfg }
    }
}

impl IngressAnnotation for AuthParser {
    fn parse(&self, ing: &Ingress) -> Result<AnnotationValue, AnnotationError> {
        let value = self.cfg.get_string(ANNOTATION, ing)?;
        if value != AUTH_ID_TOKEN && value != AUTH_ACCESS_TOKEN {
            return Err(AnnotationError::invalid_content(self.cfg.key(ANNOTATION), value));
        }
        Ok(AnnotationValue::AuthType(value))
    }
}
