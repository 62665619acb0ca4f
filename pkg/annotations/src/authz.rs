use pkg_constants::annotations::AUTHZ_RBAC;
use pkg_types::ingress::Ingress;

use crate::error::AnnotationError;
use crate::extractor::AnnotationValue;
use crate::parser::{AnnotationConfig, IngressAnnotation};

const ANNOTATION: &str = "authz-type";

/// Authorization mode. Only `rbac` is supported.
pub struct AuthzParser {
    cfg: AnnotationConfig,
}

impl AuthzParser {
    pub fn new(cfg: AnnotationConfig) -> Self {
        Self { cfg }
    }
}

impl IngressAnnotation for AuthzParser {
    fn parse(&self, ing: &Ingress) -> Result<AnnotationValue, AnnotationError> {
        let value = self.cfg.get_string(ANNOTATION, ing)?;
        if value != AUTHZ_RBAC {
            return Err(AnnotationError::invalid_content(self.cfg.key(ANNOTATION), value));
        }
        Ok(AnnotationValue::AuthzType(value))
    }
}
