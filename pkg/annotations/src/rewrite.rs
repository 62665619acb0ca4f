use tracing::warn;

use pkg_types::directives::RewriteConfig;
use pkg_types::ingress::Ingress;

use crate::error::AnnotationError;
use crate::extractor::AnnotationValue;
use crate::parser::{AnnotationConfig, IngressAnnotation};

/// Rewrite target, base tag injection and application root.
pub struct RewriteParser {
    cfg: AnnotationConfig,
}

impl RewriteParser {
    pub fn new(cfg: AnnotationConfig) -> Self {
        Self { cfg }
    }
}

impl IngressAnnotation for RewriteParser {
    fn parse(&self, ing: &Ingress) -> Result<AnnotationValue, AnnotationError> {
        let add_base_url = match self.cfg.get_bool("add-base-url", ing) {
            Ok(v) => v,
            Err(AnnotationError::Missing) => false,
            Err(e) => {
                warn!("ingress {}/{}: {}", ing.namespace, ing.name, e);
                false
            }
        };

        Ok(AnnotationValue::Rewrite(RewriteConfig {
            target: self.cfg.get_string("rewrite-target", ing).unwrap_or_default(),
            add_base_url,
            base_url_scheme: self.cfg.get_string("base-url-scheme", ing).unwrap_or_default(),
            app_root: self.cfg.get_string("app-root", ing).unwrap_or_default(),
        }))
    }
}
