use pkg_constants::annotations::LOCATION_MODIFIERS;
use pkg_types::ingress::Ingress;

use crate::error::AnnotationError;
use crate::extractor::AnnotationValue;
use crate::parser::{AnnotationConfig, IngressAnnotation};

const ANNOTATION: &str = "location-modifier";

/// Path match modifier placed before the location path (`~`, `=`, `~*`).
pub struct LocationModifierParser {
    cfg: AnnotationConfig,
}

impl LocationModifierParser {
    pub fn new(cfg: AnnotationConfig) -> Self {
        Self { cfg }
    }
}

impl IngressAnnotation for LocationModifierParser {
    fn parse(&self, ing: &Ingress) -> Result<AnnotationValue, AnnotationError> {
        let value = self.cfg.get_string(ANNOTATION, ing)?;
        if !LOCATION_MODIFIERS.contains(&value.as_str()) {
            return Err(AnnotationError::invalid_content(self.cfg.key(ANNOTATION), value));
        }
        Ok(AnnotationValue::LocationModifier(value))
    }
}
