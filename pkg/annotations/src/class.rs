use tracing::debug;

use pkg_constants::annotations::{DEFAULT_INGRESS_CLASS, INGRESS_CLASS_KEY};
use pkg_types::ingress::Ingress;

/// Which Ingresses this controller handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressClass {
    /// Configured class. Empty accepts only unset and default-class Ingresses.
    pub class: String,
}

impl Default for IngressClass {
    fn default() -> Self {
        Self {
            class: DEFAULT_INGRESS_CLASS.to_string(),
        }
    }
}

impl IngressClass {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
        }
    }

    /// An Ingress passes when its class annotation is unset, empty, or
    /// names the configured or the default class.
    pub fn is_valid(&self, ing: &Ingress) -> bool {
        match ing.annotations.get(INGRESS_CLASS_KEY) {
            None => {
                debug!(
                    "annotation {} is not present in ingress {}/{}",
                    INGRESS_CLASS_KEY, ing.namespace, ing.name
                );
                true
            }
            Some(class) => {
                class.is_empty() || *class == self.class || class == DEFAULT_INGRESS_CLASS
            }
        }
    }
}
