use thiserror::Error;

/// Outcome of a directive parser that did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnnotationError {
    /// The annotation is absent. Not an error for the resource.
    #[error("ingress rule without annotations")]
    Missing,

    #[error("invalid annotation name")]
    InvalidName,

    #[error("the annotation {name} does not contain a valid value ({value})")]
    InvalidContent { name: String, value: String },

    #[error("location denied, reason: {reason}")]
    LocationDenied { reason: String },
}

impl AnnotationError {
    pub fn invalid_content(name: impl Into<String>, value: impl Into<String>) -> Self {
        AnnotationError::InvalidContent {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        AnnotationError::LocationDenied {
            reason: reason.into(),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, AnnotationError::Missing)
    }
}
