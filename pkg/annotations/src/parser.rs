use pkg_constants::annotations::DEFAULT_ANNOTATIONS_PREFIX;
use pkg_types::ingress::Ingress;

use crate::error::AnnotationError;
use crate::extractor::AnnotationValue;

/// A parser for one routing directive.
pub trait IngressAnnotation: Send + Sync {
    fn parse(&self, ing: &Ingress) -> Result<AnnotationValue, AnnotationError>;
}

/// Annotation naming convention, threaded through every parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationConfig {
    pub prefix: String,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_ANNOTATIONS_PREFIX.to_string(),
        }
    }
}

impl AnnotationConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Full annotation key for a directive: `<prefix>/<suffix>`.
    pub fn key(&self, suffix: &str) -> String {
        format!("{}/{}", self.prefix, suffix)
    }

    fn lookup<'a>(&self, name: &str, ing: &'a Ingress) -> Result<(String, &'a str), AnnotationError> {
        if ing.annotations.is_empty() {
            return Err(AnnotationError::Missing);
        }
        if name.is_empty() {
            return Err(AnnotationError::InvalidName);
        }
        let key = self.key(name);
        match ing.annotations.get(&key) {
            Some(value) => Ok((key, value.as_str())),
            None => Err(AnnotationError::Missing),
        }
    }

    pub fn get_string(&self, name: &str, ing: &Ingress) -> Result<String, AnnotationError> {
        self.lookup(name, ing).map(|(_, v)| v.to_string())
    }

    pub fn get_bool(&self, name: &str, ing: &Ingress) -> Result<bool, AnnotationError> {
        let (key, value) = self.lookup(name, ing)?;
        parse_bool(value).ok_or_else(|| AnnotationError::invalid_content(key, value))
    }

    pub fn get_int(&self, name: &str, ing: &Ingress) -> Result<u32, AnnotationError> {
        let (key, value) = self.lookup(name, ing)?;
        value
            .trim()
            .parse::<u32>()
            .map_err(|_| AnnotationError::invalid_content(key, value))
    }
}

/// Accepts the usual spellings of a boolean (`1`, `t`, `TRUE`, `false`, ...).
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_ingress;

    #[test]
    fn test_key_uses_prefix() {
        let cfg = AnnotationConfig::new("example.com");
        assert_eq!(cfg.key("auth-type"), "example.com/auth-type");
    }

    #[test]
    fn test_get_string() {
        let cfg = AnnotationConfig::default();
        let ing = make_ingress(&[("upstream-uri", "/api")]);
        assert_eq!(cfg.get_string("upstream-uri", &ing).unwrap(), "/api");
        assert_eq!(
            cfg.get_string("rewrite-target", &ing),
            Err(AnnotationError::Missing)
        );
        assert_eq!(cfg.get_string("", &ing), Err(AnnotationError::InvalidName));
    }

    #[test]
    fn test_no_annotations_is_missing() {
        let cfg = AnnotationConfig::default();
        let ing = make_ingress(&[]);
        assert_eq!(cfg.get_string("", &ing), Err(AnnotationError::Missing));
        assert_eq!(cfg.get_bool("add-base-url", &ing), Err(AnnotationError::Missing));
    }

    #[test]
    fn test_get_bool() {
        let cfg = AnnotationConfig::default();
        let ing = make_ingress(&[("x-forwarded-prefix", "True"), ("add-base-url", "yes")]);
        assert_eq!(cfg.get_bool("x-forwarded-prefix", &ing), Ok(true));
        assert!(matches!(
            cfg.get_bool("add-base-url", &ing),
            Err(AnnotationError::InvalidContent { .. })
        ));
    }

    #[test]
    fn test_get_int() {
        let cfg = AnnotationConfig::default();
        let ing = make_ingress(&[("proxy-read-timeout", "30"), ("proxy-send-timeout", "-1")]);
        assert_eq!(cfg.get_int("proxy-read-timeout", &ing), Ok(30));
        assert!(matches!(
            cfg.get_int("proxy-send-timeout", &ing),
            Err(AnnotationError::InvalidContent { .. })
        ));
    }

    #[test]
    fn test_other_prefix_is_ignored() {
        let cfg = AnnotationConfig::new("other.io");
        let ing = make_ingress(&[("upstream-uri", "/api")]);
        assert_eq!(cfg.get_string("upstream-uri", &ing), Err(AnnotationError::Missing));
    }
}
