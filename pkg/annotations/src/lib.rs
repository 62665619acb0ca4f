//! Extraction of typed routing directives from Ingress annotations.
//!
//! Each directive is parsed by an independent [`IngressAnnotation`]
//! implementation registered in the [`Extractor`]. The extractor owns the
//! cross-cutting policy: prefix convention, skipping absent annotations and
//! capturing the first denial.

pub mod auth;
pub mod authz;
pub mod class;
pub mod connection;
pub mod error;
pub mod extractor;
pub mod locationmodifier;
pub mod parser;
pub mod proxy;
pub mod resolver;
pub mod rewrite;
pub mod secureupstream;
pub mod serveralias;
pub mod snippet;
pub mod upstreamhashby;
pub mod upstreamuri;
pub mod xforwardedprefix;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::AnnotationError;
pub use extractor::{AnnotationValue, Extractor, IngressAnnotations};
pub use parser::{AnnotationConfig, IngressAnnotation};
pub use resolver::Resolver;
