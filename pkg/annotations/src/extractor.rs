use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, trace};

use pkg_types::directives::{ConnectionConfig, ProxyConfig, RewriteConfig, SecureUpstreamConfig};
use pkg_types::ingress::Ingress;

use crate::auth::AuthParser;
use crate::authz::AuthzParser;
use crate::connection::ConnectionParser;
use crate::error::AnnotationError;
use crate::locationmodifier::LocationModifierParser;
use crate::parser::{AnnotationConfig, IngressAnnotation};
use crate::proxy::ProxyParser;
use crate::resolver::Resolver;
use crate::rewrite::RewriteParser;
use crate::secureupstream::SecureUpstreamParser;
use crate::serveralias::ServerAliasParser;
use crate::snippet::SnippetParser;
use crate::upstreamhashby::UpstreamHashByParser;
use crate::upstreamuri::UpstreamUriParser;
use crate::xforwardedprefix::XForwardedPrefixParser;

/// A successfully parsed directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationValue {
    AuthType(String),
    AuthzType(String),
    ConfigurationSnippet(String),
    SecureUpstream(SecureUpstreamConfig),
    Rewrite(RewriteConfig),
    UpstreamHashBy(String),
    XForwardedPrefix(bool),
    LocationModifier(String),
    UpstreamUri(String),
    Proxy(ProxyConfig),
    Connection(ConnectionConfig),
    ServerAlias(String),
}

/// Typed directives extracted from one Ingress.
///
/// Fields whose parser did not produce a value keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressAnnotations {
    pub namespace: String,
    pub name: String,
    pub auth_type: String,
    pub authz_type: String,
    pub configuration_snippet: String,
    pub location_modifier: String,
    pub upstream_hash_by: String,
    pub upstream_uri: String,
    pub server_alias: String,
    pub rewrite: RewriteConfig,
    pub secure_upstream: SecureUpstreamConfig,
    pub x_forwarded_prefix: bool,
    pub proxy: ProxyConfig,
    pub connection: ConnectionConfig,
    /// First denial encountered while extracting.
    pub denied: Option<String>,
}

impl IngressAnnotations {
    /// Assemble a bundle from the parse results, in registry order.
    ///
    /// Absent directives are skipped. The first failure is stored as the
    /// denial; later ones are only logged.
    pub fn build<'a>(
        ing: &Ingress,
        results: impl IntoIterator<Item = (&'a str, Result<AnnotationValue, AnnotationError>)>,
    ) -> Self {
        let mut bundle = IngressAnnotations {
            namespace: ing.namespace.clone(),
            name: ing.name.clone(),
            ..Default::default()
        };

        for (name, result) in results {
            match result {
                Ok(value) => {
                    trace!(
                        "annotation {} in ingress {}/{}: {:?}",
                        name, ing.namespace, ing.name, value
                    );
                    bundle.set(value);
                }
                Err(AnnotationError::Missing) => {}
                Err(e) if bundle.denied.is_none() => {
                    error!(
                        "error reading {} annotation in ingress {}/{}: {}",
                        name, ing.namespace, ing.name, e
                    );
                    bundle.denied = Some(e.to_string());
                }
                Err(e) => {
                    debug!(
                        "error reading {} annotation in ingress {}/{}: {}",
                        name, ing.namespace, ing.name, e
                    );
                }
            }
        }

        bundle
    }

    fn set(&mut self, value: AnnotationValue) {
        match value {
            AnnotationValue::AuthType(v) => self.auth_type = v,
            AnnotationValue::AuthzType(v) => self.authz_type = v,
            AnnotationValue::ConfigurationSnippet(v) => self.configuration_snippet = v,
            AnnotationValue::SecureUpstream(v) => self.secure_upstream = v,
            AnnotationValue::Rewrite(v) => self.rewrite = v,
            AnnotationValue::UpstreamHashBy(v) => self.upstream_hash_by = v,
            AnnotationValue::XForwardedPrefix(v) => self.x_forwarded_prefix = v,
            AnnotationValue::LocationModifier(v) => self.location_modifier = v,
            AnnotationValue::UpstreamUri(v) => self.upstream_uri = v,
            AnnotationValue::Proxy(v) => self.proxy = v,
            AnnotationValue::Connection(v) => self.connection = v,
            AnnotationValue::ServerAlias(v) => self.server_alias = v,
        }
    }
}

/// Registry of directive parsers, evaluated in a fixed order.
pub struct Extractor {
    parsers: Vec<(&'static str, Box<dyn IngressAnnotation>)>,
}

impl Extractor {
    pub fn new(cfg: AnnotationConfig, resolver: Arc<dyn Resolver>) -> Self {
        let parsers: Vec<(&'static str, Box<dyn IngressAnnotation>)> = vec![
            ("AuthType", Box::new(AuthParser::new(cfg.clone()))),
            ("AuthzType", Box::new(AuthzParser::new(cfg.clone()))),
            ("ConfigurationSnippet", Box::new(SnippetParser::new(cfg.clone()))),
            (
                "SecureUpstream",
                Box::new(SecureUpstreamParser::new(cfg.clone(), resolver)),
            ),
            ("Rewrite", Box::new(RewriteParser::new(cfg.clone()))),
            ("UpstreamHashBy", Box::new(UpstreamHashByParser::new(cfg.clone()))),
            ("XForwardedPrefix", Box::new(XForwardedPrefixParser::new(cfg.clone()))),
            ("LocationModifier", Box::new(LocationModifierParser::new(cfg.clone()))),
            ("UpstreamURI", Box::new(UpstreamUriParser::new(cfg.clone()))),
            ("Proxy", Box::new(ProxyParser::new(cfg.clone()))),
            ("Connection", Box::new(ConnectionParser::new(cfg.clone()))),
            ("ServerAlias", Box::new(ServerAliasParser::new(cfg))),
        ];
        Self { parsers }
    }

    /// Run every registered parser against `ing`.
    pub fn extract(&self, ing: &Ingress) -> IngressAnnotations {
        let results = self
            .parsers
            .iter()
            .map(|(name, parser)| (*name, parser.parse(ing)));
        IngressAnnotations::build(ing, results)
    }
}
