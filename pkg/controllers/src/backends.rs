//! Construction of the canonical backend/server model from Ingresses.
//!
//! Synthesis is pure: the same Ingresses, annotations, services and
//! certificates always produce the same [`Configuration`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use pkg_annotations::IngressAnnotations;
use pkg_annotations::class::IngressClass;
use pkg_constants::annotations::AUTH_ID_TOKEN;
use pkg_constants::controller::{
    DEFAULT_SERVER_NAME, KUBERNETES_LOCATION, KUBERNETES_SERVICE, KUBERNETES_UPSTREAM_NAME,
    ROOT_LOCATION,
};
use pkg_constants::network::KUBERNETES_API_PORT;
use pkg_store::Lister;
use pkg_types::directives::{ProxyConfig, RewriteConfig};
use pkg_types::ingress::{Ingress, IngressBackend, ServicePort};
use pkg_types::meta::Resource;
use pkg_types::model::{Backend, Configuration, Location, Server, ServiceRef};
use pkg_types::service::Service;
use pkg_types::ssl::SslCert;

/// Everything synthesis reads.
pub struct SynthesisInput<'a> {
    pub ingresses: &'a [Arc<Ingress>],
    pub services: &'a dyn Lister<Service>,
    /// Certificate store snapshot keyed by `namespace/secret`.
    pub certificates: &'a HashMap<String, SslCert>,
    pub default_certificate: Option<&'a SslCert>,
    pub class: &'a IngressClass,
}

/// Order resource versions numerically when both parse, otherwise as strings.
pub fn compare_resource_versions(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Ingresses handled by this controller, oldest resource version first.
pub fn select_ingresses(ingresses: &[Arc<Ingress>], class: &IngressClass) -> Vec<Arc<Ingress>> {
    let mut selected: Vec<Arc<Ingress>> = ingresses
        .iter()
        .filter(|ing| class.is_valid(ing))
        .cloned()
        .collect();
    selected.sort_by(|a, b| {
        compare_resource_versions(&a.resource_version, &b.resource_version)
            .then_with(|| a.key().cmp(&b.key()))
    });
    selected
}

/// Build the canonical configuration.
///
/// `annotations` returns the extracted directives of an Ingress; it is
/// called once per Ingress and phase and must be deterministic.
pub fn synthesize(
    input: &SynthesisInput<'_>,
    annotations: &dyn Fn(&Ingress) -> Arc<IngressAnnotations>,
) -> Configuration {
    let ingresses = select_ingresses(input.ingresses, input.class);
    let bundles: Vec<(Arc<Ingress>, Arc<IngressAnnotations>)> = ingresses
        .into_iter()
        .map(|ing| {
            let anns = annotations(ing.as_ref());
            (ing, anns)
        })
        .collect();

    let backends = create_backends(&bundles, input.services);
    let mut servers = create_servers(&bundles, &backends, input);

    for (ing, anns) in &bundles {
        for rule in &ing.spec.rules {
            let host = host_or_default(&rule.host);
            let Some(http) = &rule.http else {
                debug!(
                    "ingress rule {}/{} for host {} has no HTTP rules",
                    ing.namespace, ing.name, host
                );
                continue;
            };
            let Some(server) = servers.get_mut(host) else {
                continue;
            };

            for path in &http.paths {
                let name = path.backend.upstream_name(&ing.namespace);
                let Some(backend) = backends.get(&name) else {
                    continue;
                };
                let location_path = if path.path.is_empty() {
                    ROOT_LOCATION
                } else {
                    path.path.as_str()
                };
                upsert_location(server, location_path, backend, ing, anns);
            }
        }
    }

    finalize(backends, servers)
}

fn host_or_default(host: &str) -> &str {
    if host.is_empty() {
        DEFAULT_SERVER_NAME
    } else {
        host
    }
}

fn kubernetes_backend(services: &dyn Lister<Service>) -> Backend {
    let mut backend = Backend::new(KUBERNETES_UPSTREAM_NAME);
    backend.port = ServicePort::Number(KUBERNETES_API_PORT);
    backend.secure = true;

    match services.get_by_key(KUBERNETES_SERVICE) {
        Some(svc) => match svc.cluster_address() {
            Some(ip) => {
                backend.cluster_ip = ip.to_string();
                backend.service = Some(service_ref(&svc, ip));
            }
            None => warn!("service {} has no cluster address", KUBERNETES_SERVICE),
        },
        None => warn!("service {} does not exist", KUBERNETES_SERVICE),
    }
    backend
}

fn service_ref(svc: &Service, cluster_ip: &str) -> ServiceRef {
    ServiceRef {
        namespace: svc.namespace.clone(),
        name: svc.name.clone(),
        cluster_ip: cluster_ip.to_string(),
    }
}

/// Fill only the fields earlier Ingresses left unset.
fn merge_backend(backend: &mut Backend, anns: &IngressAnnotations) {
    if !backend.secure {
        backend.secure = anns.secure_upstream.secure;
    }
    if backend.secure_ca_cert.secret.is_empty() {
        backend.secure_ca_cert = anns.secure_upstream.ca_cert.clone();
    }
    if backend.client_ca_cert.secret.is_empty() {
        backend.client_ca_cert = anns.secure_upstream.client_ca_cert.clone();
    }
    if backend.upstream_hash_by.is_empty() {
        backend.upstream_hash_by = anns.upstream_hash_by.clone();
    }
}

fn resolve_backend(
    backend: &mut Backend,
    namespace: &str,
    target: &IngressBackend,
    services: &dyn Lister<Service>,
) {
    if backend.is_resolved() {
        return;
    }
    let key = format!("{}/{}", namespace, target.service_name);
    let Some(svc) = services.get_by_key(&key) else {
        warn!("error obtaining service {}: not found", key);
        return;
    };
    let Some(ip) = svc.cluster_address() else {
        warn!("service {} has no cluster address", key);
        return;
    };
    let Some(port) = svc.resolve_port(&target.service_port) else {
        warn!("service {} has no port named {}", key, target.service_port);
        return;
    };
    backend.cluster_ip = ip.to_string();
    backend.port = ServicePort::Number(port);
    backend.service = Some(service_ref(&svc, ip));
}

fn create_backends(
    bundles: &[(Arc<Ingress>, Arc<IngressAnnotations>)],
    services: &dyn Lister<Service>,
) -> BTreeMap<String, Backend> {
    let mut backends = BTreeMap::new();
    backends.insert(
        KUBERNETES_UPSTREAM_NAME.to_string(),
        kubernetes_backend(services),
    );

    for (ing, anns) in bundles {
        let targets = ing.spec.default_backend.iter().chain(
            ing.spec
                .rules
                .iter()
                .filter_map(|r| r.http.as_ref())
                .flat_map(|http| http.paths.iter().map(|p| &p.backend)),
        );
        for target in targets {
            let name = target.upstream_name(&ing.namespace);
            let backend = backends.entry(name.clone()).or_insert_with(|| {
                debug!("creating upstream {}", name);
                let mut backend = Backend::new(name);
                backend.port = target.service_port.clone();
                backend
            });
            merge_backend(backend, anns);
            resolve_backend(backend, &ing.namespace, target, services);
        }
    }

    backends
}

fn make_location(
    path: &str,
    backend: &Backend,
    ing: &Ingress,
    anns: &IngressAnnotations,
) -> Location {
    Location {
        path: path.to_string(),
        backend: backend.name.clone(),
        service: backend.service.clone(),
        port: backend.port.clone(),
        ingress: Some(ing.key()),
        denied: anns.denied.clone(),
        auth_type: anns.auth_type.clone(),
        authz_type: anns.authz_type.clone(),
        configuration_snippet: anns.configuration_snippet.clone(),
        location_modifier: anns.location_modifier.clone(),
        upstream_uri: anns.upstream_uri.clone(),
        rewrite: anns.rewrite.clone(),
        proxy: anns.proxy.clone(),
        x_forwarded_prefix: anns.x_forwarded_prefix,
        connection: anns.connection.clone(),
    }
}

/// Replace the location at `path` or append a new one. Unresolved backends
/// never produce or change a location.
fn upsert_location(
    server: &mut Server,
    path: &str,
    backend: &Backend,
    ing: &Ingress,
    anns: &IngressAnnotations,
) {
    if !backend.is_resolved() {
        debug!(
            "skipping location {} of ingress {}/{}: upstream {} has no address",
            path, ing.namespace, ing.name, backend.name
        );
        return;
    }
    let location = make_location(path, backend, ing, anns);
    match server.locations.iter_mut().find(|l| l.path == path) {
        Some(existing) => {
            debug!(
                "replacing ingress rule {}/{} location {} upstream {} ({})",
                ing.namespace, ing.name, path, backend.name, existing.backend
            );
            *existing = location;
        }
        None => {
            debug!(
                "adding location {} in ingress rule {}/{} upstream {}",
                path, ing.namespace, ing.name, backend.name
            );
            server.locations.push(location);
        }
    }
}

fn set_certificate(server: &mut Server, cert: &SslCert) {
    server.ssl_certificate = cert.pem_file_name.clone();
    server.ssl_full_chain_certificate = cert.full_chain_pem_file_name.clone();
    server.ssl_pem_checksum = cert.pem_sha.clone();
    server.ssl_expire_time = cert.expire_time;
}

fn default_server(kubernetes: Option<&Backend>, default_certificate: Option<&SslCert>) -> Server {
    let mut server = Server {
        hostname: DEFAULT_SERVER_NAME.to_string(),
        ..Default::default()
    };
    if let Some(cert) = default_certificate {
        set_certificate(&mut server, cert);
    }
    if let Some(kubernetes) = kubernetes.filter(|b| b.is_resolved()) {
        server.locations.push(Location {
            path: KUBERNETES_LOCATION.to_string(),
            backend: kubernetes.name.clone(),
            service: kubernetes.service.clone(),
            port: kubernetes.port.clone(),
            auth_type: AUTH_ID_TOKEN.to_string(),
            rewrite: RewriteConfig {
                target: ROOT_LOCATION.to_string(),
                ..Default::default()
            },
            proxy: ProxyConfig::default(),
            ..Default::default()
        });
    }
    server
}

fn create_servers(
    bundles: &[(Arc<Ingress>, Arc<IngressAnnotations>)],
    backends: &BTreeMap<String, Backend>,
    input: &SynthesisInput<'_>,
) -> BTreeMap<String, Server> {
    let mut servers = BTreeMap::new();
    servers.insert(
        DEFAULT_SERVER_NAME.to_string(),
        default_server(
            backends.get(KUBERNETES_UPSTREAM_NAME),
            input.default_certificate,
        ),
    );

    for (ing, anns) in bundles {
        let default_backend = ing
            .spec
            .default_backend
            .as_ref()
            .and_then(|b| backends.get(&b.upstream_name(&ing.namespace)));

        // An Ingress with only a default backend defines the catch-all route.
        if ing.spec.rules.is_empty() {
            if let (Some(backend), Some(server)) =
                (default_backend, servers.get_mut(DEFAULT_SERVER_NAME))
            {
                upsert_location(server, ROOT_LOCATION, backend, ing, anns);
            }
        }

        for rule in &ing.spec.rules {
            let host = host_or_default(&rule.host);
            if servers.contains_key(host) {
                continue;
            }
            let mut server = Server {
                hostname: host.to_string(),
                ..Default::default()
            };
            if let Some(backend) = default_backend {
                upsert_location(&mut server, ROOT_LOCATION, backend, ing, anns);
            }
            servers.insert(host.to_string(), server);
        }
    }

    for (ing, anns) in bundles {
        for rule in &ing.spec.rules {
            let host = host_or_default(&rule.host);
            let Some(server) = servers.get_mut(host) else {
                continue;
            };

            if server.alias.is_empty() && host != DEFAULT_SERVER_NAME {
                server.alias = anns.server_alias.clone();
            }

            if server.has_certificate() {
                continue;
            }
            let Some(tls) = ing.spec.tls.iter().find(|t| t.hosts.iter().any(|h| h == host))
            else {
                continue;
            };

            if tls.secret_name.is_empty() {
                debug!(
                    "host {} is listed on tls section but secret name is empty, using default certificate",
                    host
                );
                if let Some(cert) = input.default_certificate {
                    set_certificate(server, cert);
                }
                continue;
            }

            let key = format!("{}/{}", ing.namespace, tls.secret_name);
            match input.certificates.get(&key) {
                Some(cert) => {
                    if !cert.matches_hostname(host) {
                        warn!(
                            "ssl certificate {} does not contain a common name or subject alternative name for host {}",
                            key, host
                        );
                    }
                    set_certificate(server, cert);
                }
                None => warn!("ssl certificate \"{}\" does not exist in local store", key),
            }
        }
    }

    servers
}

fn finalize(backends: BTreeMap<String, Backend>, servers: BTreeMap<String, Server>) -> Configuration {
    let backends: Vec<Backend> = backends
        .into_values()
        .filter(|b| b.is_resolved())
        .collect();
    let names: HashSet<String> = backends.iter().map(|b| b.name.clone()).collect();

    let servers = servers
        .into_values()
        .map(|mut server| {
            server
                .locations
                .retain(|l| names.contains(&l.backend));
            server.locations.sort_by(|a, b| b.path.cmp(&a.path));
            server
        })
        .collect();

    Configuration { backends, servers }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use pkg_annotations::resolver::Resolver;
    use pkg_annotations::{AnnotationConfig, Extractor, IngressAnnotations};
    use pkg_store::MemoryLister;
    use pkg_types::ingress::{
        Ingress, IngressBackend, IngressHTTP, IngressPath, IngressRule, IngressSpec, IngressTLS,
        PathType, ServicePort,
    };
    use pkg_types::secret::Secret;
    use pkg_types::service::{Service, ServicePort as SvcPort, ServiceSpec};
    use pkg_types::ssl::AuthSslCert;

    pub fn backend(service: &str, port: u16) -> IngressBackend {
        IngressBackend {
            service_name: service.to_string(),
            service_port: ServicePort::Number(port),
        }
    }

    pub fn make_ingress(name: &str, version: &str) -> Ingress {
        Ingress {
            name: name.to_string(),
            namespace: "default".to_string(),
            resource_version: version.to_string(),
            annotations: BTreeMap::new(),
            spec: IngressSpec::default(),
            created_at: chrono::Utc::now(),
        }
    }

    pub fn with_rule(mut ing: Ingress, host: &str, path: &str, target: IngressBackend) -> Ingress {
        ing.spec.rules.push(IngressRule {
            host: host.to_string(),
            http: Some(IngressHTTP {
                paths: vec![IngressPath {
                    path: path.to_string(),
                    path_type: PathType::Prefix,
                    backend: target,
                }],
            }),
        });
        ing
    }

    pub fn with_tls(mut ing: Ingress, hosts: &[&str], secret: &str) -> Ingress {
        ing.spec.tls.push(IngressTLS {
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            secret_name: secret.to_string(),
        });
        ing
    }

    pub fn with_annotation(mut ing: Ingress, directive: &str, value: &str) -> Ingress {
        ing.annotations
            .insert(AnnotationConfig::default().key(directive), value.to_string());
        ing
    }

    pub fn make_service(name: &str, cluster_ip: Option<&str>, ports: &[(&str, u16)]) -> Service {
        Service {
            name: name.to_string(),
            namespace: "default".to_string(),
            resource_version: "1".to_string(),
            spec: ServiceSpec {
                ports: ports
                    .iter()
                    .map(|(n, p)| SvcPort {
                        name: n.to_string(),
                        port: *p,
                        target_port: *p,
                    })
                    .collect(),
                ..Default::default()
            },
            cluster_ip: cluster_ip.map(str::to_string),
            created_at: chrono::Utc::now(),
        }
    }

    pub fn services(items: Vec<Service>) -> MemoryLister<Service> {
        let lister = MemoryLister::new();
        for item in items {
            lister.upsert(item);
        }
        lister
    }

    /// Resolves every secret to a placeholder certificate.
    pub struct StaticResolver;

    impl Resolver for StaticResolver {
        fn get_auth_certificate(&self, name: &str) -> anyhow::Result<AuthSslCert> {
            Ok(AuthSslCert {
                secret: name.to_string(),
                ca_file_name: format!("/ssl/{}-ca.pem", name.replace('/', "-")),
                pem_file_name: format!("/ssl/{}.pem", name.replace('/', "-")),
                pem_sha: "sha".to_string(),
            })
        }

        fn get_secret(&self, name: &str) -> anyhow::Result<Arc<Secret>> {
            anyhow::bail!("secret {} not found", name)
        }

        fn get_service(&self, name: &str) -> anyhow::Result<Arc<Service>> {
            anyhow::bail!("service {} not found", name)
        }
    }

    pub fn extractor() -> Extractor {
        Extractor::new(AnnotationConfig::default(), Arc::new(StaticResolver))
    }

    pub fn extract(ing: &Ingress) -> Arc<IngressAnnotations> {
        Arc::new(extractor().extract(ing))
    }
}
