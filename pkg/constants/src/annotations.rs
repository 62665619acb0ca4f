//! Annotation and ingress class constants.

/// Default prefix of the routing annotations (`<prefix>/<directive>`).
pub const DEFAULT_ANNOTATIONS_PREFIX: &str = "ingress.open-cluster-management.io";

/// Annotation selecting which controller handles an Ingress.
pub const INGRESS_CLASS_KEY: &str = "kubernetes.io/ingress.class";

/// Class accepted in addition to the configured one.
pub const DEFAULT_INGRESS_CLASS: &str = "ingress-open-cluster-management";

/// Annotation naming a secret with a client CA; synced ahead of use.
pub const AUTH_TLS_SECRET: &str = "auth-tls-secret";

/// Auth type: validate an ID token.
pub const AUTH_ID_TOKEN: &str = "id-token";

/// Auth type: validate an access token.
pub const AUTH_ACCESS_TOKEN: &str = "access-token";

/// The only supported authorization mode.
pub const AUTHZ_RBAC: &str = "rbac";

/// Location modifiers accepted by `location-modifier`.
pub const LOCATION_MODIFIERS: &[&str] = &["~", "=", "~*"];
