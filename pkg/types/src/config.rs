use serde::{Deserialize, Serialize};

/// Controller configuration file (YAML).
///
/// Every field is optional; CLI flags take precedence and built-in
/// defaults fill the rest.
///
/// Example `config.yaml`:
/// ```yaml
/// nginx-binary: /usr/sbin/nginx
/// http-port: 8080
/// https-port: 8443
/// ingress-class: ingress-open-cluster-management
/// default-ssl-certificate: kube-system/router-certs
/// sync-rate-limit: 0.3
/// sync-period: 600
/// configmap: kube-system/management-ingress
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfigFile {
    #[serde(default, alias = "nginx-binary")]
    pub nginx_binary: Option<String>,
    #[serde(default, alias = "config-path")]
    pub config_path: Option<String>,
    #[serde(default, alias = "ssl-dir")]
    pub ssl_dir: Option<String>,
    #[serde(default, alias = "http-port")]
    pub http_port: Option<u16>,
    #[serde(default, alias = "https-port")]
    pub https_port: Option<u16>,
    #[serde(default, alias = "annotations-prefix")]
    pub annotations_prefix: Option<String>,
    #[serde(default, alias = "ingress-class")]
    pub ingress_class: Option<String>,
    #[serde(default, alias = "default-ssl-certificate")]
    pub default_ssl_certificate: Option<String>,
    #[serde(default, alias = "sync-rate-limit")]
    pub sync_rate_limit: Option<f64>,
    /// Relist period in seconds.
    #[serde(default, alias = "sync-period")]
    pub sync_period: Option<u64>,
    #[serde(default)]
    pub configmap: Option<String>,
    #[serde(default, alias = "watch-namespace")]
    pub watch_namespace: Option<String>,
    #[serde(default, alias = "manifests-dir")]
    pub manifests_dir: Option<String>,
    /// Seconds to wait after stopping before exiting.
    #[serde(default, alias = "shutdown-grace-period")]
    pub shutdown_grace_period: Option<u64>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(anyhow::anyhow!("failed to read config file {}: {}", path, e)),
    };
    let config: T = serde_yaml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("invalid config file {}: {}", path, e))?;
    Ok(config)
}
