use clap::Parser;
use pkg_constants::controller::{DEFAULT_SHUTDOWN_GRACE_SECS, MIN_SYNC_PERIOD_SECS};
use pkg_constants::paths::{DEFAULT_CONTROLLER_CONFIG, DEFAULT_MANIFESTS_DIR, DEFAULT_NGINX_CONFIG};
use pkg_controllers::{ControllerConfig, IngressController};
use pkg_proxy::NginxBinary;
use pkg_store::MemoryListers;
use pkg_types::config::{ControllerConfigFile, load_config_file};
use pkg_types::validate::split_key;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod manifests;

use manifests::ManifestSource;

#[derive(Parser, Debug, Default)]
#[command(name = "ingress-controller", about = "Ingress controller driving an nginx proxy")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_CONTROLLER_CONFIG)]
    config: String,

    /// Path of the nginx binary (falls back to NGINX_BINARY)
    #[arg(long)]
    nginx_binary: Option<String>,

    /// Live nginx configuration file
    #[arg(long)]
    config_path: Option<String>,

    /// Directory for pem files extracted from secrets
    #[arg(long)]
    ssl_dir: Option<String>,

    #[arg(long)]
    http_port: Option<u16>,

    #[arg(long)]
    https_port: Option<u16>,

    /// Prefix of the controller's annotations
    #[arg(long)]
    annotations_prefix: Option<String>,

    /// Ingress class handled by this controller
    #[arg(long)]
    ingress_class: Option<String>,

    /// Secret (namespace/name) used by the catch-all server
    #[arg(long)]
    default_ssl_certificate: Option<String>,

    /// Maximum synchronizations per second
    #[arg(long)]
    sync_rate_limit: Option<f64>,

    /// Relist period in seconds (at least 10)
    #[arg(long)]
    sync_period: Option<u64>,

    /// ConfigMap (namespace/name) holding nginx settings
    #[arg(long)]
    configmap: Option<String>,

    /// Only handle Ingresses, Services and Endpoints of this namespace
    #[arg(long)]
    watch_namespace: Option<String>,

    /// Directory of resource manifests
    #[arg(long)]
    manifests_dir: Option<String>,

    /// Seconds to wait after stopping before exiting
    #[arg(long)]
    shutdown_grace_period: Option<u64>,
}

/// Everything the binary needs after merging flags, file and defaults.
#[derive(Debug)]
struct Settings {
    controller: ControllerConfig,
    nginx_binary: Option<String>,
    config_path: PathBuf,
    watch_namespace: Option<String>,
    manifests_dir: PathBuf,
    shutdown_grace: Duration,
}

// Merge: CLI args > config file > defaults
fn merge(cli: Cli, file: ControllerConfigFile) -> anyhow::Result<Settings> {
    let defaults = ControllerConfig::default();

    let sync_period = match cli.sync_period.or(file.sync_period) {
        Some(secs) if secs < MIN_SYNC_PERIOD_SECS => {
            anyhow::bail!(
                "sync-period must be at least {}s (got {}s)",
                MIN_SYNC_PERIOD_SECS,
                secs
            );
        }
        Some(secs) => Duration::from_secs(secs),
        None => defaults.sync_period,
    };

    let sync_rate_limit = cli
        .sync_rate_limit
        .or(file.sync_rate_limit)
        .unwrap_or(defaults.sync_rate_limit);
    if !sync_rate_limit.is_finite() || sync_rate_limit < 0.0 {
        anyhow::bail!("sync-rate-limit must be a non-negative number");
    }

    let mut listen_ports = defaults.listen_ports;
    if let Some(port) = cli.http_port.or(file.http_port) {
        listen_ports.http = port;
    }
    if let Some(port) = cli.https_port.or(file.https_port) {
        listen_ports.https = port;
    }

    let controller = ControllerConfig {
        ssl_dir: cli
            .ssl_dir
            .or(file.ssl_dir)
            .map(PathBuf::from)
            .unwrap_or(defaults.ssl_dir),
        listen_ports,
        annotations_prefix: cli
            .annotations_prefix
            .or(file.annotations_prefix)
            .unwrap_or(defaults.annotations_prefix),
        ingress_class: cli
            .ingress_class
            .or(file.ingress_class)
            .unwrap_or(defaults.ingress_class),
        default_ssl_certificate: cli
            .default_ssl_certificate
            .or(file.default_ssl_certificate)
            .unwrap_or(defaults.default_ssl_certificate),
        sync_rate_limit,
        sync_period,
        configmap: cli.configmap.or(file.configmap).filter(|c| !c.is_empty()),
        ..defaults
    };

    if let Some(key) = &controller.configmap {
        split_key(key).map_err(|e| anyhow::anyhow!("invalid configmap: {}", e))?;
    }
    if !controller.default_ssl_certificate.is_empty() {
        split_key(&controller.default_ssl_certificate)
            .map_err(|e| anyhow::anyhow!("invalid default-ssl-certificate: {}", e))?;
    }

    Ok(Settings {
        controller,
        nginx_binary: cli.nginx_binary.or(file.nginx_binary),
        config_path: PathBuf::from(
            cli.config_path
                .or(file.config_path)
                .unwrap_or_else(|| DEFAULT_NGINX_CONFIG.to_string()),
        ),
        watch_namespace: cli.watch_namespace.or(file.watch_namespace),
        manifests_dir: PathBuf::from(
            cli.manifests_dir
                .or(file.manifests_dir)
                .unwrap_or_else(|| DEFAULT_MANIFESTS_DIR.to_string()),
        ),
        shutdown_grace: Duration::from_secs(
            cli.shutdown_grace_period
                .or(file.shutdown_grace_period)
                .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
        ),
    })
}

async fn wait_for_signal() -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = terminate.recv() => info!("received SIGTERM"),
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("received SIGINT");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    // Load config file (returns defaults if file not found)
    let file_cfg: ControllerConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);
    let settings = merge(cli, file_cfg)?;

    info!("Starting ingress-controller");
    info!("  Ingress class:  {}", settings.controller.ingress_class);
    info!("  Annotations:    {}", settings.controller.annotations_prefix);
    info!(
        "  Listen ports:   http={} https={}",
        settings.controller.listen_ports.http, settings.controller.listen_ports.https
    );
    info!("  Nginx config:   {}", settings.config_path.display());
    info!("  Manifests dir:  {}", settings.manifests_dir.display());
    if let Some(ns) = &settings.watch_namespace {
        info!("  Namespace:      {}", ns);
    }

    let listers = MemoryListers::new();
    let mut source = ManifestSource::new(
        &settings.manifests_dir,
        settings.watch_namespace.clone(),
        listers.clone(),
    );
    // Initial content only fills the listers; the first sync covers it.
    source.scan()?;

    let binary = Arc::new(NginxBinary::resolve(
        settings.nginx_binary.as_deref(),
        &settings.config_path,
    ));
    let controller = Arc::new(IngressController::new(
        settings.controller.clone(),
        listers.listers(),
        binary,
    )?);

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut handles = controller.start().await;
    handles.push(source.start(
        Arc::clone(&controller),
        settings.controller.sync_period,
        stop_rx,
    ));

    wait_for_signal().await?;
    info!("Shutting down ingress controller");
    stop_tx.send_replace(true);

    let code = match controller.stop().await {
        Ok(()) => 0,
        Err(e) => {
            error!("unexpected error shutting down the ingress controller: {}", e);
            1
        }
    };

    info!("Handled quit, awaiting {}s", settings.shutdown_grace.as_secs());
    tokio::time::sleep(settings.shutdown_grace).await;

    for handle in handles {
        handle.abort();
    }
    info!("Exiting with {}", code);
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_file() {
        let cli = Cli {
            http_port: Some(80),
            ingress_class: Some("edge".to_string()),
            ..Default::default()
        };
        let file = ControllerConfigFile {
            http_port: Some(8081),
            https_port: Some(8444),
            ingress_class: Some("internal".to_string()),
            sync_period: Some(30),
            configmap: Some("kube-system/nginx".to_string()),
            ..Default::default()
        };

        let settings = merge(cli, file).unwrap();
        assert_eq!(settings.controller.listen_ports.http, 80);
        assert_eq!(settings.controller.listen_ports.https, 8444);
        assert_eq!(settings.controller.ingress_class, "edge");
        assert_eq!(settings.controller.sync_period, Duration::from_secs(30));
        assert_eq!(
            settings.controller.configmap.as_deref(),
            Some("kube-system/nginx")
        );
    }

    #[test]
    fn test_defaults_apply() {
        let settings = merge(Cli::default(), ControllerConfigFile::default()).unwrap();
        let defaults = ControllerConfig::default();
        assert_eq!(settings.controller.ingress_class, defaults.ingress_class);
        assert_eq!(settings.controller.sync_period, defaults.sync_period);
        assert_eq!(settings.config_path, PathBuf::from(DEFAULT_NGINX_CONFIG));
        assert_eq!(
            settings.shutdown_grace,
            Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS)
        );
        assert!(settings.controller.configmap.is_none());
    }

    #[test]
    fn test_sync_period_lower_bound() {
        let cli = Cli {
            sync_period: Some(5),
            ..Default::default()
        };
        assert!(merge(cli, ControllerConfigFile::default()).is_err());

        let cli = Cli {
            sync_period: Some(MIN_SYNC_PERIOD_SECS),
            ..Default::default()
        };
        assert!(merge(cli, ControllerConfigFile::default()).is_ok());
    }

    #[test]
    fn test_resource_keys_are_validated() {
        let cli = Cli {
            configmap: Some("nginx-config".to_string()),
            ..Default::default()
        };
        assert!(merge(cli, ControllerConfigFile::default()).is_err());

        let cli = Cli {
            default_ssl_certificate: Some("kube-system/Router_Certs".to_string()),
            ..Default::default()
        };
        assert!(merge(cli, ControllerConfigFile::default()).is_err());
    }

    #[test]
    fn test_negative_rate_limit_is_rejected() {
        let cli = Cli {
            sync_rate_limit: Some(-1.0),
            ..Default::default()
        };
        assert!(merge(cli, ControllerConfigFile::default()).is_err());
    }
}
