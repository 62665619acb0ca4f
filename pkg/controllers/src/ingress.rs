//! The ingress controller: turns listed resources into proxy configuration
//! and keeps the proxy process running.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Level, debug, enabled, error, info, warn};

use pkg_annotations::class::IngressClass;
use pkg_annotations::{AnnotationConfig, Extractor, IngressAnnotations, Resolver};
use pkg_constants::controller::FAKE_CERTIFICATE_NAME;
use pkg_proxy::{
    ConfigRenderer, NginxConfig, ProcessSupervisor, ProxyBinary, ProxyError, TemplateConfig,
    read_config, tunables, write_session_ticket_key,
};
use pkg_store::{CertificateStore, StoreListers, VersionedCache};
use pkg_types::configmap::ConfigMap;
use pkg_types::ingress::Ingress;
use pkg_types::meta::Resource;
use pkg_types::model::Configuration;
use pkg_types::ssl::SslCert;

use crate::backends::{SynthesisInput, synthesize};
use crate::config::ControllerConfig;
use crate::queue::{QueueKey, SyncHandler, TaskQueue};
use crate::resolver::StoreResolver;
use crate::secrets::SecretSync;

#[derive(Debug, Error)]
pub enum StopError {
    #[error("shutdown already in progress")]
    AlreadyStopping,

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

pub struct IngressController {
    cfg: ControllerConfig,
    listers: StoreListers,
    secrets: Arc<SecretSync>,
    resolver: Arc<dyn Resolver>,
    extractor: Extractor,
    annotation_cache: VersionedCache<IngressAnnotations>,
    class: IngressClass,
    renderer: ConfigRenderer,
    supervisor: Arc<ProcessSupervisor>,
    queue: Arc<TaskQueue>,
    running_config: Mutex<Option<Configuration>>,
    force_reload: AtomicBool,
    nginx_config: RwLock<NginxConfig>,
    fake_certificate: Option<SslCert>,
    resolvers: Vec<IpAddr>,
    is_ipv6_enabled: bool,
    stopping: AtomicBool,
    stop_tx: watch::Sender<bool>,
}

impl IngressController {
    pub fn new(
        cfg: ControllerConfig,
        listers: StoreListers,
        binary: Arc<dyn ProxyBinary>,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&cfg.ssl_dir)?;

        let annotations = AnnotationConfig::new(cfg.annotations_prefix.clone());
        let secrets = Arc::new(SecretSync::new(
            Arc::clone(&listers.secret),
            CertificateStore::new(),
            cfg.ssl_dir.clone(),
            annotations.clone(),
        ));
        let resolver: Arc<dyn Resolver> =
            Arc::new(StoreResolver::new(Arc::clone(&secrets), listers.clone()));
        let extractor = Extractor::new(annotations, Arc::clone(&resolver));

        let fake_certificate =
            match pkg_pki::generate_fake_certificate(&cfg.ssl_dir, FAKE_CERTIFICATE_NAME) {
                Ok(cert) => Some(cert),
                Err(e) => {
                    warn!("unable to generate the default certificate: {:#}", e);
                    None
                }
            };

        let (stop_tx, _) = watch::channel(false);

        let controller = Self {
            class: IngressClass::new(cfg.ingress_class.clone()),
            renderer: ConfigRenderer::new(Arc::clone(&binary)),
            supervisor: Arc::new(ProcessSupervisor::new(binary, cfg.listen_ports.http)),
            queue: Arc::new(TaskQueue::new(cfg.sync_rate_limit)),
            listers,
            secrets,
            resolver,
            extractor,
            annotation_cache: VersionedCache::new(),
            running_config: Mutex::new(None),
            force_reload: AtomicBool::new(false),
            nginx_config: RwLock::new(NginxConfig::default()),
            fake_certificate,
            resolvers: tunables::system_resolvers(),
            is_ipv6_enabled: tunables::is_ipv6_enabled(),
            stopping: AtomicBool::new(false),
            stop_tx,
            cfg,
        };

        if let Some(key) = controller.cfg.configmap.clone() {
            if let Some(cm) = controller.listers.configmap.get_by_key(&key) {
                controller.set_config(&cm);
            }
        }

        Ok(controller)
    }

    /// Lookups for annotation parsers and status publishers.
    pub fn resolver(&self) -> Arc<dyn Resolver> {
        Arc::clone(&self.resolver)
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn secrets(&self) -> &SecretSync {
        &self.secrets
    }

    pub fn class(&self) -> &IngressClass {
        &self.class
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.cfg
    }

    pub fn listers(&self) -> &StoreListers {
        &self.listers
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    /// The last successfully applied configuration.
    pub fn running_config(&self) -> Option<Configuration> {
        self.running_config.lock().ok().and_then(|c| c.clone())
    }

    pub fn is_force_reload(&self) -> bool {
        self.force_reload.load(Ordering::SeqCst)
    }

    pub fn set_force_reload(&self, reload: bool) {
        self.force_reload.store(reload, Ordering::SeqCst);
    }

    pub fn nginx_config(&self) -> NginxConfig {
        self.nginx_config
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Replace the proxy settings with the content of a ConfigMap.
    pub fn set_config(&self, cm: &ConfigMap) {
        self.apply_config_data(&cm.data);
    }

    fn apply_config_data(&self, data: &HashMap<String, String>) {
        let cfg = read_config(data);
        if !cfg.ssl_session_ticket_key.is_empty() {
            write_session_ticket_key(&cfg.ssl_session_ticket_key, &self.cfg.session_ticket_key_path);
        }
        if let Ok(mut current) = self.nginx_config.write() {
            *current = cfg;
        }
    }

    /// Extracted annotations, recomputed only when the Ingress changed.
    pub fn ingress_annotations(&self, ing: &Ingress) -> Arc<IngressAnnotations> {
        self.annotation_cache
            .get_or_insert_with(&ing.key(), &ing.resource_version, || {
                self.extractor.extract(ing)
            })
    }

    pub(crate) fn forget_annotations(&self, key: &str) {
        self.annotation_cache.remove(key);
    }

    /// Drop every cached bundle, e.g. after a referenced certificate changed.
    pub(crate) fn clear_annotations(&self) {
        self.annotation_cache.clear();
    }

    /// Configured default certificate, or the generated one.
    fn default_certificate(&self) -> Option<SslCert> {
        let key = self.cfg.default_ssl_certificate.as_str();
        if !key.is_empty() {
            let store = self.secrets.certificates();
            if !store.contains(key) && self.listers.secret.get_by_key(key).is_some() {
                self.secrets.sync_secret(key);
            }
            if let Some(cert) = store.get(key) {
                return Some(cert);
            }
        }
        self.fake_certificate.clone()
    }

    /// Build the canonical configuration from the current listers.
    pub fn build_configuration(&self) -> Configuration {
        let ingresses = self.listers.ingress.list();
        let certificates = self.secrets.certificates().snapshot();
        let default_certificate = self.default_certificate();
        let input = SynthesisInput {
            ingresses: &ingresses,
            services: self.listers.service.as_ref(),
            certificates: &certificates,
            default_certificate: default_certificate.as_ref(),
            class: &self.class,
        };
        synthesize(&input, &|ing| self.ingress_annotations(ing))
    }

    fn template_config(&self, pcfg: &Configuration) -> TemplateConfig {
        let cfg = self.nginx_config();

        let max_open_files =
            tunables::max_open_files(tunables::rlimit_max_num_files(), &cfg.worker_processes);
        debug!("maximum number of open file descriptors: {}", max_open_files);

        let ssl_session_ticket_key_file = (!cfg.ssl_session_ticket_key.is_empty()
            && self.cfg.session_ticket_key_path.exists())
        .then(|| self.cfg.session_ticket_key_path.display().to_string());

        TemplateConfig {
            max_open_files,
            backlog_size: tunables::sysctl_somaxconn(),
            backends: pcfg.backends.clone(),
            servers: pcfg.servers.clone(),
            is_ipv6_enabled: self.is_ipv6_enabled && !cfg.disable_ipv6,
            resolvers: self.resolvers.clone(),
            listen_ports: self.cfg.listen_ports,
            ssl_session_ticket_key_file,
            cfg,
        }
    }

    /// Render and validate `pcfg`, returning the configuration text.
    async fn render_checked(&self, pcfg: &Configuration) -> Result<String, ProxyError> {
        let text = self.renderer.render(&self.template_config(pcfg))?;
        self.renderer.validate(&text).await?;

        if enabled!(Level::DEBUG) {
            match self.renderer.diff(&text).await {
                Ok(Some(diff)) => debug!("NGINX configuration diff:\n{}", diff),
                Ok(None) => {}
                Err(e) => warn!("unable to compute configuration diff: {}", e),
            }
        }
        Ok(text)
    }

    /// Render, validate, write and reload.
    pub async fn on_update(&self, pcfg: &Configuration) -> Result<(), ProxyError> {
        let text = self.render_checked(pcfg).await?;
        self.renderer.apply(&text).await
    }

    /// One reconciliation pass.
    pub async fn sync_ingress(&self, key: &QueueKey) -> anyhow::Result<()> {
        if self.queue.is_shutting_down() {
            return Ok(());
        }

        if let QueueKey::Resource(key) = key {
            if let Some(ing) = self.listers.ingress.get_by_key(key) {
                self.secrets.read_secrets(&ing);
            }
        }

        let pcfg = self.build_configuration();

        let unchanged = self
            .running_config
            .lock()
            .map(|running| running.as_ref() == Some(&pcfg))
            .unwrap_or(false);
        if unchanged && !self.is_force_reload() {
            debug!("skipping backend reload (no changes detected)");
            return Ok(());
        }

        info!("backend reload required");
        if let Err(e) = self.on_update(&pcfg).await {
            error!("unexpected failure restarting the backend: {}", e);
            return Err(e.into());
        }
        info!("ingress backend successfully reloaded...");

        if let Ok(mut running) = self.running_config.lock() {
            *running = Some(pcfg);
        }
        self.set_force_reload(false);
        Ok(())
    }

    /// Write a configuration for the current state before the proxy starts.
    async fn write_initial_config(&self) {
        let pcfg = self.build_configuration();
        match self.render_checked(&pcfg).await {
            Ok(text) => match self.renderer.write(&text).await {
                Ok(()) => {
                    if let Ok(mut running) = self.running_config.lock() {
                        *running = Some(pcfg);
                    }
                }
                Err(e) => error!("unable to write initial configuration: {}", e),
            },
            Err(e) => error!("initial configuration is invalid: {}", e),
        }
    }

    /// Sync secrets, write the first configuration, start the proxy and the
    /// background loops. Returns the spawned tasks.
    pub async fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        info!("starting ingress controller");

        for ing in self.listers.ingress.list() {
            if self.class.is_valid(&ing) {
                self.secrets.read_secrets(&ing);
            }
        }
        self.write_initial_config().await;

        let mut handles = Vec::new();
        handles.push(Arc::clone(&self.supervisor).start(self.stop_tx.subscribe()));

        let handler: Arc<dyn SyncHandler> = Arc::clone(self) as Arc<dyn SyncHandler>;
        handles.push(Arc::clone(&self.queue).start(handler));
        self.queue.enqueue(QueueKey::Resync);

        handles.push(self.start_missing_secrets_check());
        handles
    }

    fn start_missing_secrets_check(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        let mut stop = self.stop_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(controller.cfg.missing_secrets_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let ingresses: Vec<Arc<Ingress>> = controller
                            .listers
                            .ingress
                            .list()
                            .into_iter()
                            .filter(|ing| controller.class.is_valid(ing))
                            .collect();
                        if controller.secrets.check_missing_secrets(&ingresses) {
                            controller.clear_annotations();
                            controller.queue.enqueue(QueueKey::Resync);
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
        })
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Drain the queue, quit the proxy and wait for it to exit.
    pub async fn stop(&self) -> Result<(), StopError> {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return Err(StopError::AlreadyStopping);
        }
        // Proxy exits during the drain must not be relaunched.
        self.supervisor.begin_shutdown();

        info!("shutting down controller queues");
        self.queue.shutdown();
        self.queue.wait_stopped().await;
        self.stop_tx.send_replace(true);

        self.supervisor.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl SyncHandler for IngressController {
    async fn sync(&self, key: &QueueKey) -> anyhow::Result<()> {
        self.sync_ingress(key).await
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicUsize;

    use pkg_store::MemoryListers;

    use crate::backends::testutil::make_service;

    /// Proxy stand-in counting checks and reloads.
    pub struct MockBinary {
        config_path: PathBuf,
        pid_file: PathBuf,
        pub fail_validation: AtomicBool,
        pub tests: AtomicUsize,
        pub reloads: AtomicUsize,
        pub quits: AtomicUsize,
    }

    impl MockBinary {
        pub fn new(dir: &Path) -> Self {
            Self {
                config_path: dir.join("nginx.conf"),
                pid_file: dir.join("nginx.pid"),
                fail_validation: AtomicBool::new(false),
                tests: AtomicUsize::new(0),
                reloads: AtomicUsize::new(0),
                quits: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProxyBinary for MockBinary {
        fn config_path(&self) -> &Path {
            &self.config_path
        }

        fn run_command(&self) -> tokio::process::Command {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c")
                .arg(format!("echo $$ > {}; exec sleep 30", self.pid_file.display()));
            cmd
        }

        async fn test(&self, path: &Path) -> Result<(), ProxyError> {
            self.tests.fetch_add(1, Ordering::SeqCst);
            if self.fail_validation.load(Ordering::SeqCst) {
                return Err(ProxyError::Validation {
                    status: "exit status: 1".to_string(),
                    output: "nginx: configuration file test failed".to_string(),
                    path: path.to_path_buf(),
                });
            }
            Ok(())
        }

        async fn reload(&self) -> Result<(), ProxyError> {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn quit(&self) -> Result<(), ProxyError> {
            self.quits.fetch_add(1, Ordering::SeqCst);
            let pid = std::fs::read_to_string(&self.pid_file)
                .ok()
                .and_then(|p| p.trim().parse::<i32>().ok());
            if let Some(pid) = pid {
                nix::sys::signal::kill(
                    nix::unistd::Pid::from_raw(pid),
                    nix::sys::signal::Signal::SIGTERM,
                )
                .ok();
            }
            Ok(())
        }
    }

    pub struct Harness {
        pub dir: tempfile::TempDir,
        pub listers: MemoryListers,
        pub binary: Arc<MockBinary>,
        pub controller: Arc<IngressController>,
    }

    pub fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let listers = MemoryListers::new();
        listers
            .service
            .upsert(make_service("kubernetes", Some("10.0.0.1"), &[("https", 443)]));
        listers
            .service
            .upsert(make_service("svc-a", Some("10.0.0.10"), &[("http", 80)]));
        listers
            .service
            .upsert(make_service("svc-b", Some("10.0.0.11"), &[("http", 8080)]));

        let cfg = ControllerConfig {
            ssl_dir: dir.path().join("ssl"),
            default_ssl_certificate: String::new(),
            sync_rate_limit: 0.0,
            configmap: Some("kube-system/nginx-config".to_string()),
            session_ticket_key_path: dir.path().join("tickets.key"),
            ..Default::default()
        };
        let binary = Arc::new(MockBinary::new(dir.path()));
        let controller = Arc::new(
            IngressController::new(cfg, listers.listers(), binary.clone()).unwrap(),
        );
        Harness {
            dir,
            listers,
            binary,
            controller,
        }
    }
}
