//! Reactions to resource changes reported by a watch or manifest source.
//!
//! Handlers only touch caches and the queue; the synchronization itself
//! always runs on the queue worker.

use std::sync::Arc;
use tracing::{debug, info};

use pkg_types::configmap::ConfigMap;
use pkg_types::endpoint::Endpoint;
use pkg_types::ingress::Ingress;
use pkg_types::meta::Resource;
use pkg_types::secret::Secret;
use pkg_types::service::Service;

use crate::ingress::IngressController;
use crate::queue::QueueKey;

#[derive(Debug, Clone)]
pub enum WatchEvent<T> {
    Added(Arc<T>),
    Updated { old: Arc<T>, new: Arc<T> },
    Deleted(Arc<T>),
}

impl<T: Resource> WatchEvent<T> {
    /// The current object, or the removed one for deletions.
    pub fn object(&self) -> &Arc<T> {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Deleted(obj) => obj,
            WatchEvent::Updated { new, .. } => new,
        }
    }

    pub fn key(&self) -> String {
        self.object().key()
    }
}

#[derive(Debug, Clone)]
pub enum ResourceEvent {
    Ingress(WatchEvent<Ingress>),
    Service(WatchEvent<Service>),
    Endpoint(WatchEvent<Endpoint>),
    Secret(WatchEvent<Secret>),
    ConfigMap(WatchEvent<ConfigMap>),
}

impl IngressController {
    pub fn handle_event(&self, event: ResourceEvent) {
        if self.is_stopping() {
            return;
        }
        match event {
            ResourceEvent::Ingress(ev) => self.on_ingress(ev),
            ResourceEvent::Service(ev) => {
                debug!("service {} changed", ev.key());
                self.queue().enqueue(QueueKey::Resync);
            }
            ResourceEvent::Endpoint(ev) => {
                debug!("endpoints {} changed", ev.key());
                self.queue().enqueue(QueueKey::Resync);
            }
            ResourceEvent::Secret(ev) => self.on_secret(ev),
            ResourceEvent::ConfigMap(ev) => self.on_configmap(ev),
        }
    }

    fn on_ingress(&self, ev: WatchEvent<Ingress>) {
        let key = ev.key();
        match &ev {
            WatchEvent::Added(ing) => {
                if !self.class().is_valid(ing) {
                    info!("ignoring add for ingress {} based on annotation", key);
                    return;
                }
                self.secrets().read_secrets(ing);
            }
            WatchEvent::Updated { old, new } => {
                let valid_old = self.class().is_valid(old);
                let valid_new = self.class().is_valid(new);
                if !valid_old && !valid_new {
                    return;
                }
                if valid_old && !valid_new {
                    info!("ingress {} no longer handled by this controller", key);
                }
                self.secrets().read_secrets(new);
            }
            WatchEvent::Deleted(ing) => {
                self.forget_annotations(&key);
                if !self.class().is_valid(ing) {
                    info!("ignoring delete for ingress {} based on annotation", key);
                    return;
                }
            }
        }
        self.queue().enqueue(QueueKey::Resource(key));
    }

    fn on_secret(&self, ev: WatchEvent<Secret>) {
        let key = ev.key();
        let ingresses = self.handled_ingresses();
        let referenced = self.secrets().is_referenced(&key, &ingresses)
            || key == self.config().default_ssl_certificate;
        if !referenced {
            return;
        }
        match &ev {
            WatchEvent::Added(_) | WatchEvent::Updated { .. } => {
                if self.secrets().sync_secret(&key) {
                    self.clear_annotations();
                }
            }
            // Stored certificates stay until the secret is read again.
            WatchEvent::Deleted(_) => {
                info!("referenced secret {} was deleted, keeping its certificate", key);
            }
        }
        self.queue().enqueue(QueueKey::Resource(key));
    }

    fn on_configmap(&self, ev: WatchEvent<ConfigMap>) {
        let key = ev.key();
        if self.config().configmap.as_deref() != Some(key.as_str()) {
            return;
        }
        match &ev {
            WatchEvent::Added(cm) | WatchEvent::Updated { new: cm, .. } => self.set_config(cm),
            WatchEvent::Deleted(_) => self.set_config(&ConfigMap {
                name: ev.object().name.clone(),
                namespace: ev.object().namespace.clone(),
                resource_version: String::new(),
                data: Default::default(),
                created_at: chrono::Utc::now(),
            }),
        }
        info!("configuration {} changed, forcing reload", key);
        self.set_force_reload(true);
        self.queue().enqueue(QueueKey::Resync);
    }

    fn handled_ingresses(&self) -> Vec<Arc<Ingress>> {
        self.listers()
            .ingress
            .list()
            .into_iter()
            .filter(|ing| self.class().is_valid(ing))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::testutil::{backend, make_ingress, with_rule, with_tls};
    use crate::ingress::testutil::harness;
    use crate::secrets::testutil::make_tls_secret;
    use pkg_constants::annotations::INGRESS_CLASS_KEY;
    use std::collections::HashMap;

    #[test]
    fn test_ingress_of_other_class_is_ignored() {
        let h = harness();
        let mut ing = make_ingress("a", "1");
        ing.annotations
            .insert(INGRESS_CLASS_KEY.to_string(), "nginx".to_string());

        h.controller
            .handle_event(ResourceEvent::Ingress(WatchEvent::Added(Arc::new(ing))));
        assert!(h.controller.queue().is_empty());
    }

    #[test]
    fn test_ingress_events_coalesce() {
        let h = harness();
        let ing = Arc::new(with_rule(
            make_ingress("a", "1"),
            "a.example.com",
            "/",
            backend("svc-a", 80),
        ));
        h.controller
            .handle_event(ResourceEvent::Ingress(WatchEvent::Added(ing.clone())));
        h.controller.handle_event(ResourceEvent::Ingress(WatchEvent::Updated {
            old: ing.clone(),
            new: ing.clone(),
        }));
        assert_eq!(h.controller.queue().len(), 1);

        h.controller
            .handle_event(ResourceEvent::Service(WatchEvent::Added(Arc::new(
                crate::backends::testutil::make_service("svc-a", Some("10.0.0.10"), &[]),
            ))));
        assert_eq!(h.controller.queue().len(), 2);
    }

    #[test]
    fn test_ingress_add_syncs_its_secrets() {
        let h = harness();
        h.listers
            .secret
            .upsert(make_tls_secret("a-tls", &["a.example.com"]));
        let ing = with_tls(make_ingress("a", "1"), &["a.example.com"], "a-tls");

        h.controller
            .handle_event(ResourceEvent::Ingress(WatchEvent::Added(Arc::new(ing))));
        assert!(h.controller.secrets().certificates().contains("default/a-tls"));
    }

    #[test]
    fn test_unreferenced_secret_is_ignored() {
        let h = harness();
        let secret = make_tls_secret("unused", &["x.example.com"]);
        h.listers.secret.upsert(secret.clone());

        h.controller
            .handle_event(ResourceEvent::Secret(WatchEvent::Added(Arc::new(secret))));
        assert!(h.controller.secrets().certificates().is_empty());
        assert!(h.controller.queue().is_empty());
    }

    #[tokio::test]
    async fn test_secret_delete_keeps_certificate() {
        let h = harness();
        let ing = with_rule(
            make_ingress("a", "1"),
            "a.example.com",
            "/",
            backend("svc-a", 80),
        );
        h.listers
            .ingress
            .upsert(with_tls(ing, &["a.example.com"], "a-tls"));
        let secret = Arc::new(make_tls_secret("a-tls", &["a.example.com"]));
        h.listers.secret.upsert((*secret).clone());

        h.controller
            .handle_event(ResourceEvent::Secret(WatchEvent::Added(secret.clone())));
        assert!(h.controller.secrets().certificates().contains("default/a-tls"));
        assert_eq!(h.controller.queue().len(), 1);

        h.controller.sync_ingress(&QueueKey::Resync).await.unwrap();
        let before = h.controller.running_config().unwrap();
        let before = before.server("a.example.com").unwrap().ssl_certificate.clone();
        assert!(before.ends_with("default-a-tls.pem"));

        h.listers.secret.remove("default/a-tls");
        h.controller
            .handle_event(ResourceEvent::Secret(WatchEvent::Deleted(secret)));
        assert!(h.controller.secrets().certificates().contains("default/a-tls"));

        h.controller.sync_ingress(&QueueKey::Resync).await.unwrap();
        let after = h.controller.running_config().unwrap();
        assert_eq!(after.server("a.example.com").unwrap().ssl_certificate, before);
    }

    #[test]
    fn test_configmap_change_forces_reload() {
        let h = harness();
        let mut data = HashMap::new();
        data.insert("keep-alive".to_string(), "10".to_string());
        let cm = ConfigMap {
            name: "nginx-config".to_string(),
            namespace: "kube-system".to_string(),
            resource_version: "1".to_string(),
            data,
            created_at: chrono::Utc::now(),
        };
        h.controller
            .handle_event(ResourceEvent::ConfigMap(WatchEvent::Added(Arc::new(cm.clone()))));

        assert!(h.controller.is_force_reload());
        assert_eq!(h.controller.nginx_config().keep_alive, 10);
        assert_eq!(h.controller.queue().len(), 1);

        let mut other = cm;
        other.name = "unrelated".to_string();
        h.controller.set_force_reload(false);
        h.controller
            .handle_event(ResourceEvent::ConfigMap(WatchEvent::Added(Arc::new(other))));
        assert!(!h.controller.is_force_reload());
    }
}
