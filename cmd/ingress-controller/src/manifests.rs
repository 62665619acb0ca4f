//! Resource source reading YAML manifests from a directory.
//!
//! Every scan re-reads all `*.yaml`/`*.yml` files, updates the in-memory
//! listers and reports what was added, changed or removed since the
//! previous scan. Files may hold several documents; each document carries
//! a `kind` of `Ingress`, `Service`, `Endpoints`, `Secret` or `ConfigMap`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pkg_controllers::{IngressController, ResourceEvent, WatchEvent};
use pkg_store::{Lister, MemoryLister, MemoryListers};
use pkg_types::meta::Resource;
use pkg_types::validate::validate_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Ingress,
    Service,
    Endpoints,
    Secret,
    ConfigMap,
}

impl Kind {
    fn parse(kind: &str) -> Option<Self> {
        match kind {
            "Ingress" => Some(Kind::Ingress),
            "Service" => Some(Kind::Service),
            "Endpoints" | "Endpoint" => Some(Kind::Endpoints),
            "Secret" => Some(Kind::Secret),
            "ConfigMap" => Some(Kind::ConfigMap),
            _ => None,
        }
    }

    /// Kinds limited by the watched namespace.
    fn is_namespaced_watch(self) -> bool {
        matches!(self, Kind::Ingress | Kind::Service | Kind::Endpoints)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ObjectRef {
    kind: Kind,
    key: String,
}

struct Document {
    fingerprint: String,
    value: Value,
}

pub struct ManifestSource {
    dir: PathBuf,
    namespace: Option<String>,
    listers: MemoryListers,
    seen: HashMap<ObjectRef, String>,
    generation: u64,
}

impl ManifestSource {
    pub fn new(dir: impl Into<PathBuf>, namespace: Option<String>, listers: MemoryListers) -> Self {
        Self {
            dir: dir.into(),
            namespace: namespace.filter(|ns| !ns.is_empty()),
            listers,
            seen: HashMap::new(),
            generation: 0,
        }
    }

    /// Re-read the directory and apply the differences to the listers.
    ///
    /// A file that fails to parse aborts the scan and leaves the listers
    /// untouched.
    pub fn scan(&mut self) -> anyhow::Result<Vec<ResourceEvent>> {
        let docs = self.read_documents()?;
        self.generation += 1;

        let mut events = Vec::new();
        for (obj, doc) in &docs {
            if self.seen.get(obj) == Some(&doc.fingerprint) {
                continue;
            }
            let mut value = doc.value.clone();
            stamp_version(&mut value, self.generation);
            match self.upsert(obj, value) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!("skipping {:?} {}: {:#}", obj.kind, obj.key, e);
                    continue;
                }
            }
            self.seen.insert(obj.clone(), doc.fingerprint.clone());
        }

        let removed: Vec<ObjectRef> = self
            .seen
            .keys()
            .filter(|obj| !docs.contains_key(*obj))
            .cloned()
            .collect();
        for obj in removed {
            self.seen.remove(&obj);
            if let Some(event) = self.remove(&obj) {
                events.push(event);
            }
        }

        if !events.is_empty() {
            info!("{} resource changes found in {}", events.len(), self.dir.display());
        }
        Ok(events)
    }

    fn read_documents(&self) -> anyhow::Result<HashMap<ObjectRef, Document>> {
        let mut docs = HashMap::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("manifest directory {} does not exist", self.dir.display());
                return Ok(docs);
            }
            Err(e) => return Err(e.into()),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_manifest(path))
            .collect();
        paths.sort();

        for path in paths {
            let content = std::fs::read_to_string(&path)?;
            for de in serde_yaml::Deserializer::from_str(&content) {
                let value = Value::deserialize(de)
                    .map_err(|e| anyhow::anyhow!("invalid manifest {}: {}", path.display(), e))?;
                if let Some((obj, doc)) = self.document(&path, value)? {
                    if docs.insert(obj.clone(), doc).is_some() {
                        warn!("{:?} {} defined more than once, last one wins", obj.kind, obj.key);
                    }
                }
            }
        }
        Ok(docs)
    }

    fn document(&self, path: &Path, mut value: Value) -> anyhow::Result<Option<(ObjectRef, Document)>> {
        let Value::Mapping(map) = &mut value else {
            return Ok(None);
        };

        let Some(kind) = map.get("kind").and_then(Value::as_str).and_then(Kind::parse) else {
            debug!("ignoring document without a supported kind in {}", path.display());
            return Ok(None);
        };
        let name = map
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("{:?} without a name in {}", kind, path.display()))?
            .to_string();
        if !map.contains_key("namespace") {
            map.insert("namespace".into(), "default".into());
        }
        let namespace = map
            .get("namespace")
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string();

        validate_name(&namespace)
            .and_then(|_| validate_name(&name))
            .map_err(|e| anyhow::anyhow!("{:?} in {}: {}", kind, path.display(), e))?;

        if let Some(watched) = &self.namespace {
            if kind.is_namespaced_watch() && *watched != namespace {
                return Ok(None);
            }
        }

        let fingerprint = hex::encode(Sha256::digest(serde_yaml::to_string(&value)?.as_bytes()));
        let obj = ObjectRef {
            kind,
            key: format!("{}/{}", namespace, name),
        };
        Ok(Some((obj, Document { fingerprint, value })))
    }

    fn upsert(&self, obj: &ObjectRef, value: Value) -> anyhow::Result<ResourceEvent> {
        Ok(match obj.kind {
            Kind::Ingress => ResourceEvent::Ingress(store(&self.listers.ingress, &obj.key, value)?),
            Kind::Service => ResourceEvent::Service(store(&self.listers.service, &obj.key, value)?),
            Kind::Endpoints => {
                ResourceEvent::Endpoint(store(&self.listers.endpoint, &obj.key, value)?)
            }
            Kind::Secret => ResourceEvent::Secret(store(&self.listers.secret, &obj.key, value)?),
            Kind::ConfigMap => {
                ResourceEvent::ConfigMap(store(&self.listers.configmap, &obj.key, value)?)
            }
        })
    }

    fn remove(&self, obj: &ObjectRef) -> Option<ResourceEvent> {
        let key = obj.key.as_str();
        match obj.kind {
            Kind::Ingress => delete(&self.listers.ingress, key).map(ResourceEvent::Ingress),
            Kind::Service => delete(&self.listers.service, key).map(ResourceEvent::Service),
            Kind::Endpoints => delete(&self.listers.endpoint, key).map(ResourceEvent::Endpoint),
            Kind::Secret => delete(&self.listers.secret, key).map(ResourceEvent::Secret),
            Kind::ConfigMap => delete(&self.listers.configmap, key).map(ResourceEvent::ConfigMap),
        }
    }

    /// Rescan every `period` and feed the changes to the controller.
    pub fn start(
        mut self,
        controller: Arc<IngressController>,
        period: Duration,
        mut stop: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; the initial scan already ran.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => match self.scan() {
                        Ok(events) => {
                            for event in events {
                                controller.handle_event(event);
                            }
                        }
                        Err(e) => warn!("manifest scan failed: {:#}", e),
                    },
                    _ = stop.changed() => break,
                }
            }
        })
    }
}

fn is_manifest(path: &Path) -> bool {
    path.is_file()
        && matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        )
}

/// Give objects without a resource version one that changes with content.
fn stamp_version(value: &mut Value, generation: u64) {
    if let Value::Mapping(map) = value {
        let empty = map
            .get("resource_version")
            .and_then(Value::as_str)
            .is_none_or(str::is_empty);
        if empty {
            map.insert("resource_version".into(), generation.to_string().into());
        }
    }
}

fn store<T>(lister: &MemoryLister<T>, key: &str, value: Value) -> anyhow::Result<WatchEvent<T>>
where
    T: Resource + DeserializeOwned + Send + Sync,
{
    let obj: T = serde_yaml::from_value(value)?;
    let old = lister.upsert(obj);
    let new = lister
        .get_by_key(key)
        .ok_or_else(|| anyhow::anyhow!("{} vanished after insert", key))?;
    Ok(match old {
        Some(old) => WatchEvent::Updated { old, new },
        None => WatchEvent::Added(new),
    })
}

fn delete<T: Resource>(lister: &MemoryLister<T>, key: &str) -> Option<WatchEvent<T>> {
    lister.remove(key).map(WatchEvent::Deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INGRESS: &str = r#"
kind: Ingress
name: web
namespace: default
spec:
  rules:
    - host: web.example.com
      http:
        paths:
          - path: /
            backend:
              service_name: web
              service_port: 80
---
kind: Service
name: web
namespace: default
cluster_ip: 10.0.0.20
spec:
  ports:
    - name: http
      port: 80
      target_port: 8080
"#;

    fn source(dir: &Path, namespace: Option<&str>) -> (MemoryListers, ManifestSource) {
        let listers = MemoryListers::new();
        let source = ManifestSource::new(dir, namespace.map(str::to_string), listers.clone());
        (listers, source)
    }

    #[test]
    fn test_scan_adds_then_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("web.yaml"), INGRESS).unwrap();
        let (listers, mut source) = source(dir.path(), None);

        let events = source.scan().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .any(|e| matches!(e, ResourceEvent::Ingress(WatchEvent::Added(_)))));
        let ing = listers.ingress.get_by_key("default/web").unwrap();
        assert_eq!(ing.resource_version, "1");
        assert_eq!(ing.spec.rules[0].host, "web.example.com");

        assert!(source.scan().unwrap().is_empty());
    }

    #[test]
    fn test_scan_reports_updates_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.yaml");
        std::fs::write(&path, INGRESS).unwrap();
        let (listers, mut source) = source(dir.path(), None);
        source.scan().unwrap();

        std::fs::write(&path, INGRESS.replace("web.example.com", "www.example.com")).unwrap();
        let events = source.scan().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ResourceEvent::Ingress(WatchEvent::Updated { old, new }) => {
                assert_eq!(old.spec.rules[0].host, "web.example.com");
                assert_eq!(new.spec.rules[0].host, "www.example.com");
                assert_ne!(old.resource_version, new.resource_version);
            }
            other => panic!("unexpected event {:?}", other),
        }

        std::fs::remove_file(&path).unwrap();
        let events = source.scan().unwrap();
        assert_eq!(events.len(), 2);
        assert!(listers.ingress.is_empty());
        assert!(listers.service.is_empty());
    }

    #[test]
    fn test_invalid_file_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("web.yaml"), INGRESS).unwrap();
        let (listers, mut source) = source(dir.path(), None);
        source.scan().unwrap();

        std::fs::write(dir.path().join("broken.yml"), "kind: [unterminated").unwrap();
        assert!(source.scan().is_err());
        assert_eq!(listers.ingress.len(), 1);
    }

    #[test]
    fn test_namespace_filter_and_unknown_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let other = INGRESS.replace("namespace: default", "namespace: other");
        let extra = "kind: Deployment\nname: web\n---\nkind: Secret\nname: certs\nnamespace: other\n";
        std::fs::write(dir.path().join("a.yaml"), other).unwrap();
        std::fs::write(dir.path().join("b.yaml"), extra).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "kind: Ingress").unwrap();
        let (listers, mut source) = source(dir.path(), Some("default"));

        let events = source.scan().unwrap();
        assert_eq!(events.len(), 1);
        assert!(listers.ingress.is_empty());
        assert!(listers.secret.get_by_key("other/certs").is_some());
    }

    #[test]
    fn test_missing_namespace_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cm.yaml"),
            "kind: ConfigMap\nname: nginx-config\nresource_version: \"7\"\ndata:\n  keep-alive: \"10\"\n",
        )
        .unwrap();
        let (listers, mut source) = source(dir.path(), None);
        source.scan().unwrap();

        let cm = listers.configmap.get_by_key("default/nginx-config").unwrap();
        assert_eq!(cm.resource_version, "7");
        assert_eq!(cm.data.get("keep-alive").map(String::as_str), Some("10"));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (_listers, mut source) = source(&dir.path().join("absent"), None);
        assert!(source.scan().unwrap().is_empty());
    }
}
