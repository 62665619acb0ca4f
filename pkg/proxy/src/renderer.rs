use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use pkg_constants::paths::{TEMP_CONFIG_PREFIX, TEMP_DIFF_PREFIX};

use crate::config::TemplateConfig;
use crate::error::ProxyError;
use crate::nginx::{ProxyBinary, combined_output};
use crate::template;

/// Turns a template input into validated configuration on disk.
pub struct ConfigRenderer {
    binary: Arc<dyn ProxyBinary>,
    temp_dir: PathBuf,
}

impl ConfigRenderer {
    pub fn new(binary: Arc<dyn ProxyBinary>) -> Self {
        Self {
            binary,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Directory for candidate and diff files. Defaults to the system temp dir.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn config_path(&self) -> &Path {
        self.binary.config_path()
    }

    pub fn render(&self, tc: &TemplateConfig) -> Result<String, ProxyError> {
        template::render(tc)
    }

    /// Run the proxy's configuration check against `text` in a temporary file.
    ///
    /// The live file is never touched. A rejected candidate is kept on disk
    /// for inspection; an accepted one is removed.
    pub async fn validate(&self, text: &str) -> Result<(), ProxyError> {
        if text.is_empty() {
            return Err(ProxyError::EmptyConfig);
        }

        let mut candidate = tempfile::Builder::new()
            .prefix(TEMP_CONFIG_PREFIX)
            .tempfile_in(&self.temp_dir)?;
        candidate.write_all(text.as_bytes())?;
        candidate.flush()?;

        match self.binary.test(candidate.path()).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Err(e) = candidate.keep() {
                    warn!("unable to keep rejected configuration: {}", e);
                }
                Err(err)
            }
        }
    }

    /// Unified diff of the live configuration against `text`, or `None`
    /// when they are identical. Diagnostic only.
    pub async fn diff(&self, text: &str) -> Result<Option<String>, ProxyError> {
        let live = self.config_path();
        let current = tokio::fs::read(live).await.unwrap_or_default();
        if current == text.as_bytes() {
            return Ok(None);
        }

        let mut candidate = tempfile::Builder::new()
            .prefix(TEMP_DIFF_PREFIX)
            .tempfile_in(&self.temp_dir)?;
        candidate.write_all(text.as_bytes())?;
        candidate.flush()?;

        // diff exits with 1 when the files differ.
        let output = tokio::process::Command::new("diff")
            .arg("-u")
            .arg(live)
            .arg(candidate.path())
            .output()
            .await?;
        Ok(Some(combined_output(&output)))
    }

    /// Replace the live configuration with `text` and reload the proxy.
    /// Only call with text that passed [`ConfigRenderer::validate`].
    pub async fn apply(&self, text: &str) -> Result<(), ProxyError> {
        self.write(text).await?;
        self.binary.reload().await
    }

    /// Atomically replace the live configuration without signalling the proxy.
    pub async fn write(&self, text: &str) -> Result<(), ProxyError> {
        let live = self.config_path();
        let dir = live
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(dir).await?;

        let mut staged = tempfile::Builder::new()
            .prefix(TEMP_CONFIG_PREFIX)
            .tempfile_in(dir)?;
        staged.write_all(text.as_bytes())?;
        staged.flush()?;
        staged.persist(live).map_err(|e| ProxyError::Io(e.error))?;
        debug!("wrote {}", live.display());
        Ok(())
    }
}

/// Decode the configured session ticket key and write it to `path`.
/// Returns `false` (after logging) when the key is unusable.
pub fn write_session_ticket_key(encoded: &str, path: &Path) -> bool {
    let key = match STANDARD.decode(encoded.trim()) {
        Ok(key) => key,
        Err(e) => {
            warn!("unexpected error decoding key ssl-session-ticket-key: {}", e);
            return false;
        }
    };
    if key.len() != 48 && key.len() != 80 {
        warn!(
            "ssl-session-ticket-key must be 48 or 80 bytes, got {}",
            key.len()
        );
        return false;
    }
    if let Err(e) = write_private_file(path, &key) {
        warn!("unexpected error writing {}: {}", path.display(), e);
        return false;
    }
    true
}

fn write_private_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(content)
}
