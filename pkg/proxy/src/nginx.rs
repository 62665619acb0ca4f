use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tracing::info;

use pkg_constants::paths::{DEFAULT_NGINX_BINARY, NGINX_BINARY_ENV};

use crate::error::ProxyError;

/// The proxy process boundary.
/// Implementations: [`NginxBinary`] (real subprocess calls).
#[async_trait]
pub trait ProxyBinary: Send + Sync {
    /// Path of the live configuration file.
    fn config_path(&self) -> &Path;

    /// Command that runs the proxy in the foreground with the live configuration.
    fn run_command(&self) -> tokio::process::Command;

    /// Check the configuration at `path`. On failure, the error carries the
    /// proxy's combined output.
    async fn test(&self, path: &Path) -> Result<(), ProxyError>;

    /// Ask the running process to reload the live configuration.
    async fn reload(&self) -> Result<(), ProxyError>;

    /// Ask the running process to finish in-flight requests and exit.
    async fn quit(&self) -> Result<(), ProxyError>;
}

/// nginx invoked through its command line.
pub struct NginxBinary {
    binary: PathBuf,
    config_path: PathBuf,
}

/// stdout followed by stderr.
pub fn combined_output(output: &Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

impl NginxBinary {
    pub fn new(binary: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            config_path: config_path.into(),
        }
    }

    /// `explicit` when given, otherwise `NGINX_BINARY`, otherwise the default path.
    pub fn resolve(explicit: Option<&str>, config_path: impl Into<PathBuf>) -> Self {
        let binary = explicit
            .map(str::to_string)
            .or_else(|| std::env::var(NGINX_BINARY_ENV).ok())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_NGINX_BINARY.to_string());
        info!("using nginx binary {}", binary);
        Self::new(binary, config_path)
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn cmd(&self) -> tokio::process::Command {
        tokio::process::Command::new(&self.binary)
    }

    async fn signal(&self, signal: &str) -> Result<(), ProxyError> {
        let output = self
            .cmd()
            .args(["-s", signal, "-c"])
            .arg(&self.config_path)
            .output()
            .await?;
        if !output.status.success() {
            return Err(ProxyError::Command {
                action: signal.to_string(),
                status: output.status.to_string(),
                output: combined_output(&output),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProxyBinary for NginxBinary {
    fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn run_command(&self) -> tokio::process::Command {
        let mut cmd = self.cmd();
        cmd.arg("-c").arg(&self.config_path);
        cmd
    }

    async fn test(&self, path: &Path) -> Result<(), ProxyError> {
        let output = self.cmd().arg("-t").arg("-c").arg(path).output().await?;
        if !output.status.success() {
            return Err(ProxyError::Validation {
                status: output.status.to_string(),
                output: combined_output(&output),
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    async fn reload(&self) -> Result<(), ProxyError> {
        self.signal("reload").await
    }

    async fn quit(&self) -> Result<(), ProxyError> {
        self.signal("quit").await
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Write an executable shell script standing in for the proxy binary.
    pub fn fake_binary(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("nginx");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.sync_all().unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::fake_binary;
    use super::*;

    #[tokio::test]
    async fn test_check_passes() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_binary(dir.path(), "exit 0\n");
        let nginx = NginxBinary::new(binary, dir.path().join("nginx.conf"));
        nginx.test(&dir.path().join("candidate.conf")).await.unwrap();
    }

    #[tokio::test]
    async fn test_check_failure_carries_output() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_binary(
            dir.path(),
            "echo \"nginx: [emerg] unknown directive\" >&2\necho \"test failed\"\nexit 1\n",
        );
        let nginx = NginxBinary::new(binary, dir.path().join("nginx.conf"));
        let err = nginx
            .test(&dir.path().join("candidate.conf"))
            .await
            .unwrap_err();
        match err {
            ProxyError::Validation { output, .. } => {
                assert!(output.contains("test failed"));
                assert!(output.contains("unknown directive"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_signal_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args.log");
        let binary = fake_binary(
            dir.path(),
            &format!("echo \"$@\" >> {}\n", log.display()),
        );
        let config = dir.path().join("nginx.conf");
        let nginx = NginxBinary::new(binary, &config);

        nginx.reload().await.unwrap();
        nginx.quit().await.unwrap();

        let args = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = args.lines().collect();
        assert_eq!(lines[0], format!("-s reload -c {}", config.display()));
        assert_eq!(lines[1], format!("-s quit -c {}", config.display()));
    }
}
