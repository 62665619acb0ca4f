//! Supervision of the proxy master process.
//!
//! The supervisor launches the proxy in its own process group, watches it
//! from a dedicated task and receives exit events over a channel. Crashes
//! outside of shutdown are relaunched once the listen port is free again.

use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use pkg_constants::controller::{PORT_POLL_INTERVAL_MS, PROCESS_POLL_INTERVAL_MS};

use crate::error::ProxyError;
use crate::nginx::ProxyBinary;

/// What the exit watcher reports.
#[derive(Debug)]
pub enum ExitEvent {
    Exited(ExitStatus),
    WaitFailed(std::io::Error),
}

/// How an exit is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// Exited with status 0. Nothing to do.
    Clean,
    /// Died with an error status or a signal. Relaunch.
    Respawn,
    /// The exit could not be observed. Left to the operator.
    Unknown,
}

/// Decide whether an exit warrants a relaunch.
pub fn classify(event: &ExitEvent) -> ExitClass {
    match event {
        ExitEvent::Exited(status) if status.success() => ExitClass::Clean,
        ExitEvent::Exited(status) => {
            warn!("NGINX master process died ({}), restart is required", status);
            ExitClass::Respawn
        }
        ExitEvent::WaitFailed(e) => {
            error!("unexpected error waiting for the NGINX process: {}", e);
            ExitClass::Unknown
        }
    }
}

/// Whether `port` can be bound on all interfaces.
pub fn is_port_available(port: u16) -> bool {
    TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).is_ok()
}

/// Block until `port` can be bound, polling at a fixed interval.
pub async fn wait_until_port_available(port: u16) {
    let interval = Duration::from_millis(PORT_POLL_INTERVAL_MS);
    while !is_port_available(port) {
        tokio::time::sleep(interval).await;
    }
}

/// Whether a process with `pid` still exists.
pub fn is_process_running(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    kill(Pid::from_raw(raw), None).is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    NotStarted,
    Running { pid: u32 },
    Exited,
}

/// Starts, watches, relaunches and stops the proxy process.
pub struct ProcessSupervisor {
    binary: Arc<dyn ProxyBinary>,
    http_port: u16,
    state: Arc<Mutex<SupervisorState>>,
    shutting_down: Arc<AtomicBool>,
    exit_tx: mpsc::UnboundedSender<ExitEvent>,
    exit_rx: Mutex<Option<mpsc::UnboundedReceiver<ExitEvent>>>,
    poll_interval: Duration,
}

impl ProcessSupervisor {
    pub fn new(binary: Arc<dyn ProxyBinary>, http_port: u16) -> Self {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        Self {
            binary,
            http_port,
            state: Arc::new(Mutex::new(SupervisorState::NotStarted)),
            shutting_down: Arc::new(AtomicBool::new(false)),
            exit_tx,
            exit_rx: Mutex::new(Some(exit_rx)),
            poll_interval: Duration::from_millis(PROCESS_POLL_INTERVAL_MS),
        }
    }

    /// Interval used while waiting for the process to exit on shutdown.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(SupervisorState::Exited)
    }

    pub fn pid(&self) -> Option<u32> {
        match self.state() {
            SupervisorState::Running { pid } => Some(pid),
            _ => None,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Stop relaunching the proxy. Exits seen from now on end supervision.
    pub fn begin_shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            info!("NGINX supervision entering shutdown");
        }
    }

    fn set_state(&self, next: SupervisorState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// Spawn the proxy in a new process group and start its exit watcher.
    pub fn launch(&self) -> Result<u32, ProxyError> {
        let mut cmd = self.binary.run_command();
        // A separate group keeps signals meant for the controller away from the proxy.
        cmd.process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn()?;
        let pid = child.id().unwrap_or_default();
        self.set_state(SupervisorState::Running { pid });
        info!("NGINX process started (pid {})", pid);

        let state = Arc::clone(&self.state);
        let tx = self.exit_tx.clone();
        tokio::spawn(async move {
            let event = match child.wait().await {
                Ok(status) => ExitEvent::Exited(status),
                Err(e) => ExitEvent::WaitFailed(e),
            };
            if let Ok(mut s) = state.lock() {
                *s = SupervisorState::Exited;
            }
            let _ = tx.send(event);
        });

        Ok(pid)
    }

    /// Launch the proxy and supervise it until `stop` fires or shutdown begins.
    pub fn start(self: Arc<Self>, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let Some(mut exits) = self.exit_rx.lock().ok().and_then(|mut rx| rx.take()) else {
                error!("process supervisor already started");
                return;
            };

            info!("starting NGINX process...");
            if let Err(e) = self.launch() {
                error!("nginx error: {}", e);
                return;
            }

            loop {
                tokio::select! {
                    event = exits.recv() => {
                        let Some(event) = event else { break };
                        if self.is_shutting_down() {
                            info!("NGINX process exited during shutdown");
                            break;
                        }
                        match classify(&event) {
                            ExitClass::Respawn => {
                                wait_until_port_available(self.http_port).await;
                                if self.is_shutting_down() {
                                    break;
                                }
                                if let Err(e) = self.launch() {
                                    error!("unable to restart NGINX: {}", e);
                                }
                            }
                            ExitClass::Clean => {
                                info!("NGINX process exited cleanly, not restarting");
                            }
                            ExitClass::Unknown => {}
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Ask the proxy to quit gracefully and wait until it is gone.
    ///
    /// Sets the shutting-down flag first so the exit is not mistaken for a crash.
    pub async fn shutdown(&self) -> Result<(), ProxyError> {
        self.begin_shutdown();

        info!("stopping NGINX process...");
        self.binary.quit().await?;

        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            let running = self.pid().is_some_and(is_process_running);
            if !running {
                info!("NGINX process has stopped");
                return Ok(());
            }
        }
    }
}
