//! Coalescing work queue with a single rate-limited consumer.
//!
//! Every key triggers a full synchronization, so duplicates pending at the
//! same time collapse into one entry. Shutdown stops accepting keys, lets
//! the running synchronization finish and drops whatever is still pending.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ratelimit::TokenBucket;

/// What triggered a synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueueKey {
    /// Periodic or forced full resync.
    Resync,
    /// A changed resource, `namespace/name`.
    Resource(String),
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueKey::Resync => write!(f, "<resync>"),
            QueueKey::Resource(key) => write!(f, "{}", key),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Running,
    Draining,
    Stopped,
}

/// The function invoked for each dequeued key.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    async fn sync(&self, key: &QueueKey) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
struct Pending {
    order: VecDeque<QueueKey>,
    keys: HashSet<QueueKey>,
}

pub struct TaskQueue {
    pending: Mutex<Pending>,
    state: watch::Sender<QueueState>,
    notify: Notify,
    limiter: TokenBucket,
    worker_started: AtomicBool,
}

impl TaskQueue {
    /// `rate` is the maximum number of synchronizations per second.
    pub fn new(rate: f64) -> Self {
        let (state, _) = watch::channel(QueueState::Running);
        Self {
            pending: Mutex::new(Pending::default()),
            state,
            notify: Notify::new(),
            limiter: TokenBucket::new(rate, 1),
            worker_started: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> QueueState {
        *self.state.borrow()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state() != QueueState::Running
    }

    /// Number of keys waiting to be processed.
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a key unless it is already pending.
    /// Returns `false` when the queue no longer accepts work.
    pub fn enqueue(&self, key: QueueKey) -> bool {
        if self.is_shutting_down() {
            debug!("queue is shutting down, dropping {}", key);
            return false;
        }
        let mut pending = self.lock();
        if pending.keys.insert(key.clone()) {
            pending.order.push_back(key);
            self.notify.notify_one();
        }
        true
    }

    fn pop(&self) -> Option<QueueKey> {
        let mut pending = self.lock();
        let key = pending.order.pop_front()?;
        pending.keys.remove(&key);
        Some(key)
    }

    async fn next(&self) -> Option<QueueKey> {
        loop {
            if self.is_shutting_down() {
                return None;
            }
            if let Some(key) = self.pop() {
                return Some(key);
            }
            self.notify.notified().await;
        }
    }

    /// Run the single consumer until shutdown.
    pub fn start(self: Arc<Self>, handler: Arc<dyn SyncHandler>) -> JoinHandle<()> {
        self.worker_started.store(true, Ordering::SeqCst);
        tokio::spawn(async move {
            info!("sync queue worker started");
            while let Some(key) = self.next().await {
                self.limiter.acquire().await;
                if self.is_shutting_down() {
                    break;
                }
                debug!("syncing {}", key);
                // Failures are not retried; the next event triggers a new pass.
                if let Err(e) = handler.sync(&key).await {
                    warn!("sync of {} failed: {:#}", key, e);
                }
            }

            let dropped = {
                let mut pending = self.lock();
                let dropped = pending.order.len();
                pending.order.clear();
                pending.keys.clear();
                dropped
            };
            if dropped > 0 {
                debug!("dropped {} pending keys on shutdown", dropped);
            }
            self.state.send_replace(QueueState::Stopped);
            info!("sync queue worker stopped");
        })
    }

    /// Stop accepting keys and wake the consumer so it can drain.
    pub fn shutdown(&self) {
        if self.state() != QueueState::Running {
            return;
        }
        self.state.send_replace(QueueState::Draining);
        if self.worker_started.load(Ordering::SeqCst) {
            self.notify.notify_one();
        } else {
            self.state.send_replace(QueueState::Stopped);
        }
    }

    /// Wait until the consumer has exited.
    pub async fn wait_stopped(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == QueueState::Stopped).await;
    }
}
