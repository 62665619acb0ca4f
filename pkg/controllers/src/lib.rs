//! Reconciliation engine: listed resources in, proxy configuration out.

pub mod backends;
pub mod config;
pub mod events;
pub mod ingress;
pub mod queue;
pub mod ratelimit;
pub mod resolver;
pub mod secrets;

pub use backends::{SynthesisInput, synthesize};
pub use config::ControllerConfig;
pub use events::{ResourceEvent, WatchEvent};
pub use ingress::{IngressController, StopError};
pub use queue::{QueueKey, SyncHandler, TaskQueue};
pub use secrets::SecretSync;
