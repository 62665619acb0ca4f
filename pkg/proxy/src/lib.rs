//! Proxy configuration rendering and process supervision.

pub mod config;
pub mod error;
pub mod nginx;
pub mod process;
pub mod renderer;
pub mod template;
pub mod tunables;

pub use config::{ListenPorts, NginxConfig, TemplateConfig, read_config};
pub use error::ProxyError;
pub use nginx::{NginxBinary, ProxyBinary};
pub use process::{ProcessSupervisor, SupervisorState};
pub use renderer::{ConfigRenderer, write_session_ticket_key};
