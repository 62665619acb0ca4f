//! Resource and model types shared by every crate of the controller.

pub mod config;
pub mod configmap;
pub mod directives;
pub mod endpoint;
pub mod ingress;
pub mod meta;
pub mod model;
pub mod secret;
pub mod service;
pub mod ssl;
pub mod validate;
