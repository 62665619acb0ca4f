//! Centralized constants for the ingress controller.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod annotations;
pub mod controller;
pub mod network;
pub mod paths;
