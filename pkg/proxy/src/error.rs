use std::path::PathBuf;
use thiserror::Error;

/// Failures of the render, validate and apply pipeline.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid nginx configuration (empty)")]
    EmptyConfig,

    #[error("template evaluation failed: {0}")]
    Template(#[from] std::fmt::Error),

    /// The proxy rejected the configuration. `output` is its combined
    /// stdout and stderr; the rejected text is kept at `path`.
    #[error(
        "\n-------------------------------------------------------------------------------\nError: {status}\n{output}\n-------------------------------------------------------------------------------\nrejected configuration kept at {}",
        .path.display()
    )]
    Validation {
        status: String,
        output: String,
        path: PathBuf,
    },

    #[error("nginx {action} failed ({status}):\n{output}")]
    Command {
        action: String,
        status: String,
        output: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
