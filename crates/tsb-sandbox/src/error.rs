// error.rs — Error types for sandbox setup.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading configuration or assembling a sandbox.
///
/// Policy denials are not here: they are [`tsb_policy::SecurityError`].
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Failed to read a configuration file.
    #[error("failed to read sandbox config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// YAML configuration did not parse.
    #[error("invalid YAML sandbox config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML configuration did not parse.
    #[error("invalid TOML sandbox config: {0}")]
    Toml(#[from] toml::de::Error),

    /// The config file extension is not one we know how to parse.
    #[error("unsupported sandbox config format: {path} (expected .yaml, .yml or .toml)")]
    UnsupportedFormat { path: PathBuf },

    /// The sandbox root could not be resolved.
    #[error(transparent)]
    Router(#[from] tsb_router::RouterError),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
