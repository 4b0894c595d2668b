// error.rs — Error types for sandbox routing.

use thiserror::Error;

/// Errors that can occur while resolving the routing root.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    /// Neither the configuration nor the fallback lookup produced a root path.
    #[error("no sandbox root configured and the fallback lookup found none")]
    Unresolved,
}
