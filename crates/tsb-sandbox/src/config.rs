//! Sandbox configuration structures

use std::path::Path;

use serde::{Deserialize, Serialize};
use tsb_policy::PolicyConfig;

use crate::error::{Result, SandboxError};

/// Top-level sandbox configuration, from YAML or TOML.
///
/// ```yaml
/// enabled: true
/// storage_path: /srv/site/storage
/// tags: ["@defaults", "cache"]
/// filters: ["@defaults"]
/// methods:
///   - "@defaults"
///   - 'App\Models\Post': ["getTitle", "get*"]
/// properties:
///   'App\Models\Post': ["title"]
/// ```
///
/// Categories left out mean "built-in defaults only".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// When false, no template is routed into the sandbox.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Root of user-editable templates. Absent → the host's fallback lookup.
    #[serde(default)]
    pub storage_path: Option<String>,

    /// Allow-lists for tags, filters, functions, methods, and properties.
    #[serde(flatten)]
    pub policy: PolicyConfig,
}

fn default_enabled() -> bool {
    true
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            storage_path: None,
            policy: PolicyConfig::default(),
        }
    }
}

impl SandboxConfig {
    /// Load from a `.yaml`, `.yml`, or `.toml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SandboxError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            _ => Err(SandboxError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Ok(toml::from_str(toml)?)
    }
}
