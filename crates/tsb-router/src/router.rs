// router.rs — Origin-based routing into the sandbox.
//
// Paths are normalized lexically before comparison: backslashes become
// slashes, repeated separators and "." segments collapse, ".." pops the
// previous segment, and trailing separators are dropped. Normalizing ".."
// matters: "/themes/../storage/x" is a storage template and must be gated.

use serde::{Deserialize, Serialize};

use crate::error::RouterError;

/// Normalize a path or origin identifier for segment-wise comparison.
///
/// Returns an empty string for empty (or whitespace-only) input. An absolute
/// path that collapses to nothing normalizes to `"/"`.
pub fn normalize_path(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    let unified = raw.replace('\\', "/");
    let absolute = unified.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                // Cannot climb above an absolute root.
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// The resolved sandbox root. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RouterConfig {
    root: String,
}

impl RouterConfig {
    /// A config for `root`, normalized. An empty root is rejected.
    pub fn new(root: &str) -> Result<Self, RouterError> {
        let root = normalize_path(root);
        if root.is_empty() {
            return Err(RouterError::Unresolved);
        }
        Ok(Self { root })
    }

    /// Use `explicit` when it is set and non-empty, otherwise ask `fallback`.
    pub fn resolve<F>(explicit: Option<&str>, fallback: F) -> Result<Self, RouterError>
    where
        F: FnOnce() -> Option<String>,
    {
        if let Some(root) = explicit.filter(|root| !root.trim().is_empty()) {
            let config = Self::new(root)?;
            tracing::debug!(root = %config.root, "sandbox root from configuration");
            return Ok(config);
        }
        let found = fallback().ok_or(RouterError::Unresolved)?;
        let config = Self::new(&found)?;
        tracing::debug!(root = %config.root, "sandbox root from fallback lookup");
        Ok(config)
    }

    pub fn root(&self) -> &str {
        &self.root
    }
}

impl TryFrom<String> for RouterConfig {
    type Error = RouterError;

    fn try_from(root: String) -> Result<Self, Self::Error> {
        Self::new(&root)
    }
}

impl From<RouterConfig> for String {
    fn from(config: RouterConfig) -> Self {
        config.root
    }
}

/// Gate deciding whether a template is sandboxed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRouter {
    root: Option<String>,
}

impl SourceRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            root: Some(config.root),
        }
    }

    /// A router that sandboxes nothing.
    pub fn disabled() -> Self {
        Self { root: None }
    }

    /// Whether the template at `origin` must run under the security policy.
    ///
    /// True iff the normalized origin is the root itself or lies beneath it.
    pub fn should_sandbox(&self, origin: &str) -> bool {
        let Some(root) = self.root.as_deref() else {
            return false;
        };
        let origin = normalize_path(origin);
        let inside = if root == "/" {
            origin.starts_with('/')
        } else {
            origin
                .strip_prefix(root)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        };
        tracing::debug!(origin = %origin, sandboxed = inside, "routed template");
        inside
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }
}
