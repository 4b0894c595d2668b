//! # tsb-sandbox
//!
//! Host-facing sandbox for untrusted templates.
//!
//! A [`Sandbox`] is assembled once at boot from a [`SandboxConfig`] and then
//! serves the host template engine's four call sites:
//!
//! 1. **Routing**: [`Sandbox::policy_for`], once per template, by origin.
//! 2. **Structural gate**: [`Sandbox::check_structural`], once per compiled
//!    template, with every tag, filter, and function it references.
//! 3. **Member gates**: [`Sandbox::check_method`] / [`Sandbox::check_property`],
//!    once per access while rendering.
//! 4. **Configuration ingestion**: [`Sandbox::from_config`] and
//!    [`Sandbox::reconfigure`].
//!
//! Templates outside the storage root never reach the policy.

pub mod config;
pub mod error;

use std::sync::Arc;

pub use config::SandboxConfig;
pub use error::{Result, SandboxError};
pub use tsb_policy::{
    BuiltinDefaults, CategoryConfig, FlatHierarchy, MemberCategoryConfig, PolicyConfig,
    PolicyHandle, SandboxObject, SecurityError, SecurityPolicy, TypeHierarchy, TypeRegistry,
};
pub use tsb_router::{RouterConfig, RouterError, SourceRouter};

/// The assembled policy plus the router deciding when it applies.
pub struct Sandbox {
    policy: PolicyHandle,
    router: SourceRouter,
    defaults: Arc<BuiltinDefaults>,
    hierarchy: Arc<dyn TypeHierarchy>,
}

impl Sandbox {
    /// Assemble a sandbox with the standard built-in defaults.
    ///
    /// `fallback_root` is consulted only when the config is enabled and sets
    /// no `storage_path`.
    pub fn from_config<F>(
        config: &SandboxConfig,
        hierarchy: Arc<dyn TypeHierarchy>,
        fallback_root: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Option<String>,
    {
        Self::with_defaults(config, BuiltinDefaults::standard(), hierarchy, fallback_root)
    }

    /// Assemble a sandbox whose `@defaults` marker expands to `defaults`.
    pub fn with_defaults<F>(
        config: &SandboxConfig,
        defaults: BuiltinDefaults,
        hierarchy: Arc<dyn TypeHierarchy>,
        fallback_root: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Option<String>,
    {
        let router = if config.enabled {
            let root = RouterConfig::resolve(config.storage_path.as_deref(), fallback_root)?;
            SourceRouter::new(root)
        } else {
            tracing::debug!("template sandbox disabled by configuration");
            SourceRouter::disabled()
        };

        let defaults = Arc::new(defaults);
        let policy =
            SecurityPolicy::from_config(&config.policy, defaults.clone(), hierarchy.clone());

        Ok(Self {
            policy: PolicyHandle::new(policy),
            router,
            defaults,
            hierarchy,
        })
    }

    /// The policy to attach when compiling and rendering the template at
    /// `origin`, or `None` if the template runs unrestricted.
    ///
    /// The returned snapshot stays valid for the whole render even if the
    /// sandbox is reconfigured meanwhile.
    pub fn policy_for(&self, origin: &str) -> Option<Arc<SecurityPolicy>> {
        self.router
            .should_sandbox(origin)
            .then(|| self.policy.load())
    }

    pub fn should_sandbox(&self, origin: &str) -> bool {
        self.router.should_sandbox(origin)
    }

    /// Structural gate against the current policy. See
    /// [`SecurityPolicy::check_structural`].
    pub fn check_structural<T, F, N>(
        &self,
        tags: T,
        filters: F,
        functions: N,
    ) -> std::result::Result<(), SecurityError>
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
        N: IntoIterator,
        N::Item: AsRef<str>,
    {
        self.policy.load().check_structural(tags, filters, functions)
    }

    pub fn check_method(
        &self,
        object: &dyn SandboxObject,
        method: &str,
    ) -> std::result::Result<(), SecurityError> {
        self.policy.load().check_method(object, method)
    }

    pub fn check_property(
        &self,
        object: &dyn SandboxObject,
        property: &str,
    ) -> std::result::Result<(), SecurityError> {
        self.policy.load().check_property(object, property)
    }

    /// Rebuild the policy from new allow-lists and publish it atomically.
    ///
    /// The routing root is resolved once at boot and is not changed here.
    pub fn reconfigure(&self, config: &PolicyConfig) {
        let policy =
            SecurityPolicy::from_config(config, self.defaults.clone(), self.hierarchy.clone());
        self.policy.publish(policy);
    }

    /// The handle for category-by-category reconfiguration.
    pub fn policy_handle(&self) -> &PolicyHandle {
        &self.policy
    }

    pub fn router(&self) -> &SourceRouter {
        &self.router
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("policy", &self.policy)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}
