// handle.rs — Single-writer, many-reader publication of the current policy.
//
// Readers take a snapshot with `load()` and keep using it for the whole
// render; a reconfiguration published meanwhile is only seen by the next
// `load()`. Writers never mutate a policy in place.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::defaults::{CategoryConfig, MemberCategoryConfig};
use crate::policy::SecurityPolicy;

/// Shared, atomically replaceable reference to the current [`SecurityPolicy`].
#[derive(Debug)]
pub struct PolicyHandle {
    current: ArcSwap<SecurityPolicy>,
}

impl PolicyHandle {
    pub fn new(policy: SecurityPolicy) -> Self {
        Self {
            current: ArcSwap::from_pointee(policy),
        }
    }

    /// Snapshot of the policy in effect right now.
    pub fn load(&self) -> Arc<SecurityPolicy> {
        self.current.load_full()
    }

    /// Replace the policy wholesale.
    pub fn publish(&self, policy: SecurityPolicy) {
        self.current.store(Arc::new(policy));
        tracing::info!("published new sandbox security policy");
    }

    pub fn set_allowed_tags(&self, config: &CategoryConfig) {
        self.update(|policy| policy.with_allowed_tags(config));
    }

    pub fn set_allowed_filters(&self, config: &CategoryConfig) {
        self.update(|policy| policy.with_allowed_filters(config));
    }

    pub fn set_allowed_functions(&self, config: &CategoryConfig) {
        self.update(|policy| policy.with_allowed_functions(config));
    }

    pub fn set_allowed_methods(&self, config: &MemberCategoryConfig) {
        self.update(|policy| policy.with_allowed_methods(config));
    }

    pub fn set_allowed_properties(&self, config: &MemberCategoryConfig) {
        self.update(|policy| policy.with_allowed_properties(config));
    }

    fn update<F>(&self, rebuild: F)
    where
        F: Fn(&SecurityPolicy) -> SecurityPolicy,
    {
        // rcu retries if another writer published in between.
        self.current.rcu(|policy| Arc::new(rebuild(policy)));
        tracing::info!("published reconfigured sandbox security policy");
    }
}
