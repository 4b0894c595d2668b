//! # tsb-policy
//!
//! Default-deny security policy for sandboxed templates.
//!
//! A [`SecurityPolicy`] answers the questions a host template engine asks
//! about an untrusted template: may it use these tags, filters, and functions
//! (one structural check per compiled template), and may it call this method
//! or read this property on this object (one check per access while
//! rendering).
//!
//! ## Key invariants
//!
//! - **Default deny**: anything not matched by an allow-list entry is refused
//!   with a typed [`SecurityError`] naming the offending construct.
//! - **Defaults are opt-in per category**: the `@defaults` marker extends the
//!   built-in lists; omitting it replaces them.
//! - **Immutable policies**: reconfiguration builds a new policy and
//!   publishes it through a [`PolicyHandle`]; readers never see a half-updated
//!   policy.
//! - **Methods ignore case, properties do not.**

pub mod defaults;
pub mod error;
pub mod handle;
pub mod member;
pub mod pattern;
pub mod policy;

pub use defaults::{
    merge_members, merge_names, BuiltinDefaults, CategoryConfig, MemberCategoryConfig,
    MemberTable, DEFAULTS_MARKER,
};
pub use error::SecurityError;
pub use handle::PolicyHandle;
pub use member::{FlatHierarchy, MemberMatcher, SandboxObject, TypeHierarchy, TypeRegistry};
pub use pattern::{CaseMode, NameAllowList, Pattern};
pub use policy::{PolicyConfig, SecurityPolicy};
