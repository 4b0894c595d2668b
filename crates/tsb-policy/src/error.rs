// error.rs — Denials raised by the security policy.
//
// Every variant is a default-deny outcome: the name (and, for member
// access, the concrete class) was not covered by any allow-list entry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A sandboxed template tried to use something the policy does not allow.
///
/// Structural variants (tag/filter/function) are raised once per compiled
/// template; member variants are raised per access during rendering.
/// Serializable so hosts can record denials in their audit trail.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecurityError {
    /// The template uses a tag that is not in the tag allow-list.
    #[error("tag \"{tag}\" is not allowed")]
    TagNotAllowed { tag: String },

    /// The template uses a filter that is not in the filter allow-list.
    #[error("filter \"{filter}\" is not allowed")]
    FilterNotAllowed { filter: String },

    /// The template calls a function that is not in the function allow-list.
    #[error("function \"{function}\" is not allowed")]
    FunctionNotAllowed { function: String },

    /// The template calls a method no entry allows on this class.
    #[error("calling \"{method}\" method on a \"{class}\" object is not allowed")]
    MethodNotAllowed { class: String, method: String },

    /// The template reads a property no entry allows on this class.
    #[error("calling \"{property}\" property on a \"{class}\" object is not allowed")]
    PropertyNotAllowed { class: String, property: String },
}

impl SecurityError {
    /// The tag, filter, function, method, or property that was denied.
    pub fn offending_name(&self) -> &str {
        match self {
            SecurityError::TagNotAllowed { tag } => tag,
            SecurityError::FilterNotAllowed { filter } => filter,
            SecurityError::FunctionNotAllowed { function } => function,
            SecurityError::MethodNotAllowed { method, .. } => method,
            SecurityError::PropertyNotAllowed { property, .. } => property,
        }
    }

    /// The concrete runtime class, for member denials.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            SecurityError::MethodNotAllowed { class, .. }
            | SecurityError::PropertyNotAllowed { class, .. } => Some(class),
            _ => None,
        }
    }

    /// Short category label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SecurityError::TagNotAllowed { .. } => "tag",
            SecurityError::FilterNotAllowed { .. } => "filter",
            SecurityError::FunctionNotAllowed { .. } => "function",
            SecurityError::MethodNotAllowed { .. } => "method",
            SecurityError::PropertyNotAllowed { .. } => "property",
        }
    }
}
