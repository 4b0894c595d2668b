//! # tsb-router
//!
//! Decides, from a template's origin, whether the sandbox applies to it.
//!
//! Only templates that live under the user-editable storage root are gated;
//! theme, addon, and other shipped templates run with full capabilities.
//! Comparison is on whole path segments, so `/storage2/x` is not inside
//! `/storage`.

pub mod error;
pub mod router;

pub use error::RouterError;
pub use router::{normalize_path, RouterConfig, SourceRouter};
