// pattern.rs — Compiled name patterns and flat-namespace allow-lists.
//
// Raw configuration strings are compiled once into a closed `Pattern`
// variant, so lookups never re-parse a string. Tags, filters, and functions
// live in flat namespaces and only honor the `*` sentinel; member names also
// honor trailing-`*` prefix wildcards (see `member.rs`).

use std::borrow::Cow;
use std::collections::HashSet;

/// The wildcard sentinel that matches every name.
pub const WILDCARD: &str = "*";

/// How a matcher compares names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseMode {
    /// Names must match byte for byte.
    Sensitive,
    /// Names are lowercased on both sides before comparison.
    Insensitive,
}

impl CaseMode {
    /// Normalize a name for comparison under this mode.
    pub fn normalize<'a>(&self, name: &'a str) -> Cow<'a, str> {
        match self {
            CaseMode::Sensitive => Cow::Borrowed(name),
            CaseMode::Insensitive => {
                if name.chars().any(char::is_uppercase) {
                    Cow::Owned(name.to_lowercase())
                } else {
                    Cow::Borrowed(name)
                }
            }
        }
    }
}

/// A single compiled name pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Matches exactly this name.
    Exact(String),
    /// Matches any name starting with this prefix (including the prefix itself).
    PrefixWildcard(String),
    /// Matches every name.
    Any,
}

impl Pattern {
    /// Compile a raw pattern string.
    ///
    /// `"*"` becomes `Any`, a trailing `*` becomes `PrefixWildcard`, anything
    /// else is `Exact`. The stored text is normalized under `case` so matching
    /// only has to normalize the candidate.
    pub fn compile(raw: &str, case: CaseMode) -> Self {
        if raw == WILDCARD {
            return Pattern::Any;
        }
        let normalized = case.normalize(raw);
        match normalized.strip_suffix('*') {
            Some(prefix) => Pattern::PrefixWildcard(prefix.to_string()),
            None => Pattern::Exact(normalized.into_owned()),
        }
    }

    /// Test an already-normalized name against this pattern.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Exact(exact) => exact == name,
            Pattern::PrefixWildcard(prefix) => name.starts_with(prefix.as_str()),
        }
    }
}

/// Allow-list over a flat namespace (tags, filters, or functions).
///
/// Membership is an O(1) exact lookup. The only wildcard is the `*`
/// sentinel, which turns the list into "allow everything".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameAllowList {
    names: HashSet<String>,
    any: bool,
}

impl NameAllowList {
    /// Compile a list of names. A `"*"` entry makes the list allow every name.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::default();
        for name in names {
            let name = name.into();
            if name == WILDCARD {
                list.any = true;
            } else {
                list.names.insert(name);
            }
        }
        list
    }

    /// A list that allows every name.
    pub fn allow_all() -> Self {
        Self {
            names: HashSet::new(),
            any: true,
        }
    }

    /// Whether the name is allowed.
    pub fn is_allowed(&self, name: &str) -> bool {
        self.any || self.names.contains(name)
    }

    /// Whether the list contains the `*` sentinel.
    pub fn allows_any(&self) -> bool {
        self.any
    }

    /// Number of explicit names (the sentinel is not counted).
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && !self.any
    }

    /// Iterate the explicit names in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
