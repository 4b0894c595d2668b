// member.rs — Class-aware allow-lists for method calls and property reads.
//
// An entry pairs a class pattern (a type name or "*") with member patterns.
// A class entry applies to an object when the pattern is "*", names the
// object's concrete type, or names one of its supertypes/interfaces. The
// result is the union over every applicable entry, so entry order never
// changes the answer; evaluation just stops at the first hit.
//
// Answers are memoized per (concrete type, normalized member). The policy is
// immutable once built, so a cached answer never goes stale.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::defaults::{normalize_class_name, MemberTable};
use crate::pattern::{CaseMode, Pattern, WILDCARD};

/// A runtime value whose members a template can reach.
pub trait SandboxObject {
    /// Fully-qualified name of the object's concrete type.
    fn class_name(&self) -> &str;
}

/// Answers "is a value of `concrete` type also a `declared`?"
///
/// This is the single reflective query the matcher needs. Implementations
/// only need to cover supertypes and interfaces; name equality and the `*`
/// pattern are handled by the matcher itself.
pub trait TypeHierarchy: Send + Sync {
    fn type_compatible(&self, concrete: &str, declared: &str) -> bool;
}

/// A hierarchy with no subtyping: only exact class names and `*` match.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatHierarchy;

impl TypeHierarchy for FlatHierarchy {
    fn type_compatible(&self, _concrete: &str, _declared: &str) -> bool {
        false
    }
}

/// Registry of types and their direct supertypes (parent classes and interfaces).
///
/// Compatibility is the transitive closure of the registered edges. Cycles in
/// registration are tolerated.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    supertypes: HashMap<String, Vec<String>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the direct supertypes of `name`. Repeated calls accumulate.
    pub fn register<I, S>(&mut self, name: &str, supertypes: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let slot = self
            .supertypes
            .entry(normalize_class_name(name).to_string())
            .or_default();
        for parent in supertypes {
            let parent = normalize_class_name(parent.as_ref()).to_string();
            if !slot.contains(&parent) {
                slot.push(parent);
            }
        }
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_type<I, S>(mut self, name: &str, supertypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.register(name, supertypes);
        self
    }

    /// Direct supertypes of a type, if registered.
    pub fn direct_supertypes(&self, name: &str) -> &[String] {
        self.supertypes
            .get(normalize_class_name(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `declared` is a proper ancestor of `concrete`.
    pub fn is_subtype(&self, concrete: &str, declared: &str) -> bool {
        let declared = normalize_class_name(declared);
        let mut pending: Vec<&str> = vec![normalize_class_name(concrete)];
        let mut seen: HashSet<&str> = HashSet::new();
        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                continue;
            }
            for parent in self.direct_supertypes(current) {
                if parent == declared {
                    return true;
                }
                pending.push(parent);
            }
        }
        false
    }
}

impl TypeHierarchy for TypeRegistry {
    fn type_compatible(&self, concrete: &str, declared: &str) -> bool {
        self.is_subtype(concrete, declared)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClassPattern {
    Any,
    Named(String),
}

#[derive(Debug, Clone)]
struct ClassRule {
    class: ClassPattern,
    members: Vec<Pattern>,
}

/// Allow-list of class pattern → member patterns with a memo cache.
pub struct MemberMatcher {
    rules: Vec<ClassRule>,
    case: CaseMode,
    hierarchy: Arc<dyn TypeHierarchy>,
    cache: DashMap<(String, String), bool>,
}

impl MemberMatcher {
    /// Compile a resolved class→member table.
    pub fn new(table: &MemberTable, case: CaseMode, hierarchy: Arc<dyn TypeHierarchy>) -> Self {
        let rules = table
            .iter()
            .map(|(class, members)| {
                let class = normalize_class_name(class);
                let class = if class == WILDCARD {
                    ClassPattern::Any
                } else {
                    ClassPattern::Named(class.to_string())
                };
                let mut compiled: Vec<Pattern> = Vec::with_capacity(members.len());
                for member in members {
                    let pattern = Pattern::compile(member, case);
                    if !compiled.contains(&pattern) {
                        compiled.push(pattern);
                    }
                }
                ClassRule {
                    class,
                    members: compiled,
                }
            })
            .collect();

        Self {
            rules,
            case,
            hierarchy,
            cache: DashMap::new(),
        }
    }

    /// Method matching: member names compare case-insensitively.
    pub fn for_methods(table: &MemberTable, hierarchy: Arc<dyn TypeHierarchy>) -> Self {
        Self::new(table, CaseMode::Insensitive, hierarchy)
    }

    /// Property matching: member names compare case-sensitively.
    pub fn for_properties(table: &MemberTable, hierarchy: Arc<dyn TypeHierarchy>) -> Self {
        Self::new(table, CaseMode::Sensitive, hierarchy)
    }

    /// Whether `member` may be accessed on `object`.
    pub fn is_allowed(&self, object: &dyn SandboxObject, member: &str) -> bool {
        self.is_allowed_for_class(object.class_name(), member)
    }

    /// Same as [`is_allowed`](Self::is_allowed), keyed by the concrete type name.
    pub fn is_allowed_for_class(&self, class: &str, member: &str) -> bool {
        let class = normalize_class_name(class);
        let member = self.case.normalize(member);
        let key = (class.to_string(), member.into_owned());

        if let Some(hit) = self.cache.get(&key) {
            return *hit;
        }

        let allowed = self.evaluate(&key.0, &key.1);
        tracing::debug!(class = %key.0, member = %key.1, allowed, "member cache miss");
        // Concurrent misses on the same key compute the same value.
        self.cache.insert(key, allowed);
        allowed
    }

    fn evaluate(&self, class: &str, member: &str) -> bool {
        self.rules.iter().any(|rule| {
            self.class_matches(&rule.class, class) && rule.members.iter().any(|p| p.matches(member))
        })
    }

    fn class_matches(&self, pattern: &ClassPattern, class: &str) -> bool {
        match pattern {
            ClassPattern::Any => true,
            ClassPattern::Named(declared) => {
                declared == class || self.hierarchy.type_compatible(class, declared)
            }
        }
    }

    pub fn case_mode(&self) -> CaseMode {
        self.case
    }

    /// Number of class entries.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of memoized answers.
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

impl fmt::Debug for MemberMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberMatcher")
            .field("rules", &self.rules)
            .field("case", &self.case)
            .field("cached_entries", &self.cache.len())
            .finish()
    }
}
