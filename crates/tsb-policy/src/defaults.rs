// defaults.rs — Built-in allow-lists and the defaults merger.
//
// Configuration for each category says two things: whether to start from the
// built-in defaults, and which extra entries to add. The raw on-disk form is a
// list that may contain the reserved `@defaults` marker; it is scanned once
// when the configuration is deserialized and never again.
//
// Merging is a set union. It never infers a broader permission than what was
// listed or defaulted: malformed entries are dropped, not widened.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Reserved list entry meaning "include the built-in defaults for this category".
///
/// Not a legal identifier in the template language, so it cannot collide with
/// a real tag, filter, function, class, or member name.
pub const DEFAULTS_MARKER: &str = "@defaults";

/// Class-keyed allow-list: class pattern → member patterns.
pub type MemberTable = BTreeMap<String, BTreeSet<String>>;

/// Strip leading namespace separators from a class name (`\App\Post` → `App\Post`).
pub fn normalize_class_name(name: &str) -> &str {
    name.trim_start_matches('\\')
}

// ── Flat categories (tags / filters / functions) ──

/// Resolved configuration for a flat category.
///
/// Deserializes from a raw list (`["@defaults", "cache"]`) or from the
/// explicit form (`{ include_defaults: true, extra: [...] }`). Serializes
/// back to the raw list form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawCategory", into = "Vec<String>")]
pub struct CategoryConfig {
    /// Start from the built-in defaults.
    pub include_defaults: bool,
    /// Entries listed alongside (or instead of) the defaults.
    pub extra: Vec<String>,
}

impl Default for CategoryConfig {
    /// An absent category means "defaults only".
    fn default() -> Self {
        Self::defaults_only()
    }
}

impl CategoryConfig {
    pub fn defaults_only() -> Self {
        Self {
            include_defaults: true,
            extra: Vec::new(),
        }
    }

    /// Only the given entries; the defaults are replaced, not extended.
    pub fn only<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include_defaults: false,
            extra: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// The defaults plus the given entries.
    pub fn defaults_and<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include_defaults: true,
            extra: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a raw list into the explicit form, removing every marker occurrence.
    pub fn from_raw<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut include_defaults = false;
        let mut extra = Vec::new();
        for entry in raw {
            let entry = entry.into();
            if entry == DEFAULTS_MARKER {
                include_defaults = true;
            } else {
                extra.push(entry);
            }
        }
        Self {
            include_defaults,
            extra,
        }
    }

    /// Resolve against the category's built-in defaults.
    pub fn resolve(&self, defaults: &BTreeSet<String>) -> BTreeSet<String> {
        let mut merged = if self.include_defaults {
            defaults.clone()
        } else {
            BTreeSet::new()
        };
        for entry in &self.extra {
            if entry.is_empty() {
                tracing::warn!("dropping empty allow-list entry");
                continue;
            }
            merged.insert(entry.clone());
        }
        merged
    }
}

/// Merge a raw flat list with a category's defaults.
///
/// With the marker present the result is the defaults unioned with every other
/// entry; without it, exactly the listed entries.
pub fn merge_names<I, S>(raw: I, defaults: &BTreeSet<String>) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CategoryConfig::from_raw(raw).resolve(defaults)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExplicitCategory {
    #[serde(default)]
    include_defaults: bool,
    #[serde(default)]
    extra: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCategory {
    List(Vec<String>),
    Explicit(ExplicitCategory),
}

impl From<RawCategory> for CategoryConfig {
    fn from(raw: RawCategory) -> Self {
        match raw {
            RawCategory::List(entries) => CategoryConfig::from_raw(entries),
            RawCategory::Explicit(explicit) => CategoryConfig {
                include_defaults: explicit.include_defaults,
                extra: explicit.extra,
            },
        }
    }
}

impl From<CategoryConfig> for Vec<String> {
    fn from(config: CategoryConfig) -> Self {
        let mut raw = Vec::with_capacity(config.extra.len() + 1);
        if config.include_defaults {
            raw.push(DEFAULTS_MARKER.to_string());
        }
        raw.extend(config.extra);
        raw
    }
}

// ── Class-keyed categories (methods / properties) ──

/// Resolved configuration for a class-keyed category.
///
/// Raw forms accepted:
///
/// ```yaml
/// # mapping: class → members (a single member may be a bare string)
/// methods:
///   'App\Models\Post': ["getTitle", "get*"]
///
/// # sequence mixing the bare marker with single-class mappings
/// methods:
///   - "@defaults"
///   - 'App\Models\Post': ["getTitle"]
///
/// # explicit form
/// methods:
///   include_defaults: true
///   extra:
///     'App\Models\Post': ["getTitle"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawMemberCategory", into = "ExplicitMemberCategory")]
pub struct MemberCategoryConfig {
    /// Start from the entire built-in class→member table.
    pub include_defaults: bool,
    /// Class entries layered on top; members for a shared class are unioned.
    pub extra: BTreeMap<String, Vec<String>>,
}

impl Default for MemberCategoryConfig {
    fn default() -> Self {
        Self::defaults_only()
    }
}

impl MemberCategoryConfig {
    pub fn defaults_only() -> Self {
        Self {
            include_defaults: true,
            extra: BTreeMap::new(),
        }
    }

    /// Only the given class entries.
    pub fn only<I, C, M, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (C, M)>,
        C: Into<String>,
        M: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Self {
            include_defaults: false,
            extra: BTreeMap::new(),
        };
        for (class, members) in entries {
            config.add(class, members);
        }
        config
    }

    /// Add members for a class, unioning with anything already listed.
    pub fn add<C, M, S>(&mut self, class: C, members: M) -> &mut Self
    where
        C: Into<String>,
        M: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra
            .entry(class.into())
            .or_default()
            .extend(members.into_iter().map(Into::into));
        self
    }

    /// Resolve against the built-in class→member table.
    pub fn resolve(&self, defaults: &MemberTable) -> MemberTable {
        let mut merged = if self.include_defaults {
            defaults.clone()
        } else {
            MemberTable::new()
        };
        for (class, members) in &self.extra {
            let class = normalize_class_name(class);
            if class.is_empty() {
                tracing::warn!("dropping allow-list entry with empty class name");
                continue;
            }
            let slot = merged.entry(class.to_string()).or_default();
            for member in members {
                if member.is_empty() {
                    tracing::warn!(class, "dropping empty member name");
                    continue;
                }
                slot.insert(member.clone());
            }
        }
        merged
    }
}

/// Merge raw class entries with the built-in table.
pub fn merge_members(config: &MemberCategoryConfig, defaults: &MemberTable) -> MemberTable {
    config.resolve(defaults)
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExplicitMemberCategory {
    #[serde(default)]
    include_defaults: bool,
    #[serde(default)]
    extra: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MemberNames {
    One(String),
    Many(Vec<String>),
}

impl MemberNames {
    fn into_vec(self) -> Vec<String> {
        match self {
            MemberNames::One(name) => vec![name],
            MemberNames::Many(names) => names,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMemberEntry {
    Bare(String),
    Classes(BTreeMap<String, MemberNames>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMemberCategory {
    Explicit(ExplicitMemberCategory),
    Table(BTreeMap<String, MemberNames>),
    Entries(Vec<RawMemberEntry>),
}

impl From<RawMemberCategory> for MemberCategoryConfig {
    fn from(raw: RawMemberCategory) -> Self {
        let mut config = MemberCategoryConfig {
            include_defaults: false,
            extra: BTreeMap::new(),
        };
        match raw {
            RawMemberCategory::Explicit(explicit) => {
                config.include_defaults = explicit.include_defaults;
                config.extra = explicit.extra;
            }
            RawMemberCategory::Table(table) => {
                for (class, members) in table {
                    config.add(class, members.into_vec());
                }
            }
            RawMemberCategory::Entries(entries) => {
                for entry in entries {
                    match entry {
                        RawMemberEntry::Bare(marker) if marker == DEFAULTS_MARKER => {
                            config.include_defaults = true;
                        }
                        RawMemberEntry::Bare(other) => {
                            tracing::warn!(entry = %other, "dropping bare entry without members");
                        }
                        RawMemberEntry::Classes(table) => {
                            for (class, members) in table {
                                config.add(class, members.into_vec());
                            }
                        }
                    }
                }
            }
        }
        config
    }
}

impl From<MemberCategoryConfig> for ExplicitMemberCategory {
    fn from(config: MemberCategoryConfig) -> Self {
        Self {
            include_defaults: config.include_defaults,
            extra: config.extra,
        }
    }
}

// ── Built-in defaults ──

/// The built-in allow-lists the `@defaults` marker expands to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltinDefaults {
    pub tags: BTreeSet<String>,
    pub filters: BTreeSet<String>,
    pub functions: BTreeSet<String>,
    pub methods: MemberTable,
    pub properties: MemberTable,
}

const STANDARD_TAGS: &[&str] = &[
    "apply",
    "autoescape",
    "block",
    "deprecated",
    "do",
    "for",
    "guard",
    "if",
    "macro",
    "set",
    "verbatim",
    "with",
];

// `map`, `filter`, `reduce` and `sort` accept arrow functions and stay out.
const STANDARD_FILTERS: &[&str] = &[
    "abs",
    "batch",
    "capitalize",
    "column",
    "date",
    "date_modify",
    "default",
    "e",
    "escape",
    "first",
    "format",
    "join",
    "json_encode",
    "keys",
    "last",
    "length",
    "lower",
    "merge",
    "nl2br",
    "number_format",
    "raw",
    "replace",
    "reverse",
    "round",
    "slice",
    "split",
    "striptags",
    "title",
    "trim",
    "upper",
    "url_encode",
];

const STANDARD_FUNCTIONS: &[&str] = &[
    "block", "cycle", "date", "max", "min", "parent", "random", "range",
];

const STANDARD_METHODS: &[(&str, &[&str])] = &[
    (
        "DateTimeInterface",
        &["format", "getTimestamp", "getTimezone", "getOffset"],
    ),
    (
        "Carbon\\CarbonInterface",
        &["format", "isoFormat", "diffForHumans", "get*", "is*", "to*"],
    ),
    ("Illuminate\\Support\\HtmlString", &["toHtml", "isEmpty", "__toString"]),
];

const STANDARD_PROPERTIES: &[(&str, &[&str])] = &[("stdClass", &["*"])];

fn name_set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn member_table(entries: &[(&str, &[&str])]) -> MemberTable {
    entries
        .iter()
        .map(|(class, members)| (class.to_string(), name_set(members)))
        .collect()
}

impl BuiltinDefaults {
    /// Safe constructs of a Twig-like host: no template inclusion or
    /// inheritance, no callable-accepting filters, no source/constant access.
    pub fn standard() -> Self {
        Self {
            tags: name_set(STANDARD_TAGS),
            filters: name_set(STANDARD_FILTERS),
            functions: name_set(STANDARD_FUNCTIONS),
            methods: member_table(STANDARD_METHODS),
            properties: member_table(STANDARD_PROPERTIES),
        }
    }

    /// No defaults at all; the marker expands to nothing.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{FlatHierarchy, MemberMatcher};
    use std::sync::Arc;

    fn set(names: &[&str]) -> BTreeSet<String> {
        name_set(names)
    }

    #[test]
    fn marker_unions_defaults_with_extras() {
        let defaults = set(&["if", "for"]);
        let merged = merge_names(["@defaults", "cache"], &defaults);
        assert_eq!(merged, set(&["cache", "for", "if"]));
    }

    #[test]
    fn missing_marker_replaces_defaults() {
        let defaults = set(&["if", "for"]);
        let merged = merge_names(["cache"], &defaults);
        assert_eq!(merged, set(&["cache"]));
    }

    #[test]
    fn merge_is_idempotent() {
        let defaults = set(&["if", "for"]);
        let once = merge_names(["@defaults", "cache"], &defaults);
        let twice = merge_names(["@defaults", "@defaults", "cache", "cache"], &defaults);
        assert_eq!(once, twice);

        // Feeding the merged set back in with the marker changes nothing.
        let mut again: Vec<String> = once.iter().cloned().collect();
        again.push(DEFAULTS_MARKER.to_string());
        assert_eq!(merge_names(again, &defaults), once);
    }

    #[test]
    fn merge_is_order_independent() {
        let defaults = set(&["if"]);
        let a = merge_names(["cache", "@defaults", "with"], &defaults);
        let b = merge_names(["with", "cache", "@defaults"], &defaults);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_entries_are_dropped_not_widened() {
        let merged = merge_names(["", "upper"], &BTreeSet::new());
        assert_eq!(merged, set(&["upper"]));
    }

    #[test]
    fn category_deserializes_from_raw_list() {
        let config: CategoryConfig = serde_yaml::from_str(r#"["@defaults", "cache"]"#).unwrap();
        assert!(config.include_defaults);
        assert_eq!(config.extra, vec!["cache".to_string()]);
    }

    #[test]
    fn category_deserializes_from_explicit_form() {
        let config: CategoryConfig =
            serde_yaml::from_str("include_defaults: false\nextra: [upper]").unwrap();
        assert_eq!(config, CategoryConfig::only(["upper"]));
    }

    #[test]
    fn category_serializes_back_to_marker_list() {
        let json = serde_json::to_string(&CategoryConfig::defaults_and(["cache"])).unwrap();
        assert_eq!(json, r#"["@defaults","cache"]"#);
    }

    #[test]
    fn member_marker_brings_whole_table_and_unions_shared_class() {
        let defaults = member_table(&[("Post", &["getTitle"]), ("Page", &["url"])]);
        let yaml = r#"
- "@defaults"
- Post: ["getSlug"]
- Author: name
"#;
        let config: MemberCategoryConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.include_defaults);

        let merged = merge_members(&config, &defaults);
        assert_eq!(merged["Post"], set(&["getSlug", "getTitle"]));
        assert_eq!(merged["Page"], set(&["url"]));
        assert_eq!(merged["Author"], set(&["name"]));
    }

    #[test]
    fn member_table_without_marker_replaces_defaults() {
        let defaults = member_table(&[("Page", &["url"])]);
        let config: MemberCategoryConfig =
            serde_yaml::from_str("'\\App\\Post': [getTitle]").unwrap();
        assert!(!config.include_defaults);

        let merged = config.resolve(&defaults);
        assert!(!merged.contains_key("Page"));
        // Leading namespace separator is normalized away.
        assert_eq!(merged["App\\Post"], set(&["getTitle"]));
    }

    #[test]
    fn member_explicit_form_round_trips() {
        let mut config = MemberCategoryConfig::defaults_only();
        config.add("Post", ["get*"]);
        let yaml = serde_yaml::to_string(&config).unwrap();
        let restored: MemberCategoryConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn bare_non_marker_member_entry_is_dropped() {
        let config: MemberCategoryConfig =
            serde_yaml::from_str(r#"["*", {Post: [title]}]"#).unwrap();
        // A bare "*" is not a class entry and must not become a wildcard allow.
        assert!(!config.include_defaults);
        assert_eq!(config.extra.len(), 1);
        assert!(config.extra.contains_key("Post"));
    }

    #[test]
    fn standard_defaults_exclude_dangerous_constructs() {
        let defaults = BuiltinDefaults::standard();
        for tag in ["include", "extends", "embed", "import", "sandbox"] {
            assert!(!defaults.tags.contains(tag), "tag {tag} should not be a default");
        }
        for filter in ["map", "filter", "reduce", "sort"] {
            assert!(!defaults.filters.contains(filter));
        }
        for function in ["include", "source", "constant", "template_from_string", "dump"] {
            assert!(!defaults.functions.contains(function));
        }
        assert!(defaults.filters.contains("upper"));
        assert!(defaults.tags.contains("if"));

        // Collection methods take callbacks, the same hole as `map`.
        let methods = MemberMatcher::for_methods(&defaults.methods, Arc::new(FlatHierarchy));
        for method in ["first", "last", "map", "each", "filter"] {
            assert!(
                !methods.is_allowed_for_class("Illuminate\\Support\\Collection", method),
                "Collection::{method} should not be a default"
            );
        }
        assert!(methods.is_allowed_for_class("Illuminate\\Support\\HtmlString", "toHtml"));
    }

    #[test]
    fn empty_class_keys_and_member_names_are_dropped() {
        let mut config = MemberCategoryConfig::only([("\\", ["title"])]);
        config.add("", ["name"]);
        config.add("Post", ["", "getTitle"]);

        let merged = config.resolve(&MemberTable::new());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged["Post"], set(&["getTitle"]));
        assert!(!merged.contains_key(""));
        assert!(!merged.contains_key("*"));

        let matcher = MemberMatcher::for_properties(&merged, Arc::new(FlatHierarchy));
        assert!(!matcher.is_allowed_for_class("Post", "title"));
        assert!(!matcher.is_allowed_for_class("Author", "name"));
        assert!(matcher.is_allowed_for_class("Post", "getTitle"));
    }
}
