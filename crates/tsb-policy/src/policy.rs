// policy.rs — The security policy consulted for sandboxed templates.
//
// One policy answers five questions: may this template use these tags,
// filters, and functions (checked together, once per compiled template), and
// may it call this method / read this property (checked per access while
// rendering). Everything is default deny.
//
// A policy is immutable once built. Reconfiguration builds a new value (the
// `with_allowed_*` methods) which `PolicyHandle` then publishes atomically.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::defaults::{BuiltinDefaults, CategoryConfig, MemberCategoryConfig};
use crate::error::SecurityError;
use crate::member::{MemberMatcher, SandboxObject, TypeHierarchy};
use crate::pattern::NameAllowList;

/// Per-category configuration the policy is assembled from.
///
/// Every category defaults to "built-in defaults only".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub tags: CategoryConfig,
    #[serde(default)]
    pub filters: CategoryConfig,
    #[serde(default)]
    pub functions: CategoryConfig,
    #[serde(default)]
    pub methods: MemberCategoryConfig,
    #[serde(default)]
    pub properties: MemberCategoryConfig,
}

/// Default-deny policy over template constructs and object members.
#[derive(Clone)]
pub struct SecurityPolicy {
    tags: NameAllowList,
    filters: NameAllowList,
    functions: NameAllowList,
    methods: Arc<MemberMatcher>,
    properties: Arc<MemberMatcher>,
    defaults: Arc<BuiltinDefaults>,
    hierarchy: Arc<dyn TypeHierarchy>,
}

impl SecurityPolicy {
    /// Merge `config` with `defaults` and compile every category.
    pub fn from_config(
        config: &PolicyConfig,
        defaults: Arc<BuiltinDefaults>,
        hierarchy: Arc<dyn TypeHierarchy>,
    ) -> Self {
        let tags = NameAllowList::new(config.tags.resolve(&defaults.tags));
        let filters = NameAllowList::new(config.filters.resolve(&defaults.filters));
        let functions = NameAllowList::new(config.functions.resolve(&defaults.functions));
        let methods = MemberMatcher::for_methods(
            &config.methods.resolve(&defaults.methods),
            hierarchy.clone(),
        );
        let properties = MemberMatcher::for_properties(
            &config.properties.resolve(&defaults.properties),
            hierarchy.clone(),
        );

        tracing::debug!(
            tags = tags.len(),
            filters = filters.len(),
            functions = functions.len(),
            method_classes = methods.len(),
            property_classes = properties.len(),
            "assembled sandbox security policy"
        );

        Self {
            tags,
            filters,
            functions,
            methods: Arc::new(methods),
            properties: Arc::new(properties),
            defaults,
            hierarchy,
        }
    }

    /// A policy that denies every construct and member.
    pub fn deny_all(hierarchy: Arc<dyn TypeHierarchy>) -> Self {
        let nothing = PolicyConfig {
            tags: CategoryConfig::only(Vec::<String>::new()),
            filters: CategoryConfig::only(Vec::<String>::new()),
            functions: CategoryConfig::only(Vec::<String>::new()),
            methods: MemberCategoryConfig::only(Vec::<(String, Vec<String>)>::new()),
            properties: MemberCategoryConfig::only(Vec::<(String, Vec<String>)>::new()),
        };
        Self::from_config(&nothing, Arc::new(BuiltinDefaults::empty()), hierarchy)
    }

    /// Validate everything a compiled template references.
    ///
    /// Tags are checked first, then filters, then functions. The first name
    /// that is not allowed aborts the check; later names are not evaluated.
    pub fn check_structural<T, F, N>(
        &self,
        tags: T,
        filters: F,
        functions: N,
    ) -> Result<(), SecurityError>
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
        N: IntoIterator,
        N::Item: AsRef<str>,
    {
        if let Some(tag) = first_denied(&self.tags, tags) {
            return Err(denied(SecurityError::TagNotAllowed { tag }));
        }
        if let Some(filter) = first_denied(&self.filters, filters) {
            return Err(denied(SecurityError::FilterNotAllowed { filter }));
        }
        if let Some(function) = first_denied(&self.functions, functions) {
            return Err(denied(SecurityError::FunctionNotAllowed { function }));
        }
        Ok(())
    }

    /// Every structural violation, in the order `check_structural` would meet them.
    ///
    /// Diagnostic only; enforcement goes through `check_structural`.
    pub fn structural_violations<T, F, N>(
        &self,
        tags: T,
        filters: F,
        functions: N,
    ) -> Vec<SecurityError>
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
        N: IntoIterator,
        N::Item: AsRef<str>,
    {
        let tags = all_denied(&self.tags, tags)
            .into_iter()
            .map(|tag| SecurityError::TagNotAllowed { tag });
        let filters = all_denied(&self.filters, filters)
            .into_iter()
            .map(|filter| SecurityError::FilterNotAllowed { filter });
        let functions = all_denied(&self.functions, functions)
            .into_iter()
            .map(|function| SecurityError::FunctionNotAllowed { function });
        tags.chain(filters).chain(functions).collect()
    }

    /// Validate a method call on a runtime object.
    pub fn check_method(
        &self,
        object: &dyn SandboxObject,
        method: &str,
    ) -> Result<(), SecurityError> {
        if self.methods.is_allowed(object, method) {
            return Ok(());
        }
        Err(denied(SecurityError::MethodNotAllowed {
            class: object.class_name().to_string(),
            method: method.to_string(),
        }))
    }

    /// Validate a property read on a runtime object.
    pub fn check_property(
        &self,
        object: &dyn SandboxObject,
        property: &str,
    ) -> Result<(), SecurityError> {
        if self.properties.is_allowed(object, property) {
            return Ok(());
        }
        Err(denied(SecurityError::PropertyNotAllowed {
            class: object.class_name().to_string(),
            property: property.to_string(),
        }))
    }

    pub fn is_tag_allowed(&self, tag: &str) -> bool {
        self.tags.is_allowed(tag)
    }

    pub fn is_filter_allowed(&self, filter: &str) -> bool {
        self.filters.is_allowed(filter)
    }

    pub fn is_function_allowed(&self, function: &str) -> bool {
        self.functions.is_allowed(function)
    }

    pub fn tags(&self) -> &NameAllowList {
        &self.tags
    }

    pub fn filters(&self) -> &NameAllowList {
        &self.filters
    }

    pub fn functions(&self) -> &NameAllowList {
        &self.functions
    }

    pub fn methods(&self) -> &MemberMatcher {
        &self.methods
    }

    pub fn properties(&self) -> &MemberMatcher {
        &self.properties
    }

    /// A copy of this policy with the tag allow-list replaced.
    pub fn with_allowed_tags(&self, config: &CategoryConfig) -> Self {
        Self {
            tags: NameAllowList::new(config.resolve(&self.defaults.tags)),
            ..self.clone()
        }
    }

    pub fn with_allowed_filters(&self, config: &CategoryConfig) -> Self {
        Self {
            filters: NameAllowList::new(config.resolve(&self.defaults.filters)),
            ..self.clone()
        }
    }

    pub fn with_allowed_functions(&self, config: &CategoryConfig) -> Self {
        Self {
            functions: NameAllowList::new(config.resolve(&self.defaults.functions)),
            ..self.clone()
        }
    }

    /// A copy with the method allow-list replaced. The property matcher (and
    /// its cache) is shared with `self`.
    pub fn with_allowed_methods(&self, config: &MemberCategoryConfig) -> Self {
        let table = config.resolve(&self.defaults.methods);
        Self {
            methods: Arc::new(MemberMatcher::for_methods(&table, self.hierarchy.clone())),
            ..self.clone()
        }
    }

    pub fn with_allowed_properties(&self, config: &MemberCategoryConfig) -> Self {
        let table = config.resolve(&self.defaults.properties);
        Self {
            properties: Arc::new(MemberMatcher::for_properties(&table, self.hierarchy.clone())),
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for SecurityPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityPolicy")
            .field("tags", &self.tags)
            .field("filters", &self.filters)
            .field("functions", &self.functions)
            .field("methods", &self.methods)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

fn first_denied<I>(list: &NameAllowList, names: I) -> Option<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    if list.allows_any() {
        return None;
    }
    names
        .into_iter()
        .find(|name| !list.is_allowed(name.as_ref()))
        .map(|name| name.as_ref().to_string())
}

fn all_denied<I>(list: &NameAllowList, names: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    if list.allows_any() {
        return Vec::new();
    }
    names
        .into_iter()
        .filter(|name| !list.is_allowed(name.as_ref()))
        .map(|name| name.as_ref().to_string())
        .collect()
}

fn denied(err: SecurityError) -> SecurityError {
    tracing::warn!(
        kind = err.kind(),
        name = err.offending_name(),
        class = err.class_name().unwrap_or_default(),
        "sandbox policy denied access"
    );
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{FlatHierarchy, TypeRegistry};
    use crate::pattern::CaseMode;

    const NONE: &[&str] = &[];

    struct Obj(&'static str);

    impl SandboxObject for Obj {
        fn class_name(&self) -> &str {
            self.0
        }
    }

    /// Helper: policy from standard defaults with an optional config tweak.
    fn standard(config: PolicyConfig) -> SecurityPolicy {
        SecurityPolicy::from_config(
            &config,
            Arc::new(BuiltinDefaults::standard()),
            Arc::new(FlatHierarchy),
        )
    }

    #[test]
    fn default_filters_reject_map() {
        let policy = standard(PolicyConfig::default());
        match policy.check_structural(NONE, ["map"], NONE) {
            Err(SecurityError::FilterNotAllowed { filter }) => assert_eq!(filter, "map"),
            other => panic!("expected FilterNotAllowed, got {:?}", other),
        }
    }

    #[test]
    fn default_filters_accept_upper() {
        let policy = standard(PolicyConfig::default());
        assert!(policy.check_structural(NONE, ["upper"], NONE).is_ok());
    }

    #[test]
    fn default_tags_reject_include_and_extends() {
        let policy = standard(PolicyConfig::default());
        for tag in ["include", "extends"] {
            match policy.check_structural([tag], NONE, NONE) {
                Err(SecurityError::TagNotAllowed { tag: name }) => assert_eq!(name, tag),
                other => panic!("expected TagNotAllowed, got {:?}", other),
            }
        }
        assert!(policy.check_structural(["if", "for", "set"], NONE, NONE).is_ok());
    }

    #[test]
    fn default_functions_reject_include() {
        let policy = standard(PolicyConfig::default());
        match policy.check_structural(NONE, NONE, ["range", "include"]) {
            Err(SecurityError::FunctionNotAllowed { function }) => assert_eq!(function, "include"),
            other => panic!("expected FunctionNotAllowed, got {:?}", other),
        }
    }

    #[test]
    fn structural_check_fails_on_first_name() {
        let policy = standard(PolicyConfig::default());
        // Tags are checked before filters, and only the first bad name is reported.
        let err = policy
            .check_structural(["if", "include", "extends"], ["map"], NONE)
            .unwrap_err();
        assert_eq!(
            err,
            SecurityError::TagNotAllowed {
                tag: "include".to_string()
            }
        );
    }

    #[test]
    fn structural_violations_lists_everything() {
        let policy = standard(PolicyConfig::default());
        let violations =
            policy.structural_violations(["include", "extends"], ["map", "upper"], ["source"]);
        let names: Vec<&str> = violations.iter().map(SecurityError::offending_name).collect();
        assert_eq!(names, vec!["include", "extends", "map", "source"]);
    }

    #[test]
    fn wildcard_category_skips_name_checks() {
        let policy = standard(PolicyConfig {
            functions: CategoryConfig::only(["*"]),
            ..PolicyConfig::default()
        });
        assert!(policy
            .check_structural(NONE, NONE, ["include", "source", "anything"])
            .is_ok());
    }

    #[test]
    fn explicit_list_replaces_defaults() {
        let policy = standard(PolicyConfig {
            filters: CategoryConfig::only(["lower"]),
            ..PolicyConfig::default()
        });
        assert!(policy.is_filter_allowed("lower"));
        assert!(!policy.is_filter_allowed("upper"));
    }

    #[test]
    fn marker_list_extends_defaults() {
        let policy = standard(PolicyConfig {
            tags: CategoryConfig::defaults_and(["cache"]),
            ..PolicyConfig::default()
        });
        assert!(policy.is_tag_allowed("cache"));
        assert!(policy.is_tag_allowed("if"));
        assert!(!policy.is_tag_allowed("include"));
    }

    #[test]
    fn method_wildcard_class_with_getter_prefix() {
        let policy = standard(PolicyConfig {
            methods: MemberCategoryConfig::only([("*", ["get*"])]),
            ..PolicyConfig::default()
        });
        assert!(policy.check_method(&Obj("App\\Models\\Post"), "getTitle").is_ok());
        match policy.check_method(&Obj("App\\Models\\Post"), "setTitle") {
            Err(SecurityError::MethodNotAllowed { class, method }) => {
                assert_eq!(class, "App\\Models\\Post");
                assert_eq!(method, "setTitle");
            }
            other => panic!("expected MethodNotAllowed, got {:?}", other),
        }
    }

    #[test]
    fn property_check_is_case_sensitive() {
        let policy = standard(PolicyConfig {
            properties: MemberCategoryConfig::only([("Post", ["Title"])]),
            ..PolicyConfig::default()
        });
        assert!(policy.check_property(&Obj("Post"), "Title").is_ok());
        match policy.check_property(&Obj("Post"), "title") {
            Err(SecurityError::PropertyNotAllowed { class, property }) => {
                assert_eq!(class, "Post");
                assert_eq!(property, "title");
            }
            other => panic!("expected PropertyNotAllowed, got {:?}", other),
        }
    }

    #[test]
    fn default_method_table_covers_date_subclasses() {
        let registry = TypeRegistry::new()
            .with_type("Carbon\\Carbon", ["Carbon\\CarbonInterface", "DateTime"])
            .with_type("DateTime", ["DateTimeInterface"]);
        let policy = SecurityPolicy::from_config(
            &PolicyConfig::default(),
            Arc::new(BuiltinDefaults::standard()),
            Arc::new(registry),
        );
        let now = Obj("Carbon\\Carbon");
        assert!(policy.check_method(&now, "format").is_ok());
        assert!(policy.check_method(&now, "getTimestamp").is_ok());
        assert!(policy.check_method(&now, "diffForHumans").is_ok());
        assert!(policy.check_method(&now, "setTimezone").is_err());
    }

    #[test]
    fn introspection_reports_compiled_lists() {
        let policy = standard(PolicyConfig {
            tags: CategoryConfig::only(["if", "for"]),
            filters: CategoryConfig::only(["*"]),
            functions: CategoryConfig::only(Vec::<String>::new()),
            ..PolicyConfig::default()
        });

        let mut tags: Vec<&str> = policy.tags().iter().collect();
        tags.sort_unstable();
        assert_eq!(tags, ["for", "if"]);
        assert!(!policy.tags().allows_any());

        assert!(policy.filters().allows_any());
        assert_eq!(policy.filters().len(), 0);

        assert!(policy.functions().is_empty());
        assert_eq!(policy.functions().iter().count(), 0);

        assert_eq!(policy.methods().case_mode(), CaseMode::Insensitive);
        assert_eq!(policy.properties().case_mode(), CaseMode::Sensitive);
    }

    #[test]
    fn deny_all_denies_everything() {
        let policy = SecurityPolicy::deny_all(Arc::new(FlatHierarchy));
        assert!(policy.check_structural(["if"], NONE, NONE).is_err());
        assert!(policy.check_structural(NONE, ["upper"], NONE).is_err());
        assert!(policy.check_structural(NONE, NONE, ["range"]).is_err());
        assert!(policy.check_method(&Obj("stdClass"), "x").is_err());
        assert!(policy.check_property(&Obj("stdClass"), "x").is_err());
        assert!(policy.check_structural(NONE, NONE, NONE).is_ok());
    }

    #[test]
    fn with_allowed_methods_keeps_property_cache() {
        let policy = standard(PolicyConfig::default());
        assert!(policy.check_property(&Obj("stdClass"), "name").is_ok());
        assert_eq!(policy.properties().cached_entries(), 1);

        let updated = policy.with_allowed_methods(&MemberCategoryConfig::only([("Post", ["save"])]));
        assert!(updated.check_method(&Obj("Post"), "save").is_ok());
        assert!(policy.check_method(&Obj("Post"), "save").is_err());
        // Property matcher is shared, warm cache and all.
        assert_eq!(updated.properties().cached_entries(), 1);
    }

    #[test]
    fn with_allowed_tags_leaves_original_untouched() {
        let policy = standard(PolicyConfig::default());
        let updated = policy.with_allowed_tags(&CategoryConfig::only(["include"]));
        assert!(updated.is_tag_allowed("include"));
        assert!(!updated.is_tag_allowed("if"));
        assert!(!policy.is_tag_allowed("include"));
        assert!(policy.is_tag_allowed("if"));
    }

    #[test]
    fn policy_config_parses_from_yaml() {
        let yaml = r#"
tags: ["@defaults", "cache"]
filters: [upper]
methods:
  - "@defaults"
  - 'App\Post': ["get*"]
"#;
        let config: PolicyConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.tags.include_defaults);
        assert_eq!(config.filters, CategoryConfig::only(["upper"]));
        assert_eq!(config.functions, CategoryConfig::defaults_only());
        assert!(config.methods.include_defaults);
        assert_eq!(config.properties, MemberCategoryConfig::defaults_only());

        let policy = standard(config);
        assert!(policy.check_method(&Obj("App\\Post"), "getSlug").is_ok());
        assert!(policy.check_structural(["cache"], ["upper"], NONE).is_ok());
        assert!(policy.check_structural(NONE, ["lower"], NONE).is_err());
    }

    #[test]
    fn shared_policy_answers_concurrently() {
        let policy = standard(PolicyConfig {
            methods: MemberCategoryConfig::only([("*", ["get*"])]),
            ..PolicyConfig::default()
        });
        std::thread::scope(|scope| {
            for i in 0..8 {
                let policy = &policy;
                scope.spawn(move || {
                    let class = if i % 2 == 0 { "Post" } else { "Page" };
                    for _ in 0..50 {
                        assert!(policy.check_method(&Obj(class), "getTitle").is_ok());
                        assert!(policy.check_method(&Obj(class), "delete").is_err());
                        assert!(policy.check_structural(["if"], ["upper"], ["range"]).is_ok());
                    }
                });
            }
        });
        assert_eq!(policy.methods().cached_entries(), 4);
    }
}
