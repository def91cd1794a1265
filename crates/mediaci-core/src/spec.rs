//! Build and test specification types.
//!
//! These types represent the declarative registry configuration: which
//! products are built, on which worker pools, and for which branches.

use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Product type of a build, e.g. `public_linux` or `public_linux_driver`.
///
/// Test specifications are triggered by builds that share this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ProductType(String);

impl ProductType {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProductType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BuildType {
    #[default]
    Release,
    Debug,
}

impl BuildType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildType::Release => "release",
            BuildType::Debug => "debug",
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether a branch is eligible for a build.
///
/// Every variant except `Custom` round-trips through the registry file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BranchPredicate {
    /// Every branch is eligible.
    #[default]
    Any,
    Exact(String),
    Prefix(String),
    /// Shell-style pattern; see [`glob_match`].
    Glob(String),
    AnyOf(Vec<BranchPredicate>),
    Not(Box<BranchPredicate>),
    #[serde(skip)]
    Custom(CustomPredicate),
}

impl BranchPredicate {
    pub fn exact(branch: impl Into<String>) -> Self {
        BranchPredicate::Exact(branch.into())
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        BranchPredicate::Prefix(prefix.into())
    }

    pub fn glob(pattern: impl Into<String>) -> Self {
        BranchPredicate::Glob(pattern.into())
    }

    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        BranchPredicate::Custom(CustomPredicate {
            name: name.into(),
            func: Arc::new(func),
        })
    }

    /// Evaluate the predicate against a branch name.
    pub fn matches(&self, branch: &str) -> bool {
        match self {
            BranchPredicate::Any => true,
            BranchPredicate::Exact(name) => name == branch,
            BranchPredicate::Prefix(prefix) => branch.starts_with(prefix.as_str()),
            BranchPredicate::Glob(pattern) => glob_match(pattern, branch),
            BranchPredicate::AnyOf(predicates) => predicates.iter().any(|p| p.matches(branch)),
            BranchPredicate::Not(inner) => !inner.matches(branch),
            BranchPredicate::Custom(custom) => (custom.func)(branch),
        }
    }
}

/// Escape hatch for branch rules that cannot be expressed declaratively.
#[derive(Clone)]
pub struct CustomPredicate {
    name: String,
    func: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl CustomPredicate {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPredicate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl JsonSchema for CustomPredicate {
    fn schema_name() -> String {
        "CustomPredicate".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        generator.subschema_for::<String>()
    }
}

/// Match a branch against a glob pattern.
///
/// `*` and `?` stay within one path segment, `**` spans segments and a
/// leading `**/` also matches no segment at all.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    match Regex::new(&glob_to_regex(pattern)) {
        Ok(re) => re.is_match(text),
        Err(_) => pattern == text,
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut rest = pattern;
    while let Some(c) = rest.chars().next() {
        if let Some(tail) = rest.strip_prefix("**/") {
            out.push_str("(?:.*/)?");
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("**") {
            out.push_str(".*");
            rest = tail;
        } else {
            match c {
                '*' => out.push_str("[^/]*"),
                '?' => out.push_str("[^/]"),
                _ => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
            rest = &rest[c.len_utf8()..];
        }
    }
    out.push('$');
    out
}

/// One buildable product configuration.
///
/// `name` doubles as the scheduling channel name and must be unique across
/// the registry.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BuildSpecification {
    pub name: String,
    pub product_type: ProductType,
    #[serde(default)]
    pub build_type: BuildType,
    #[serde(default)]
    pub branches: BranchPredicate,
    /// Repositories whose changes trigger this build. Empty means all.
    #[serde(default)]
    pub repositories: Vec<String>,
    pub worker_pool: String,
    pub compiler: String,
    pub compiler_version: String,
    #[serde(default)]
    pub api_latest: bool,
    #[serde(default)]
    pub fastboot: bool,
    /// Path of the product configuration, relative to the product-configs checkout.
    pub product_conf_file: String,
    /// Component name when the build produces a dependency tracked by the manifest.
    #[serde(default)]
    pub dependency_name: Option<String>,
    /// Builds that must succeed before this one starts.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl BuildSpecification {
    pub fn new(
        name: impl Into<String>,
        product_type: impl Into<ProductType>,
        worker_pool: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            product_type: product_type.into(),
            build_type: BuildType::Release,
            branches: BranchPredicate::Any,
            repositories: vec![],
            worker_pool: worker_pool.into(),
            compiler: "gcc".to_string(),
            compiler_version: "6.3.1".to_string(),
            api_latest: false,
            fastboot: false,
            product_conf_file: "conf_linux_public.py".to_string(),
            dependency_name: None,
            depends_on: vec![],
        }
    }

    pub fn with_branches(mut self, branches: BranchPredicate) -> Self {
        self.branches = branches;
        self
    }

    pub fn with_build_type(mut self, build_type: BuildType) -> Self {
        self.build_type = build_type;
        self
    }

    pub fn with_repositories(mut self, repositories: &[&str]) -> Self {
        self.repositories = repositories.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_api_latest(mut self, enabled: bool) -> Self {
        self.api_latest = enabled;
        self
    }

    pub fn with_fastboot(mut self, enabled: bool) -> Self {
        self.fastboot = enabled;
        self
    }

    pub fn with_depends_on(mut self, builds: &[&str]) -> Self {
        self.depends_on = builds.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_dependency_name(mut self, component: impl Into<String>) -> Self {
        self.dependency_name = Some(component.into());
        self
    }

    /// Whether a change on `branch` should build this specification.
    pub fn is_eligible(&self, branch: &str) -> bool {
        self.branches.matches(branch)
    }

    pub fn watches(&self, repository: &str) -> bool {
        self.repositories.is_empty() || self.repositories.iter().any(|r| r == repository)
    }
}

/// Which command family a test runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TestFactoryKind {
    /// A single `test_adapter.py` run against the published build.
    #[default]
    Adapter,
    /// `tests_runner.py` once per driver test stage.
    Driver,
}

/// One post-build validation run.
///
/// A test with an empty `triggered_by` follows every successful build of its
/// product type. Otherwise it runs once per event, after all the listed
/// builds have succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TestSpecification {
    pub name: String,
    pub product_type: ProductType,
    #[serde(default)]
    pub build_type: BuildType,
    pub worker_pool: String,
    #[serde(default)]
    pub factory: TestFactoryKind,
    #[serde(default)]
    pub triggered_by: Vec<String>,
}

impl TestSpecification {
    pub fn new(
        name: impl Into<String>,
        product_type: impl Into<ProductType>,
        worker_pool: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            product_type: product_type.into(),
            build_type: BuildType::Release,
            worker_pool: worker_pool.into(),
            factory: TestFactoryKind::Adapter,
            triggered_by: vec![],
        }
    }

    pub fn with_factory(mut self, factory: TestFactoryKind) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_triggered_by(mut self, builds: &[&str]) -> Self {
        self.triggered_by = builds.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Whether the test waits on named upstream builds rather than a product type.
    pub fn has_upstream_builds(&self) -> bool {
        !self.triggered_by.is_empty()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Os {
    #[default]
    Linux,
    Windows,
}

impl Os {
    /// Render a path with this platform's separator.
    pub fn render_path(&self, path: &Path) -> String {
        let rendered = path.display().to_string();
        match self {
            Os::Linux => rendered,
            Os::Windows => rendered.replace('/', "\\"),
        }
    }
}

/// An execution worker within a pool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerDefinition {
    pub name: String,
    /// Concurrent builds allowed on this worker.
    #[serde(default = "default_max_builds")]
    pub max_builds: u32,
    #[serde(default)]
    pub os: Os,
}

fn default_max_builds() -> u32 {
    1
}

impl WorkerDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_builds: default_max_builds(),
            os: Os::Linux,
        }
    }
}
