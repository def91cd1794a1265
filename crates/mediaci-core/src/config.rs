//! Orchestrator configuration.
//!
//! Loaded from the `orchestrator` section of the registry file. Every field
//! has a default so the section may be omitted.

use crate::spec::{BranchPredicate, Os, glob_match};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Global parameters of the generated commands.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FactoryConfig {
    /// Interpreter used to launch infrastructure scripts.
    #[serde(default = "default_run_command")]
    pub run_command: String,
    /// Per-platform interpreters, overriding `run_command` on those workers.
    #[serde(default)]
    pub run_commands: BTreeMap<Os, String>,
    /// Build directory on the worker.
    #[serde(default = "default_build_root")]
    pub build_root: PathBuf,
    /// Shared storage where build artifacts are published.
    #[serde(default = "default_builds_root")]
    pub builds_root: PathBuf,
    #[serde(default = "default_build_event")]
    pub build_event: String,
    /// Prepend a `deploying infrastructure` step to every plan.
    #[serde(default = "default_true")]
    pub deploy_infrastructure: bool,
    #[serde(default = "default_infrastructure_repo")]
    pub infrastructure_repo: String,
    #[serde(default = "default_product_configs_repo")]
    pub product_configs_repo: String,
    /// Component manifest, relative to `build_root`.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,
}

fn default_run_command() -> String {
    "python3".to_string()
}
fn default_build_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_builds_root() -> PathBuf {
    PathBuf::from("/media/builds")
}
fn default_build_event() -> String {
    "commit".to_string()
}
fn default_true() -> bool {
    true
}
fn default_infrastructure_repo() -> String {
    "OPEN_SOURCE_INFRA".to_string()
}
fn default_product_configs_repo() -> String {
    "product-configs".to_string()
}
fn default_manifest_path() -> PathBuf {
    PathBuf::from("product-configs/manifest.yml")
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            run_command: default_run_command(),
            run_commands: BTreeMap::new(),
            build_root: default_build_root(),
            builds_root: default_builds_root(),
            build_event: default_build_event(),
            deploy_infrastructure: true,
            infrastructure_repo: default_infrastructure_repo(),
            product_configs_repo: default_product_configs_repo(),
            manifest_path: default_manifest_path(),
        }
    }
}

impl FactoryConfig {
    pub fn run_command_for(&self, os: Os) -> &str {
        self.run_commands.get(&os).unwrap_or(&self.run_command)
    }
}

/// Which changes are admitted from the change sources.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChangeFilterConfig {
    /// Watched repository names. Empty admits every repository.
    #[serde(default)]
    pub repositories: Vec<String>,
    /// Polled branches, matched against the name without `refs/heads/`.
    #[serde(default = "default_polled_branches")]
    pub branches: Vec<BranchPredicate>,
    /// Admit `refs/pull/<n>/head` changes.
    #[serde(default = "default_true")]
    pub pull_requests: bool,
    /// Glob patterns per repository. A change to a listed repository is
    /// admitted only if one of its files matches.
    #[serde(default)]
    pub file_filters: BTreeMap<String, Vec<String>>,
}

fn default_polled_branches() -> Vec<BranchPredicate> {
    vec![
        BranchPredicate::exact("master"),
        BranchPredicate::glob("release/**"),
    ]
}

impl Default for ChangeFilterConfig {
    fn default() -> Self {
        Self {
            repositories: vec![],
            branches: default_polled_branches(),
            pull_requests: true,
            file_filters: BTreeMap::new(),
        }
    }
}

impl ChangeFilterConfig {
    /// Whether `files` contain a change relevant to `repository`.
    pub fn files_relevant(&self, repository: &str, files: &[String]) -> bool {
        match self.file_filters.get(repository) {
            Some(patterns) => files
                .iter()
                .any(|file| patterns.iter().any(|p| glob_match(p, file))),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub factory: FactoryConfig,
    #[serde(default)]
    pub change_filter: ChangeFilterConfig,
    /// Run the preliminary trigger build (checkout and pre-commit checks)
    /// before fanning out.
    #[serde(default = "default_true")]
    pub trigger_checks: bool,
    /// Pool the trigger build leases a worker from. Runs on the orchestrator
    /// host when unset.
    #[serde(default)]
    pub trigger_pool: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            factory: FactoryConfig::default(),
            change_filter: ChangeFilterConfig::default(),
            trigger_checks: true,
            trigger_pool: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn without_trigger_checks(mut self) -> Self {
        self.trigger_checks = false;
        self
    }
}
