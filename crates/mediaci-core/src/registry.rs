//! The build-specification registry.
//!
//! Loaded once at startup and immutable afterwards. Share it behind an `Arc`;
//! all queries take `&self` and need no synchronization.

use crate::config::OrchestratorConfig;
use crate::spec::{BuildSpecification, Os, ProductType, TestSpecification, WorkerDefinition};
use crate::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::info;

/// Channel name of the preliminary trigger build. No specification may use it.
pub const TRIGGER_CHANNEL: &str = "trigger";

/// Raw registry file contents, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RegistryConfig {
    /// Worker pools, each an ordered list of workers.
    #[serde(default)]
    pub pools: BTreeMap<String, Vec<WorkerDefinition>>,
    #[serde(default)]
    pub builds: Vec<BuildSpecification>,
    #[serde(default)]
    pub tests: Vec<TestSpecification>,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl RegistryConfig {
    pub fn with_pool(mut self, name: &str, workers: &[&str]) -> Self {
        self.pools.insert(
            name.to_string(),
            workers.iter().map(|w| WorkerDefinition::new(*w)).collect(),
        );
        self
    }

    pub fn with_build(mut self, build: BuildSpecification) -> Self {
        self.builds.push(build);
        self
    }

    pub fn with_test(mut self, test: TestSpecification) -> Self {
        self.tests.push(test);
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: OrchestratorConfig) -> Self {
        self.orchestrator = orchestrator;
        self
    }
}

/// Validated, read-only set of build and test specifications.
#[derive(Debug, Clone)]
pub struct Registry {
    pools: BTreeMap<String, Vec<WorkerDefinition>>,
    builds: Vec<BuildSpecification>,
    tests: Vec<TestSpecification>,
    orchestrator: OrchestratorConfig,
}

impl Registry {
    /// Validate a registry configuration.
    ///
    /// Fails on duplicate names, references to unknown or empty pools,
    /// workers that admit no builds, and dependencies on undeclared builds.
    pub fn load(config: RegistryConfig) -> Result<Self> {
        let RegistryConfig {
            pools,
            builds,
            tests,
            orchestrator,
        } = config;

        for (name, workers) in &pools {
            if workers.is_empty() {
                return Err(Error::EmptyPool(name.clone()));
            }
            if let Some(idle) = workers.iter().find(|w| w.max_builds == 0) {
                return Err(Error::InvalidSpecification(format!(
                    "worker {} in pool {} has max_builds 0",
                    idle.name, name
                )));
            }
        }

        if let Some(pool) = &orchestrator.trigger_pool
            && !pools.contains_key(pool)
        {
            return Err(Error::UnknownPool(pool.clone()));
        }

        let mut names = HashSet::new();
        names.insert(TRIGGER_CHANNEL.to_string());
        let declared = builds
            .iter()
            .map(|b| (&b.name, &b.worker_pool))
            .chain(tests.iter().map(|t| (&t.name, &t.worker_pool)));
        for (name, pool) in declared {
            if name.trim().is_empty() {
                return Err(Error::InvalidSpecification(
                    "specification name must not be empty".to_string(),
                ));
            }
            if !names.insert(name.clone()) {
                return Err(Error::AmbiguousName(name.clone()));
            }
            if !pools.contains_key(pool) {
                return Err(Error::UnknownPool(pool.clone()));
            }
        }

        let build_names: HashSet<&str> = builds.iter().map(|b| b.name.as_str()).collect();
        for build in &builds {
            for dependency in &build.depends_on {
                if !build_names.contains(dependency.as_str()) {
                    return Err(Error::UnknownBuilder {
                        builder: build.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        for test in &tests {
            for upstream in &test.triggered_by {
                if !build_names.contains(upstream.as_str()) {
                    return Err(Error::UnknownBuilder {
                        builder: test.name.clone(),
                        dependency: upstream.clone(),
                    });
                }
            }
        }

        info!(
            pools = pools.len(),
            builds = builds.len(),
            tests = tests.len(),
            "Registry loaded"
        );

        Ok(Self {
            pools,
            builds,
            tests,
            orchestrator,
        })
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: RegistryConfig = serde_yaml::from_str(contents)?;
        Self::load(config)
    }

    /// Load and validate a registry file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Build specifications in declaration order.
    pub fn builds(&self) -> &[BuildSpecification] {
        &self.builds
    }

    /// Test specifications in declaration order.
    pub fn tests(&self) -> &[TestSpecification] {
        &self.tests
    }

    pub fn build(&self, name: &str) -> Option<&BuildSpecification> {
        self.builds.iter().find(|b| b.name == name)
    }

    pub fn test(&self, name: &str) -> Option<&TestSpecification> {
        self.tests.iter().find(|t| t.name == name)
    }

    pub fn orchestrator(&self) -> &OrchestratorConfig {
        &self.orchestrator
    }

    pub fn pools(&self) -> impl Iterator<Item = (&str, &[WorkerDefinition])> {
        self.pools.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn worker_definitions(&self, pool_name: &str) -> Result<&[WorkerDefinition]> {
        self.pools
            .get(pool_name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnknownPool(pool_name.to_string()))
    }

    /// Platform of a worker. Unknown workers, like the trigger build's local
    /// worker, count as the default platform.
    pub fn worker_os(&self, pool_name: &str, worker: &str) -> Os {
        self.pools
            .get(pool_name)
            .and_then(|workers| workers.iter().find(|w| w.name == worker))
            .map(|w| w.os)
            .unwrap_or_default()
    }

    /// Platform plans for a pool are rendered with before a worker is leased.
    pub fn pool_os(&self, pool_name: &str) -> Os {
        self.pools
            .get(pool_name)
            .and_then(|workers| workers.first())
            .map(|w| w.os)
            .unwrap_or_default()
    }

    /// Worker names of a pool, in declaration order.
    pub fn workers_for(&self, pool_name: &str) -> Result<Vec<&str>> {
        Ok(self
            .worker_definitions(pool_name)?
            .iter()
            .map(|w| w.name.as_str())
            .collect())
    }

    /// Tests triggered by any successful build of `product_type`, in
    /// declaration order. Tests with named upstream builds are not included.
    pub fn tests_for(&self, product_type: &ProductType) -> Vec<&TestSpecification> {
        self.tests
            .iter()
            .filter(|t| !t.has_upstream_builds() && &t.product_type == product_type)
            .collect()
    }

    /// Tests whose upstream builds have all succeeded.
    pub fn tests_after(&self, succeeded: impl Fn(&str) -> bool) -> Vec<&TestSpecification> {
        self.tests
            .iter()
            .filter(|t| t.has_upstream_builds() && t.triggered_by.iter().all(|b| succeeded(b)))
            .collect()
    }

    /// Names of the tests a build of `product_type` triggers. Empty when none match.
    pub fn tests_triggered_by(&self, product_type: &ProductType) -> Vec<&str> {
        self.tests_for(product_type)
            .into_iter()
            .map(|t| t.name.as_str())
            .collect()
    }
}
