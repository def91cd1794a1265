//! Orchestration decision engine.
//!
//! Maps one change event to the builds that must run and the fully resolved
//! step sequence of each. Nothing in here performs I/O or holds locks; the
//! engine may be shared across concurrent events.

use crate::factory::StageFactory;
use mediaci_core::event::ChangeEvent;
use mediaci_core::registry::Registry;
use mediaci_core::spec::{BuildSpecification, Os, TestSpecification};
use mediaci_core::stage::{BuildResult, PlannedStage, StageCommand};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Builds that watch the event's repository and whose branch predicate
/// accepts its effective branch, in registry declaration order. Empty means
/// no build is needed.
pub fn select_builds<'a>(event: &ChangeEvent, registry: &'a Registry) -> Vec<&'a BuildSpecification> {
    let branch = event.effective_branch();
    let repository = event.repository_name();
    registry
        .builds()
        .iter()
        .filter(|b| b.watches(repository) && b.is_eligible(branch))
        .collect()
}

/// Outcome of the fan-out step that follows the trigger build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "builds", rename_all = "snake_case")]
pub enum FanOut {
    /// Build channels to invoke, in declaration order.
    Targets(Vec<String>),
    /// No downstream build is needed for this branch.
    Skip,
}

impl FanOut {
    pub fn targets(&self) -> &[String] {
        match self {
            FanOut::Targets(names) => names,
            FanOut::Skip => &[],
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, FanOut::Skip)
    }
}

/// Recompute the build set at trigger time.
///
/// Must be called with the event as it stands after the trigger build, since
/// the target branch may only be known then.
pub fn fan_out_targets(event: &ChangeEvent, registry: &Registry) -> FanOut {
    let names: Vec<String> = select_builds(event, registry)
        .into_iter()
        .map(|b| b.name.clone())
        .collect();
    if names.is_empty() {
        FanOut::Skip
    } else {
        FanOut::Targets(names)
    }
}

/// Tests to run after a build. Anything but success triggers nothing.
pub fn tests_to_trigger<'a>(
    registry: &'a Registry,
    build: &BuildSpecification,
    result: BuildResult,
) -> Vec<&'a TestSpecification> {
    if !result.is_success() {
        return Vec::new();
    }
    registry.tests_for(&build.product_type)
}

/// Tests with named upstream builds, all of which finished with success.
pub fn tests_after_builds<'a>(
    registry: &'a Registry,
    finished: &HashMap<String, BuildResult>,
) -> Vec<&'a TestSpecification> {
    registry.tests_after(|build| finished.get(build).is_some_and(BuildResult::is_success))
}

/// Planned execution of one build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    pub name: String,
    pub worker_pool: String,
    pub os: Os,
    /// Steps that run before the six stages, ending with the dependency
    /// check for component builds.
    pub preparation: Vec<StageCommand>,
    pub stages: Vec<PlannedStage>,
    /// Tests triggered if the build succeeds.
    pub tests: Vec<String>,
    pub depends_on: Vec<String>,
    pub artifacts_dir: PathBuf,
}

impl BuildPlan {
    /// Every command of the build, in execution order.
    pub fn commands(&self) -> impl Iterator<Item = &StageCommand> {
        self.preparation
            .iter()
            .chain(self.stages.iter().map(|s| &s.command))
    }
}

/// Planned execution of one test.
#[derive(Debug, Clone, Serialize)]
pub struct TestPlan {
    pub name: String,
    pub worker_pool: String,
    pub os: Os,
    pub steps: Vec<StageCommand>,
}

/// Everything the orchestrator would do for an event, computed up front.
#[derive(Debug, Clone, Serialize)]
pub struct EventPlan {
    pub event: ChangeEvent,
    pub trigger: Vec<StageCommand>,
    pub fan_out: FanOut,
    pub builds: Vec<BuildPlan>,
    /// Tests that run once all their upstream builds succeed.
    pub tests: Vec<String>,
}

/// The decision engine over an immutable registry.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    registry: Arc<Registry>,
    factory: StageFactory,
}

impl DecisionEngine {
    pub fn new(registry: Arc<Registry>) -> Self {
        let factory = StageFactory::new(registry.orchestrator().factory.clone());
        Self { registry, factory }
    }

    pub fn with_factory(mut self, factory: StageFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn factory(&self) -> &StageFactory {
        &self.factory
    }

    pub fn select_builds(&self, event: &ChangeEvent) -> Vec<&BuildSpecification> {
        select_builds(event, &self.registry)
    }

    pub fn fan_out_targets(&self, event: &ChangeEvent) -> FanOut {
        fan_out_targets(event, &self.registry)
    }

    pub fn stage_sequence(&self, build: &BuildSpecification, event: &ChangeEvent) -> Vec<PlannedStage> {
        self.factory.stage_sequence(build, event)
    }

    pub fn tests_to_trigger(&self, build: &BuildSpecification, result: BuildResult) -> Vec<&TestSpecification> {
        tests_to_trigger(&self.registry, build, result)
    }

    pub fn tests_after_builds(&self, finished: &HashMap<String, BuildResult>) -> Vec<&TestSpecification> {
        tests_after_builds(&self.registry, finished)
    }

    /// Plan a build for the platform of its pool's first worker.
    pub fn plan_build(&self, build: &BuildSpecification, event: &ChangeEvent) -> BuildPlan {
        self.plan_build_on(build, event, self.registry.pool_os(&build.worker_pool))
    }

    /// Plan a build for a worker running `os`.
    pub fn plan_build_on(&self, build: &BuildSpecification, event: &ChangeEvent, os: Os) -> BuildPlan {
        let factory = self.factory.for_os(os);
        BuildPlan {
            name: build.name.clone(),
            worker_pool: build.worker_pool.clone(),
            os,
            preparation: factory
                .infrastructure_step(event)
                .into_iter()
                .chain(factory.dependency_check(build))
                .collect(),
            stages: factory.stage_sequence(build, event),
            tests: self
                .tests_to_trigger(build, BuildResult::Success)
                .into_iter()
                .map(|t| t.name.clone())
                .collect(),
            depends_on: build.depends_on.clone(),
            artifacts_dir: factory.artifacts_dir(event, &build.product_type, build.build_type),
        }
    }

    pub fn plan_test(&self, test: &TestSpecification, event: &ChangeEvent) -> TestPlan {
        self.plan_test_on(test, event, self.registry.pool_os(&test.worker_pool))
    }

    pub fn plan_test_on(&self, test: &TestSpecification, event: &ChangeEvent, os: Os) -> TestPlan {
        TestPlan {
            name: test.name.clone(),
            worker_pool: test.worker_pool.clone(),
            os,
            steps: self.factory.for_os(os).test_steps(test, event),
        }
    }

    /// Plan every selected build for an event.
    ///
    /// This is the initial selection; the orchestrator recomputes the fan-out
    /// after the trigger build has resolved the target branch.
    pub fn plan(&self, event: &ChangeEvent) -> EventPlan {
        let trigger = if self.registry.orchestrator().trigger_checks {
            self.factory.trigger_steps(event)
        } else {
            Vec::new()
        };
        let builds: Vec<BuildPlan> = self
            .select_builds(event)
            .into_iter()
            .map(|b| self.plan_build(b, event))
            .collect();
        let assumed: HashMap<String, BuildResult> = builds
            .iter()
            .map(|b| (b.name.clone(), BuildResult::Success))
            .collect();
        let tests = self
            .tests_after_builds(&assumed)
            .into_iter()
            .map(|t| t.name.clone())
            .collect();

        EventPlan {
            event: event.clone(),
            trigger,
            fan_out: self.fan_out_targets(event),
            builds,
            tests,
        }
    }
}
