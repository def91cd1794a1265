//! End-to-end orchestration tests against mock collaborators.

use async_trait::async_trait;
use mediaci_core::config::{ChangeFilterConfig, OrchestratorConfig};
use mediaci_core::event::ChangeEvent;
use mediaci_core::ports::{
    ExecutionRequest, ReportState, StageExecutor, StaticTargetBranches, StatusReporter,
    StatusUpdate,
};
use mediaci_core::registry::{Registry, RegistryConfig};
use mediaci_core::spec::{
    BranchPredicate, BuildSpecification, Os, TestFactoryKind, TestSpecification, WorkerDefinition,
};
use mediaci_core::stage::{BuildResult, StageOutcome};
use mediaci_core::{Error, Result};
use mediaci_scheduler::{EventState, Orchestrator};
use pretty_assertions::assert_eq;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

struct Gate {
    build: String,
    step: String,
    reached: Notify,
    release: Notify,
}

#[derive(Default)]
struct MockExecutor {
    calls: Mutex<Vec<ExecutionRequest>>,
    results: HashMap<(String, String), BuildResult>,
    logs: HashMap<(String, String), String>,
    errors: HashSet<(String, String)>,
    gate: Option<Gate>,
}

impl MockExecutor {
    fn new() -> Self {
        Self::default()
    }

    fn with_result(mut self, build: &str, step: &str, result: BuildResult) -> Self {
        self.results
            .insert((build.to_string(), step.to_string()), result);
        self
    }

    fn with_log(mut self, build: &str, step: &str, log: &str) -> Self {
        self.logs
            .insert((build.to_string(), step.to_string()), log.to_string());
        self
    }

    fn with_error(mut self, build: &str, step: &str) -> Self {
        self.errors.insert((build.to_string(), step.to_string()));
        self
    }

    fn with_gate(mut self, build: &str, step: &str) -> Self {
        self.gate = Some(Gate {
            build: build.to_string(),
            step: step.to_string(),
            reached: Notify::new(),
            release: Notify::new(),
        });
        self
    }

    fn calls(&self) -> Vec<ExecutionRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn steps_of(&self, build: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.build == build)
            .map(|c| c.command.name)
            .collect()
    }
}

#[async_trait]
impl StageExecutor for MockExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<StageOutcome> {
        self.calls.lock().unwrap().push(request.clone());
        let key = (request.build.clone(), request.command.name.clone());

        if let Some(gate) = &self.gate
            && gate.build == key.0
            && gate.step == key.1
        {
            gate.reached.notify_one();
            gate.release.notified().await;
        }

        if self.errors.contains(&key) {
            return Err(Error::Execution("worker lost".to_string()));
        }
        let result = self.results.get(&key).copied().unwrap_or(BuildResult::Success);
        Ok(StageOutcome {
            result,
            exit_code: Some(if result == BuildResult::Success { 0 } else { 1 }),
            log: self.logs.get(&key).cloned().unwrap_or_default(),
            duration_ms: 1,
        })
    }
}

#[derive(Default)]
struct MockReporter {
    updates: Mutex<Vec<StatusUpdate>>,
}

impl MockReporter {
    fn states_of(&self, name: &str) -> Vec<ReportState> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.name == name)
            .map(|u| u.state)
            .collect()
    }
}

#[async_trait]
impl StatusReporter for MockReporter {
    async fn report(&self, update: &StatusUpdate) -> Result<()> {
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}

fn base_config() -> RegistryConfig {
    RegistryConfig::default()
        .with_pool("centos", &["b-1-14", "b-1-23"])
        .with_pool("centos_test", &["t-1-17"])
        .with_orchestrator(OrchestratorConfig::default().without_trigger_checks())
}

/// B1 builds master, B2 builds release branches.
fn scenario_config() -> RegistryConfig {
    base_config()
        .with_build(
            BuildSpecification::new("B1", "linux", "centos")
                .with_branches(BranchPredicate::exact("master")),
        )
        .with_build(
            BuildSpecification::new("B2", "windows", "centos")
                .with_branches(BranchPredicate::prefix("release/")),
        )
        .with_test(TestSpecification::new("T1", "linux", "centos_test"))
        .with_test(TestSpecification::new("T2", "windows", "centos_test"))
}

fn orchestrator(
    config: RegistryConfig,
    executor: Arc<MockExecutor>,
    reporter: Arc<MockReporter>,
) -> Orchestrator {
    let registry = Arc::new(Registry::load(config).unwrap());
    Orchestrator::new(registry, executor)
        .unwrap()
        .with_reporter(reporter)
}

fn event(branch: &str) -> ChangeEvent {
    ChangeEvent::new("https://github.com/intel/media-driver.git", branch, "ef64b58a")
}

const FULL_BUILD: [&str; 7] = [
    "deploying infrastructure",
    "clean",
    "extract",
    "build",
    "install",
    "pack",
    "copy",
];

#[tokio::test]
async fn test_master_runs_b1_then_its_tests() {
    let executor = Arc::new(MockExecutor::new());
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(scenario_config(), executor.clone(), reporter.clone());

    let report = orch.handle_change(event("master")).await;

    assert_eq!(report.state, EventState::Done);
    assert_eq!(report.builds.len(), 1);
    let b1 = report.build("B1").unwrap();
    assert_eq!(b1.result, BuildResult::Success);
    assert_eq!(executor.steps_of("B1"), FULL_BUILD);

    let tests: Vec<&str> = b1.tests.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tests, ["T1"]);
    assert_eq!(b1.tests[0].worker.as_deref(), Some("t-1-17"));
    assert!(executor.steps_of("T2").is_empty());

    assert_eq!(
        reporter.states_of("B1"),
        [ReportState::Started, ReportState::Finished(BuildResult::Success)]
    );
}

#[tokio::test]
async fn test_failed_build_is_isolated_and_triggers_nothing() {
    let config = base_config()
        .with_build(BuildSpecification::new("B1", "linux", "centos"))
        .with_build(BuildSpecification::new("B2", "windows", "centos"))
        .with_test(TestSpecification::new("T1", "linux", "centos_test"))
        .with_test(TestSpecification::new("T2", "windows", "centos_test"));
    let executor = Arc::new(MockExecutor::new().with_result("B1", "build", BuildResult::Failure));
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(config, executor.clone(), reporter.clone());

    let report = orch.handle_change(event("master")).await;

    assert_eq!(report.state, EventState::Done);
    let names: Vec<&str> = report.builds.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, ["B1", "B2"]);

    let b1 = report.build("B1").unwrap();
    assert_eq!(b1.result, BuildResult::Failure);
    assert_eq!(
        executor.steps_of("B1"),
        ["deploying infrastructure", "clean", "extract", "build"]
    );
    assert!(b1.tests.is_empty());
    assert!(executor.steps_of("T1").is_empty());

    let b2 = report.build("B2").unwrap();
    assert_eq!(b2.result, BuildResult::Success);
    assert_eq!(b2.tests.len(), 1);
    assert_eq!(b2.tests[0].result, BuildResult::Success);

    assert_eq!(
        reporter.states_of("B1"),
        [ReportState::Started, ReportState::Finished(BuildResult::Failure)]
    );
    assert!(reporter.states_of("T1").is_empty());
}

#[tokio::test]
async fn test_warnings_continue_but_do_not_trigger_tests() {
    let executor = Arc::new(MockExecutor::new().with_result("B1", "pack", BuildResult::Warnings));
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(scenario_config(), executor.clone(), reporter);

    let report = orch.handle_change(event("master")).await;

    let b1 = report.build("B1").unwrap();
    assert_eq!(b1.result, BuildResult::Warnings);
    assert_eq!(b1.steps.len(), 7);
    assert!(b1.tests.is_empty());
}

#[tokio::test]
async fn test_executor_error_is_exception() {
    let executor = Arc::new(MockExecutor::new().with_error("B1", "extract"));
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(scenario_config(), executor.clone(), reporter);

    let report = orch.handle_change(event("master")).await;

    assert_eq!(report.state, EventState::Done);
    let b1 = report.build("B1").unwrap();
    assert_eq!(b1.result, BuildResult::Exception);
    assert_eq!(b1.steps.last().unwrap().exit_code, None);
    assert!(b1.tests.is_empty());
}

#[tokio::test]
async fn test_no_matching_build_is_skipped() {
    let executor = Arc::new(MockExecutor::new());
    let reporter = Arc::new(MockReporter::default());
    let config = base_config().with_build(
        BuildSpecification::new("B1", "linux", "centos")
            .with_branches(BranchPredicate::exact("master")),
    );
    let orch = orchestrator(config, executor.clone(), reporter);

    let report = orch.handle_change(event("release/2024")).await;

    assert_eq!(report.state, EventState::Skipped);
    assert!(report.builds.is_empty());
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_unpolled_branch_is_rejected() {
    let executor = Arc::new(MockExecutor::new());
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(scenario_config(), executor.clone(), reporter);

    let report = orch.handle_change(event("refs/heads/feature/x")).await;

    assert_eq!(report.state, EventState::Rejected);
    assert!(report.trigger.is_none());
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_trigger_failure_stops_fan_out() {
    let config = scenario_config().with_orchestrator(OrchestratorConfig::default());
    let executor = Arc::new(MockExecutor::new().with_result(
        "trigger",
        "check copyright",
        BuildResult::Failure,
    ));
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(config, executor.clone(), reporter.clone());

    let report = orch.handle_change(event("master")).await;

    assert_eq!(report.state, EventState::TriggerFailed);
    let trigger = report.trigger.unwrap();
    assert_eq!(trigger.result, BuildResult::Failure);
    assert_eq!(trigger.worker.as_deref(), Some("local"));
    assert!(report.builds.is_empty());
    assert!(executor.steps_of("B1").is_empty());
    assert_eq!(
        reporter.states_of("trigger"),
        [ReportState::Started, ReportState::Finished(BuildResult::Failure)]
    );
}

#[tokio::test]
async fn test_trigger_runs_on_configured_pool() {
    let mut orchestrator_config = OrchestratorConfig::default();
    orchestrator_config.trigger_pool = Some("centos_test".to_string());
    let config = scenario_config().with_orchestrator(orchestrator_config);
    let executor = Arc::new(MockExecutor::new());
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(config, executor.clone(), reporter);

    let report = orch.handle_change(event("master")).await;

    assert_eq!(report.state, EventState::Done);
    assert_eq!(report.trigger.unwrap().worker.as_deref(), Some("t-1-17"));
    let trigger_steps = executor.steps_of("trigger");
    assert_eq!(trigger_steps.len(), 4);
    assert_eq!(trigger_steps[1], "extract repository");
}

#[tokio::test]
async fn test_target_branch_resolved_after_trigger() {
    let config = scenario_config().with_orchestrator(OrchestratorConfig::default());
    let executor = Arc::new(MockExecutor::new());
    let reporter = Arc::new(MockReporter::default());
    let resolver = StaticTargetBranches::new().with("refs/pull/7/head", "release/2024");
    let orch = orchestrator(config, executor.clone(), reporter).with_resolver(Arc::new(resolver));

    let pr = event("refs/pull/7/head");
    assert!(orch.engine().select_builds(&pr).is_empty());

    let report = orch.handle_change(pr).await;

    assert_eq!(report.state, EventState::Done);
    assert_eq!(report.event.target_branch.as_deref(), Some("release/2024"));
    let names: Vec<&str> = report.builds.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, ["B2"]);

    let stage_calls: Vec<ExecutionRequest> = executor
        .calls()
        .into_iter()
        .filter(|c| c.build == "B2" && c.command.has_arg("--stage"))
        .collect();
    assert_eq!(stage_calls.len(), 6);
    for call in stage_calls {
        assert_eq!(call.command.flag_value("--target-branch"), Some("release/2024"));
    }
}

#[tokio::test]
async fn test_cancel_stops_remaining_stages_and_tests() {
    let executor = Arc::new(MockExecutor::new().with_gate("B1", "build"));
    let reporter = Arc::new(MockReporter::default());
    let orch = Arc::new(orchestrator(scenario_config(), executor.clone(), reporter));

    let task = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.handle_change(event("master")).await })
    };

    let gate = executor.gate.as_ref().unwrap();
    gate.reached.notified().await;
    orch.cancel();
    gate.release.notify_one();

    let report = task.await.unwrap();
    let b1 = report.build("B1").unwrap();
    assert_eq!(b1.result, BuildResult::Cancelled);
    assert_eq!(
        executor.steps_of("B1"),
        ["deploying infrastructure", "clean", "extract", "build"]
    );
    assert!(b1.tests.is_empty());
    assert!(executor.steps_of("T1").is_empty());
    assert!(orch.is_cancelled());

    orch.resume();
    assert!(!orch.is_cancelled());
}

fn dependency_config() -> RegistryConfig {
    base_config()
        .with_build(BuildSpecification::new("build-libva", "libva", "centos").with_dependency_name("libva"))
        .with_build(
            BuildSpecification::new("build", "public_linux_driver", "centos")
                .with_depends_on(&["build-libva"]),
        )
        .with_build(
            BuildSpecification::new("build-fastboot", "fastboot", "centos")
                .with_branches(BranchPredicate::exact("master")),
        )
}

#[tokio::test]
async fn test_downstream_waits_for_upstream() {
    let executor = Arc::new(MockExecutor::new());
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(dependency_config(), executor.clone(), reporter);

    let report = orch.handle_change(event("master")).await;

    assert_eq!(report.state, EventState::Done);
    assert!(report.builds.iter().all(|b| b.result == BuildResult::Success));

    let calls = executor.calls();
    let last_libva = calls.iter().rposition(|c| c.build == "build-libva").unwrap();
    let first_driver = calls.iter().position(|c| c.build == "build").unwrap();
    assert!(last_libva < first_driver);
}

#[tokio::test]
async fn test_failed_upstream_blocks_downstream() {
    let executor = Arc::new(
        MockExecutor::new().with_result("build-libva", "install", BuildResult::Failure),
    );
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(dependency_config(), executor.clone(), reporter.clone());

    let report = orch.handle_change(event("master")).await;

    assert_eq!(report.state, EventState::Done);
    assert_eq!(report.build("build-libva").unwrap().result, BuildResult::Failure);
    let driver = report.build("build").unwrap();
    assert_eq!(driver.result, BuildResult::NotStarted);
    assert!(driver.worker.is_none());
    assert!(executor.steps_of("build").is_empty());
    assert!(reporter.states_of("build").is_empty());
    assert_eq!(
        report.build("build-fastboot").unwrap().result,
        BuildResult::Success
    );
}

#[tokio::test]
async fn test_builds_lease_workers_from_their_pool() {
    let executor = Arc::new(MockExecutor::new());
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(dependency_config(), executor.clone(), reporter);

    let report = orch.handle_change(event("master")).await;

    for build in &report.builds {
        let worker = build.worker.as_deref().unwrap();
        assert!(worker == "b-1-14" || worker == "b-1-23");
    }
    for call in executor.calls() {
        assert!(call.worker.starts_with("b-1-"));
    }
    assert_eq!(orch.pools().available("centos").unwrap(), 2);
}

#[tokio::test]
async fn test_cycle_rejected_at_startup() {
    let config = base_config()
        .with_build(BuildSpecification::new("a", "x", "centos").with_depends_on(&["b"]))
        .with_build(BuildSpecification::new("b", "x", "centos").with_depends_on(&["a"]));
    let registry = Arc::new(Registry::load(config).unwrap());
    let result = Orchestrator::new(registry, Arc::new(MockExecutor::new()));
    assert!(matches!(result, Err(Error::DependencyCycle(_))));
}

#[tokio::test]
async fn test_component_already_built_skips_stages() {
    let executor = Arc::new(MockExecutor::new().with_log(
        "build-libva",
        "check libva on share",
        "libva 2.4.0 found on share\nREBUILD IS NOT NEEDED\n",
    ));
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(dependency_config(), executor.clone(), reporter.clone());

    let report = orch.handle_change(event("master")).await;

    let libva = report.build("build-libva").unwrap();
    assert_eq!(libva.result, BuildResult::Success);
    assert_eq!(
        executor.steps_of("build-libva"),
        ["deploying infrastructure", "check libva on share"]
    );
    let skipped: Vec<&str> = libva
        .steps
        .iter()
        .filter(|s| s.result == BuildResult::Skipped)
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(skipped, ["clean", "extract", "build", "install", "pack", "copy"]);
    assert_eq!(
        reporter.states_of("build-libva"),
        [ReportState::Started, ReportState::Finished(BuildResult::Success)]
    );

    // An up-to-date component still satisfies its dependents.
    assert_eq!(report.build("build").unwrap().result, BuildResult::Success);
    assert_eq!(executor.steps_of("build"), FULL_BUILD);
}

#[tokio::test]
async fn test_component_rebuilt_when_check_says_so() {
    let executor = Arc::new(MockExecutor::new().with_log(
        "build-libva",
        "check libva on share",
        "libva 2.4.1 is missing on share",
    ));
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(dependency_config(), executor.clone(), reporter);

    let report = orch.handle_change(event("master")).await;

    let libva = report.build("build-libva").unwrap();
    assert_eq!(libva.result, BuildResult::Success);
    assert_eq!(executor.steps_of("build-libva").len(), 8);
    assert!(libva.steps.iter().all(|s| s.result == BuildResult::Success));
}

#[tokio::test]
async fn test_failed_step_carries_stage_error() {
    let executor = Arc::new(MockExecutor::new().with_result("B1", "install", BuildResult::Failure));
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(scenario_config(), executor, reporter);

    let report = orch.handle_change(event("master")).await;

    let b1 = report.build("B1").unwrap();
    assert_eq!(
        b1.error.as_deref(),
        Some("Stage install of B1 failed: failure with exit code 1")
    );
}

/// The driver test waits for the driver and the tools it is tested with.
fn driver_test_config() -> RegistryConfig {
    base_config()
        .with_build(BuildSpecification::new("build", "public_linux_driver", "centos"))
        .with_build(BuildSpecification::new("build-ffmpeg", "public_linux_ffmpeg", "centos"))
        .with_build(BuildSpecification::new("build-metrics-calc", "public_linux_metrics_calc", "centos"))
        .with_test(
            TestSpecification::new("test", "public_linux_driver", "centos_test")
                .with_factory(TestFactoryKind::Driver)
                .with_triggered_by(&["build", "build-ffmpeg", "build-metrics-calc"]),
        )
}

#[tokio::test]
async fn test_driver_test_runs_after_all_upstream_builds() {
    let executor = Arc::new(MockExecutor::new());
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(driver_test_config(), executor.clone(), reporter.clone());

    let report = orch.handle_change(event("master")).await;

    assert_eq!(report.state, EventState::Done);
    assert!(report.builds.iter().all(|b| b.tests.is_empty()));
    assert_eq!(report.tests.len(), 1);
    let test = report.test("test").unwrap();
    assert_eq!(test.result, BuildResult::Success);
    assert_eq!(test.worker.as_deref(), Some("t-1-17"));
    assert_eq!(
        executor.steps_of("test"),
        ["deploying infrastructure", "clean", "test"]
    );

    let calls = executor.calls();
    let first_test = calls.iter().position(|c| c.build == "test").unwrap();
    for build in ["build", "build-ffmpeg", "build-metrics-calc"] {
        let last = calls.iter().rposition(|c| c.build == build).unwrap();
        assert!(last < first_test, "{} finished after the test started", build);
    }
    for call in calls.iter().filter(|c| c.build == "test" && c.command.name != "deploying infrastructure") {
        assert_eq!(call.command.args[0], "tests_runner.py");
        assert_eq!(
            call.command.flag_value("--artifacts"),
            Some("/media/builds/master/commit/ef64b58a/public_linux_driver_release")
        );
    }
    assert_eq!(
        reporter.states_of("test"),
        [ReportState::Started, ReportState::Finished(BuildResult::Success)]
    );
}

#[tokio::test]
async fn test_driver_test_skipped_when_one_upstream_fails() {
    let executor = Arc::new(
        MockExecutor::new().with_result("build-metrics-calc", "build", BuildResult::Failure),
    );
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(driver_test_config(), executor.clone(), reporter.clone());

    let report = orch.handle_change(event("master")).await;

    assert_eq!(report.state, EventState::Done);
    assert_eq!(report.build("build").unwrap().result, BuildResult::Success);
    assert!(report.tests.is_empty());
    assert!(executor.steps_of("test").is_empty());
    assert!(reporter.states_of("test").is_empty());
}

#[tokio::test]
async fn test_driver_test_needs_every_upstream_selected() {
    let config = base_config()
        .with_build(BuildSpecification::new("build", "public_linux_driver", "centos"))
        .with_build(
            BuildSpecification::new("build-ffmpeg", "public_linux_ffmpeg", "centos")
                .with_branches(BranchPredicate::exact("master")),
        )
        .with_test(
            TestSpecification::new("test", "public_linux_driver", "centos_test")
                .with_factory(TestFactoryKind::Driver)
                .with_triggered_by(&["build", "build-ffmpeg"]),
        );
    let executor = Arc::new(MockExecutor::new());
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(config, executor.clone(), reporter);

    let report = orch.handle_change(event("release/19.2")).await;

    assert_eq!(report.builds.len(), 1);
    assert!(report.tests.is_empty());
    assert!(executor.steps_of("test").is_empty());
}

#[tokio::test]
async fn test_windows_worker_gets_its_own_commands() {
    let mut orchestrator_config = OrchestratorConfig::default().without_trigger_checks();
    orchestrator_config
        .factory
        .run_commands
        .insert(Os::Windows, "py".to_string());
    let mut config = base_config()
        .with_orchestrator(orchestrator_config)
        .with_build(BuildSpecification::new("build-windows", "public_windows", "windows"))
        .with_build(BuildSpecification::new("build-linux", "public_linux", "centos"));
    config.pools.insert(
        "windows".to_string(),
        vec![WorkerDefinition {
            name: "w-1".to_string(),
            max_builds: 1,
            os: Os::Windows,
        }],
    );
    let executor = Arc::new(MockExecutor::new());
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(config, executor.clone(), reporter);

    let report = orch.handle_change(event("master")).await;

    assert_eq!(report.build("build-windows").unwrap().worker.as_deref(), Some("w-1"));
    for call in executor.calls() {
        match call.build.as_str() {
            "build-windows" => assert_eq!(call.command.program, "py"),
            _ => assert_eq!(call.command.program, "python3"),
        }
    }
}

#[tokio::test]
async fn test_build_only_follows_its_repositories() {
    let config = base_config().with_build(
        BuildSpecification::new("build", "public_linux_driver", "centos")
            .with_repositories(&["media-driver", "product-configs"]),
    );
    let executor = Arc::new(MockExecutor::new());
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(config, executor.clone(), reporter);

    let sdk = ChangeEvent::new("https://github.com/Intel-Media-SDK/MediaSDK.git", "master", "1");
    assert_eq!(orch.handle_change(sdk).await.state, EventState::Skipped);

    let report = orch.handle_change(event("master")).await;
    assert_eq!(report.state, EventState::Done);
    assert_eq!(report.builds.len(), 1);
}

#[tokio::test]
async fn test_irrelevant_product_configs_change_is_rejected() {
    let mut change_filter = ChangeFilterConfig::default();
    change_filter.file_filters.insert(
        "product-configs".to_string(),
        vec!["driver/**".to_string(), "infrastructure_version.py".to_string()],
    );
    let mut orchestrator_config = OrchestratorConfig::default().without_trigger_checks();
    orchestrator_config.change_filter = change_filter;
    let config = scenario_config().with_orchestrator(orchestrator_config);
    let executor = Arc::new(MockExecutor::new());
    let reporter = Arc::new(MockReporter::default());
    let orch = orchestrator(config, executor.clone(), reporter);

    let configs = |file: &str| {
        ChangeEvent::new("https://github.com/Intel-Media-SDK/product-configs.git", "master", "2")
            .with_files([file])
    };
    let report = orch.handle_change(configs("conf_windows_public.py")).await;
    assert_eq!(report.state, EventState::Rejected);
    assert!(executor.calls().is_empty());

    let report = orch.handle_change(configs("driver/conf_media_driver.py")).await;
    assert_eq!(report.state, EventState::Done);
}
