//! Per-event orchestration.
//!
//! Drives one change event through its state machine:
//!
//! ```text
//! RECEIVED -> [trigger build] -> FILTERED -> per build:
//!     [check component] -> clean -> extract -> build -> install -> pack -> copy -> [tests]
//! -> [tests after named builds] -> DONE
//! ```
//!
//! Terminal states are `DONE`, `SKIPPED` (no build selected), `TRIGGER_FAILED`
//! and `REJECTED` (not admitted by the change filter). A failing build never
//! affects its siblings; only builds declared downstream of it are held back.

use crate::engine::{DecisionEngine, FanOut};
use crate::flow::{BuildFlow, Readiness};
use crate::pools::{WorkerLease, WorkerPools};
use crate::reporter::LogReporter;
use crate::triggers::ChangeFilter;
use futures::StreamExt;
use futures::future::join_all;
use futures::stream::FuturesUnordered;
use mediaci_core::event::ChangeEvent;
use mediaci_core::ports::{
    ExecutionRequest, NoTargetBranch, ReportState, StageExecutor, StatusReporter, StatusUpdate,
    TargetBranchResolver,
};
use mediaci_core::registry::{Registry, TRIGGER_CHANNEL};
use mediaci_core::spec::{BuildSpecification, TestSpecification};
use mediaci_core::stage::{BuildResult, StageCommand};
use mediaci_core::{BuildRunId, Error, EventId, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Worker name used when the trigger build has no pool.
const LOCAL_WORKER: &str = "local";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    Received,
    /// Build set computed.
    Filtered,
    Done,
    /// No build is needed for this branch.
    Skipped,
    TriggerFailed,
    /// Not admitted by the change filter.
    Rejected,
}

impl EventState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EventState::Received | EventState::Filtered)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    pub result: BuildResult,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Steps run for one build, test or trigger build.
struct Sequence {
    result: BuildResult,
    steps: Vec<StepReport>,
    failure: Option<Error>,
}

/// Result of the trigger build or of one test.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub name: String,
    pub worker: Option<String>,
    pub result: BuildResult,
    pub steps: Vec<StepReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    fn not_run(name: &str, result: BuildResult, error: Option<&Error>) -> Self {
        Self {
            name: name.to_string(),
            worker: None,
            result,
            steps: vec![],
            error: error.map(ToString::to_string),
        }
    }

    fn finished(name: String, worker: String, sequence: Sequence) -> Self {
        Self {
            name,
            worker: Some(worker),
            result: sequence.result,
            steps: sequence.steps,
            error: sequence.failure.map(|e| e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub id: BuildRunId,
    pub name: String,
    pub worker: Option<String>,
    pub result: BuildResult,
    pub steps: Vec<StepReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tests: Vec<RunReport>,
}

impl BuildReport {
    fn not_run(name: &str, result: BuildResult, error: Option<&Error>) -> Self {
        Self {
            id: BuildRunId::new(),
            name: name.to_string(),
            worker: None,
            result,
            steps: vec![],
            error: error.map(ToString::to_string),
            tests: vec![],
        }
    }
}

/// Everything that happened to one change event.
#[derive(Debug, Clone, Serialize)]
pub struct EventReport {
    pub event_id: EventId,
    pub event: ChangeEvent,
    pub state: EventState,
    pub trigger: Option<RunReport>,
    /// Builds in fan-out order.
    pub builds: Vec<BuildReport>,
    /// Tests that waited on several named builds.
    pub tests: Vec<RunReport>,
}

impl EventReport {
    fn new(event: ChangeEvent) -> Self {
        Self {
            event_id: EventId::new(),
            event,
            state: EventState::Received,
            trigger: None,
            builds: vec![],
            tests: vec![],
        }
    }

    fn transition(&mut self, state: EventState) {
        debug!(event_id = %self.event_id, from = ?self.state, to = ?state, "Event state change");
        self.state = state;
    }

    pub fn build(&self, name: &str) -> Option<&BuildReport> {
        self.builds.iter().find(|b| b.name == name)
    }

    pub fn test(&self, name: &str) -> Option<&RunReport> {
        self.tests
            .iter()
            .chain(self.builds.iter().flat_map(|b| b.tests.iter()))
            .find(|t| t.name == name)
    }
}

/// Collaborators shared by every spawned build task.
#[derive(Clone)]
struct Runtime {
    engine: DecisionEngine,
    pools: WorkerPools,
    executor: Arc<dyn StageExecutor>,
    reporter: Arc<dyn StatusReporter>,
    cancel_rx: watch::Receiver<bool>,
}

impl Runtime {
    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    async fn report(&self, name: &str, event: &ChangeEvent, state: ReportState) {
        let update = StatusUpdate::new(name, event, state);
        if let Err(e) = self.reporter.report(&update).await {
            warn!(context = %update.context, error = %e, "Failed to report status");
        }
    }

    /// Run commands in order, stopping at the first one that neither succeeds
    /// nor only warns. A step whose output carries its up-to-date marker ends
    /// the run early; the steps after it are reported as skipped.
    async fn run_steps<'a>(
        &self,
        name: &str,
        worker: &str,
        commands: impl IntoIterator<Item = &'a StageCommand>,
    ) -> Sequence {
        let mut result = BuildResult::Success;
        let mut steps = Vec::new();
        let mut commands = commands.into_iter();

        while let Some(command) = commands.next() {
            if self.is_cancelled() {
                info!(build = name, step = %command.name, "Cancelled before step");
                return Sequence {
                    result: BuildResult::Cancelled,
                    steps,
                    failure: None,
                };
            }

            debug!(build = name, worker, command = %command, "Running step");
            let request = ExecutionRequest {
                build: name.to_string(),
                worker: worker.to_string(),
                command: command.clone(),
            };
            let (step, message, up_to_date) = match self.executor.execute(&request).await {
                Ok(outcome) => {
                    let up_to_date =
                        outcome.result.is_success() && command.reports_up_to_date(&outcome.log);
                    let message = match outcome.exit_code {
                        Some(code) => format!("{} with exit code {}", outcome.result, code),
                        None => outcome.result.to_string(),
                    };
                    let step = StepReport {
                        name: command.name.clone(),
                        result: outcome.result,
                        exit_code: outcome.exit_code,
                        duration_ms: outcome.duration_ms,
                    };
                    (step, message, up_to_date)
                }
                Err(e) => {
                    error!(build = name, step = %command.name, error = %e, "Step could not be executed");
                    let step = StepReport {
                        name: command.name.clone(),
                        result: BuildResult::Exception,
                        exit_code: None,
                        duration_ms: 0,
                    };
                    (step, e.to_string(), false)
                }
            };

            let step_result = step.result;
            steps.push(step);
            match step_result {
                BuildResult::Success => {}
                BuildResult::Warnings => result = BuildResult::Warnings,
                other => {
                    let failure = Error::StageFailed {
                        build: name.to_string(),
                        stage: command.name.clone(),
                        message,
                    };
                    warn!(error = %failure, "Step failed");
                    return Sequence {
                        result: other,
                        steps,
                        failure: Some(failure),
                    };
                }
            }

            if up_to_date {
                info!(build = name, step = %command.name, "Already built, skipping remaining steps");
                steps.extend(commands.by_ref().map(|rest| StepReport {
                    name: rest.name.clone(),
                    result: BuildResult::Skipped,
                    exit_code: None,
                    duration_ms: 0,
                }));
                break;
            }
        }

        Sequence {
            result,
            steps,
            failure: None,
        }
    }

    async fn run_test(&self, test: TestSpecification, event: ChangeEvent) -> RunReport {
        let lease = match self.pools.acquire(&test.worker_pool).await {
            Ok(lease) => lease,
            Err(e) => {
                error!(test = %test.name, error = %e, "Failed to lease worker");
                return RunReport::not_run(&test.name, BuildResult::Exception, Some(&e));
            }
        };
        let worker = lease.worker().to_string();
        let os = self.engine.registry().worker_os(&test.worker_pool, &worker);
        let plan = self.engine.plan_test_on(&test, &event, os);

        self.report(&plan.name, &event, ReportState::Started).await;
        let sequence = self.run_steps(&plan.name, &worker, &plan.steps).await;
        self.report(&plan.name, &event, ReportState::Finished(sequence.result)).await;
        info!(test = %plan.name, worker = %worker, result = %sequence.result, "Test finished");

        RunReport::finished(plan.name, worker, sequence)
    }

    /// Run tests concurrently unless the event was cancelled.
    async fn run_tests(&self, tests: Vec<TestSpecification>, event: &ChangeEvent) -> Vec<RunReport> {
        if tests.is_empty() {
            return vec![];
        }
        if self.is_cancelled() {
            info!(tests = tests.len(), "Cancelled before tests");
            return vec![];
        }
        join_all(tests.into_iter().map(|t| self.run_test(t, event.clone()))).await
    }

    async fn run_build(self, build: BuildSpecification, event: ChangeEvent) -> BuildReport {
        let lease = match self.pools.acquire(&build.worker_pool).await {
            Ok(lease) => lease,
            Err(e) => {
                error!(build = %build.name, error = %e, "Failed to lease worker");
                return BuildReport::not_run(&build.name, BuildResult::Exception, Some(&e));
            }
        };
        let worker = lease.worker().to_string();
        let os = self.engine.registry().worker_os(&build.worker_pool, &worker);
        let plan = self.engine.plan_build_on(&build, &event, os);
        let id = BuildRunId::new();
        info!(build = %plan.name, %id, worker = %worker, ?os, "Build started");

        self.report(&plan.name, &event, ReportState::Started).await;
        let sequence = self.run_steps(&plan.name, &worker, plan.commands()).await;
        self.report(&plan.name, &event, ReportState::Finished(sequence.result)).await;
        drop(lease);
        info!(build = %plan.name, %id, result = %sequence.result, "Build finished");

        let tests: Vec<TestSpecification> = self
            .engine
            .tests_to_trigger(&build, sequence.result)
            .into_iter()
            .cloned()
            .collect();
        let tests = self.run_tests(tests, &event).await;

        BuildReport {
            id,
            name: plan.name,
            worker: Some(worker),
            result: sequence.result,
            steps: sequence.steps,
            error: sequence.failure.map(|e| e.to_string()),
            tests,
        }
    }
}

/// Processes change events against an immutable registry.
pub struct Orchestrator {
    runtime: Runtime,
    filter: ChangeFilter,
    flow: Arc<BuildFlow>,
    resolver: Arc<dyn TargetBranchResolver>,
    cancel_tx: watch::Sender<bool>,
}

impl Orchestrator {
    /// Create an orchestrator. Fails if the build dependency flow is invalid.
    pub fn new(registry: Arc<Registry>, executor: Arc<dyn StageExecutor>) -> Result<Self> {
        let flow = BuildFlow::from_registry(&registry)?;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let filter = ChangeFilter::new(registry.orchestrator().change_filter.clone());

        Ok(Self {
            runtime: Runtime {
                pools: WorkerPools::from_registry(&registry),
                engine: DecisionEngine::new(registry),
                executor,
                reporter: Arc::new(LogReporter),
                cancel_rx,
            },
            filter,
            flow: Arc::new(flow),
            resolver: Arc::new(NoTargetBranch),
            cancel_tx,
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.runtime.reporter = reporter;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn TargetBranchResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_filter(mut self, filter: ChangeFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.runtime.engine
    }

    pub fn pools(&self) -> &WorkerPools {
        &self.runtime.pools
    }

    /// Stop all in-flight builds before their next step.
    pub fn cancel(&self) {
        info!("Cancelling in-flight builds");
        self.cancel_tx.send_replace(true);
    }

    pub fn resume(&self) {
        self.cancel_tx.send_replace(false);
    }

    pub fn is_cancelled(&self) -> bool {
        self.runtime.is_cancelled()
    }

    /// Process one change event to a terminal state.
    pub async fn handle_change(&self, event: ChangeEvent) -> EventReport {
        let mut report = EventReport::new(event);
        let event_id = report.event_id;

        if !self.filter.admits(&report.event) {
            info!(
                %event_id,
                repository = report.event.repository_name(),
                branch = %report.event.branch,
                "Change not admitted"
            );
            report.transition(EventState::Rejected);
            return report;
        }

        info!(
            %event_id,
            repository = report.event.repository_name(),
            branch = %report.event.branch,
            revision = %report.event.revision,
            "Change received"
        );
        let initial = self.runtime.engine.select_builds(&report.event).len();
        debug!(%event_id, builds = initial, "Initial selection");

        if self.runtime.engine.registry().orchestrator().trigger_checks {
            let trigger = self.run_trigger(&report.event).await;
            let result = trigger.result;
            report.trigger = Some(trigger);
            if !result.is_success() {
                error!(%event_id, result = %result, "Trigger build failed, no builds fan out");
                report.transition(EventState::TriggerFailed);
                return report;
            }
        }

        match self.resolver.resolve(&report.event).await {
            Ok(target_branch) => report.event.target_branch = target_branch,
            Err(e) => warn!(%event_id, error = %e, "Failed to resolve target branch"),
        }

        let targets = match self.runtime.engine.fan_out_targets(&report.event) {
            FanOut::Targets(targets) => targets,
            FanOut::Skip => {
                info!(
                    %event_id,
                    branch = report.event.effective_branch(),
                    "No builds needed for this branch"
                );
                report.transition(EventState::Skipped);
                return report;
            }
        };
        report.transition(EventState::Filtered);
        info!(%event_id, builds = ?targets, "Fanning out");

        report.builds = self.run_builds(&report.event, &targets).await;

        let finished: HashMap<String, BuildResult> = report
            .builds
            .iter()
            .map(|b| (b.name.clone(), b.result))
            .collect();
        let tests: Vec<TestSpecification> = self
            .runtime
            .engine
            .tests_after_builds(&finished)
            .into_iter()
            .cloned()
            .collect();
        report.tests = self.runtime.run_tests(tests, &report.event).await;
        report.transition(EventState::Done);

        let failed = report
            .builds
            .iter()
            .filter(|b| !b.result.is_success())
            .count();
        info!(%event_id, builds = report.builds.len(), failed, "Event done");
        report
    }

    async fn run_trigger(&self, event: &ChangeEvent) -> RunReport {
        let registry = self.runtime.engine.registry();
        let trigger_pool = registry.orchestrator().trigger_pool.as_deref();
        let lease: Option<WorkerLease> = match trigger_pool {
            Some(pool) => match self.runtime.pools.acquire(pool).await {
                Ok(lease) => Some(lease),
                Err(e) => {
                    error!(error = %e, "Failed to lease worker for trigger build");
                    return RunReport::not_run(TRIGGER_CHANNEL, BuildResult::Exception, Some(&e));
                }
            },
            None => None,
        };
        let worker = lease
            .as_ref()
            .map(|l| l.worker().to_string())
            .unwrap_or_else(|| LOCAL_WORKER.to_string());
        let os = trigger_pool
            .map(|pool| registry.worker_os(pool, &worker))
            .unwrap_or_default();
        let steps = self.runtime.engine.factory().for_os(os).trigger_steps(event);

        self.runtime.report(TRIGGER_CHANNEL, event, ReportState::Started).await;
        let sequence = self.runtime.run_steps(TRIGGER_CHANNEL, &worker, &steps).await;
        self.runtime
            .report(TRIGGER_CHANNEL, event, ReportState::Finished(sequence.result))
            .await;

        RunReport::finished(TRIGGER_CHANNEL.to_string(), worker, sequence)
    }

    /// Run the selected builds concurrently, starting each once its upstream
    /// builds have succeeded.
    async fn run_builds(&self, event: &ChangeEvent, targets: &[String]) -> Vec<BuildReport> {
        let selected: HashSet<String> = targets.iter().cloned().collect();
        let mut pending: Vec<String> = targets.to_vec();
        let mut finished: HashMap<String, BuildResult> = HashMap::new();
        let mut reports: HashMap<String, BuildReport> = HashMap::new();
        let mut running = FuturesUnordered::new();

        loop {
            let mut progressed = false;
            let mut waiting = Vec::new();
            for name in pending.drain(..) {
                match self.flow.readiness(&name, &selected, &finished) {
                    Readiness::Ready => {
                        let Some(spec) = self.runtime.engine.registry().build(&name) else {
                            let e = Error::Internal(format!("selected build {} is not in the registry", name));
                            error!(build = %name, error = %e, "Cannot start build");
                            finished.insert(name.clone(), BuildResult::Exception);
                            reports.insert(name.clone(), BuildReport::not_run(&name, BuildResult::Exception, Some(&e)));
                            progressed = true;
                            continue;
                        };
                        let handle = tokio::spawn(self.runtime.clone().run_build(spec.clone(), event.clone()));
                        running.push(async move { (name, handle.await) });
                        progressed = true;
                    }
                    Readiness::Blocked => {
                        info!(build = %name, upstream = ?self.flow.upstream(&name), "Upstream did not succeed, build not started");
                        finished.insert(name.clone(), BuildResult::NotStarted);
                        reports.insert(name.clone(), BuildReport::not_run(&name, BuildResult::NotStarted, None));
                        progressed = true;
                    }
                    Readiness::Waiting => waiting.push(name),
                }
            }
            pending = waiting;

            if running.is_empty() {
                if pending.is_empty() || !progressed {
                    break;
                }
                continue;
            }

            if let Some((name, joined)) = running.next().await {
                let report = match joined {
                    Ok(report) => report,
                    Err(e) => {
                        error!(build = %name, error = %e, "Build task panicked");
                        BuildReport::not_run(&name, BuildResult::Exception, None)
                    }
                };
                finished.insert(name.clone(), report.result);
                reports.insert(name, report);
            }
        }

        for name in pending {
            reports.insert(name.clone(), BuildReport::not_run(&name, BuildResult::NotStarted, None));
        }

        targets
            .iter()
            .filter_map(|name| reports.remove(name))
            .collect()
    }
}
