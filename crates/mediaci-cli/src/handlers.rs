//! Command handlers.

use crate::commands::ChangeArgs;
use crate::config::{CliConfig, OutputFormat};
use anyhow::{Context, bail};
use console::style;
use mediaci_core::event::ChangeEvent;
use mediaci_core::ports::StageExecutor;
use mediaci_core::registry::{Registry, RegistryConfig};
use mediaci_core::stage::BuildResult;
use mediaci_runner::{DryRunExecutor, ShellStageExecutor};
use mediaci_scheduler::engine::{EventPlan, FanOut};
use mediaci_scheduler::flow::BuildFlow;
use mediaci_scheduler::{DecisionEngine, EventReport, EventState, Orchestrator};
use mediaci_smoke::compare::{compare_md5, compare_psnr, md5_file, parse_psnr};
use mediaci_smoke::{Reference, SmokeRunner, SmokeSuite, SmokeSummary, Verdict};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Print `value` as JSON or YAML, or call `table` for the human format.
fn emit<T: Serialize>(format: OutputFormat, value: &T, table: impl FnOnce(&T)) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => table(value),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn load_registry(config: &CliConfig, path: Option<PathBuf>) -> anyhow::Result<Registry> {
    let path = path.unwrap_or_else(|| config.registry.clone());
    Registry::from_file(&path).map_err(|e| {
        let what = if e.is_configuration() {
            "invalid registry"
        } else {
            "could not load registry"
        };
        anyhow::Error::new(e).context(format!("{} {}", what, path.display()))
    })
}

fn change_event(change: ChangeArgs) -> ChangeEvent {
    let event = ChangeEvent::new(change.repository, change.branch, change.revision)
        .with_files(change.files);
    match change.target_branch {
        Some(target) => event.with_target_branch(target),
        None => event,
    }
}

fn styled_result(result: BuildResult) -> console::StyledObject<&'static str> {
    match result {
        BuildResult::Success => style(result.as_str()).green(),
        BuildResult::Warnings => style(result.as_str()).yellow(),
        BuildResult::Skipped | BuildResult::NotStarted => style(result.as_str()).dim(),
        _ => style(result.as_str()).red(),
    }
}

/// Validate a registry file.
pub fn validate(config: &CliConfig, registry: Option<PathBuf>) -> anyhow::Result<()> {
    let registry = load_registry(config, registry)?;
    let flow = BuildFlow::from_registry(&registry)?;
    let order = flow.topological_order()?;

    println!("{} Registry is valid", style("✓").green());
    println!("  Pools: {}", registry.pools().count());
    println!("  Builds: {}", registry.builds().len());
    for name in order {
        let upstream = flow.upstream(name);
        if upstream.is_empty() {
            println!("    - {}", name);
        } else {
            println!("    - {} (after {})", name, upstream.join(", "));
        }
    }
    println!("  Tests: {}", registry.tests().len());
    Ok(())
}

fn print_plan(plan: &EventPlan) {
    println!(
        "{} {} on {}",
        style("▶").cyan(),
        style(plan.event.repository_name()).bold(),
        style(plan.event.effective_branch()).dim()
    );
    for step in &plan.trigger {
        println!("  trigger: {}", step.name);
    }
    match &plan.fan_out {
        FanOut::Skip => {
            println!("{} No builds for this branch", style("i").blue());
            return;
        }
        FanOut::Targets(targets) => println!("  fan-out: {}", targets.join(", ")),
    }
    for build in &plan.builds {
        println!();
        println!("  {} [{}]", style(&build.name).bold(), build.worker_pool);
        if !build.depends_on.is_empty() {
            println!("    after: {}", build.depends_on.join(", "));
        }
        for command in build.commands() {
            println!("    {}: {}", style(&command.name).dim(), command.command_line());
        }
        if !build.tests.is_empty() {
            println!("    tests: {}", build.tests.join(", "));
        }
        println!("    artifacts: {}", build.artifacts_dir.display());
    }
    if !plan.tests.is_empty() {
        println!();
        println!("  tests after all upstream builds: {}", plan.tests.join(", "));
    }
}

/// Show the plan for a change.
pub fn plan(config: &CliConfig, registry: Option<PathBuf>, change: ChangeArgs) -> anyhow::Result<()> {
    let engine = DecisionEngine::new(Arc::new(load_registry(config, registry)?));
    let plan = engine.plan(&change_event(change));
    emit(config.output_format, &plan, print_plan)
}

fn print_report(report: &EventReport) {
    println!(
        "{} Event {} {:?}",
        style("▶").cyan(),
        style(&report.event_id).bold(),
        report.state
    );
    if let Some(trigger) = &report.trigger {
        println!(
            "  trigger on {}: {}",
            trigger.worker.as_deref().unwrap_or("-"),
            styled_result(trigger.result)
        );
    }
    for build in &report.builds {
        println!(
            "  {} on {}: {}",
            style(&build.name).bold(),
            build.worker.as_deref().unwrap_or("-"),
            styled_result(build.result)
        );
        for step in &build.steps {
            println!("    {}: {}", step.name, styled_result(step.result));
        }
        if let Some(error) = &build.error {
            println!("    {}", style(error).red());
        }
        for test in &build.tests {
            println!("    test {}: {}", test.name, styled_result(test.result));
        }
    }
    for test in &report.tests {
        println!(
            "  test {} on {}: {}",
            style(&test.name).bold(),
            test.worker.as_deref().unwrap_or("-"),
            styled_result(test.result)
        );
    }
}

fn clean(result: BuildResult) -> bool {
    matches!(result, BuildResult::Success | BuildResult::Warnings)
}

fn report_failed(report: &EventReport) -> bool {
    match report.state {
        EventState::TriggerFailed => true,
        EventState::Done => report
            .builds
            .iter()
            .any(|b| !clean(b.result) || b.tests.iter().any(|t| !clean(t.result)))
            || report.tests.iter().any(|t| !clean(t.result)),
        _ => false,
    }
}

/// Process one change through the orchestrator.
pub async fn run(
    config: &CliConfig,
    registry: Option<PathBuf>,
    change: ChangeArgs,
    dry_run: bool,
    root: Option<PathBuf>,
) -> anyhow::Result<()> {
    let registry = Arc::new(load_registry(config, registry)?);
    let executor: Arc<dyn StageExecutor> = if dry_run {
        Arc::new(DryRunExecutor::new())
    } else {
        let mut runner = config.runner.clone();
        if let Some(root) = root {
            runner = runner.with_root_dir(root);
        }
        Arc::new(ShellStageExecutor::new(runner))
    };
    let orchestrator = Orchestrator::new(registry, executor)?;

    let handling = orchestrator.handle_change(change_event(change));
    tokio::pin!(handling);
    let report = loop {
        tokio::select! {
            report = &mut handling => break report,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                warn!("Interrupted, cancelling remaining steps");
                orchestrator.cancel();
            }
        }
    };

    emit(config.output_format, &report, print_report)?;
    if report_failed(&report) {
        bail!("change {} did not build cleanly", report.event.revision);
    }
    Ok(())
}

fn print_summary(summary: &SmokeSummary) {
    for result in &summary.results {
        match &result.verdict {
            Verdict::Passed => println!("{} {}", style("✓").green(), result.id),
            Verdict::Failed(reason) => {
                println!("{} {}: {}", style("✗").red(), result.id, reason)
            }
        }
    }
    println!();
    println!(
        "{} passed, {} failed",
        style(summary.passed).green(),
        style(summary.failed).red()
    );
}

/// Run a smoke suite.
pub async fn smoke(config: &CliConfig, suite: &Path, root: Option<PathBuf>) -> anyhow::Result<()> {
    let suite = SmokeSuite::from_file(suite)
        .with_context(|| format!("loading smoke suite {}", suite.display()))?;
    let root = root.unwrap_or_else(|| PathBuf::from("."));
    let runner = SmokeRunner::new(root).with_metrics_command(config.metrics_command.clone());

    let summary = runner.run_suite(&suite).await;
    emit(config.output_format, &summary, print_summary)?;
    if !summary.all_passed() {
        bail!("{} of {} smoke cases failed", summary.failed, suite.len());
    }
    Ok(())
}

/// Compare one output against a reference.
pub async fn compare(
    config: &CliConfig,
    ref_type: &str,
    ref_value: &str,
    file: Option<PathBuf>,
    metrics_output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let verdict = match (Reference::parse(ref_type, ref_value)?, file, metrics_output) {
        (Reference::Md5(expected), Some(file), _) => compare_md5(&expected, &md5_file(&file).await?),
        (Reference::Psnr(expected), _, Some(metrics)) => {
            let output = std::fs::read_to_string(&metrics)
                .with_context(|| format!("reading {}", metrics.display()))?;
            compare_psnr(expected, parse_psnr(&output)?)
        }
        (Reference::Md5(_), None, _) => bail!("md5 references are checked with --file"),
        (Reference::Psnr(_), _, None) => bail!("psnr references are checked with --metrics-output"),
    };

    emit(config.output_format, &verdict, |verdict| match verdict {
        Verdict::Passed => println!("{} Output matches reference", style("✓").green()),
        Verdict::Failed(reason) => println!("{} {}", style("✗").red(), reason),
    })?;
    if !verdict.passed() {
        bail!("output does not match reference");
    }
    Ok(())
}

/// Print the registry JSON schema.
pub fn schema() -> anyhow::Result<()> {
    let schema = schemars::schema_for!(RegistryConfig);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Show configuration.
pub fn show_config(config: &CliConfig) -> anyhow::Result<()> {
    println!("Current configuration:");
    print!("{}", serde_yaml::to_string(config)?);

    if let Ok(path) = CliConfig::config_path() {
        println!("\nConfig file: {}", path.display());
    }

    Ok(())
}

/// Set configuration.
pub fn set_config(key: &str, value: &str) -> anyhow::Result<()> {
    let mut config = CliConfig::load().unwrap_or_default();
    config.set(key, value)?;
    config.save()?;

    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}
