//! Build stages, command descriptors and execution results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One step of the fixed build sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Clean,
    Extract,
    Build,
    Install,
    Pack,
    Copy,
}

impl BuildStage {
    /// Every stage, in execution order.
    pub const ALL: [BuildStage; 6] = [
        BuildStage::Clean,
        BuildStage::Extract,
        BuildStage::Build,
        BuildStage::Install,
        BuildStage::Pack,
        BuildStage::Copy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStage::Clean => "clean",
            BuildStage::Extract => "extract",
            BuildStage::Build => "build",
            BuildStage::Install => "install",
            BuildStage::Pack => "pack",
            BuildStage::Copy => "copy",
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a driver test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStage {
    Clean,
    Test,
}

impl TestStage {
    pub const ALL: [TestStage; 2] = [TestStage::Clean, TestStage::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestStage::Clean => "clean",
            TestStage::Test => "test",
        }
    }
}

/// A fully resolved external command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCommand {
    /// Step name shown in logs and reports.
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    /// Working directory, relative to the worker's build directory.
    pub workdir: PathBuf,
    /// Output marker that ends the sequence early: the remaining steps are
    /// skipped and the run still succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_to_date_marker: Option<String>,
}

impl StageCommand {
    pub fn new(name: impl Into<String>, program: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: vec![],
            workdir: workdir.into(),
            up_to_date_marker: None,
        }
    }

    pub fn with_up_to_date_marker(mut self, marker: impl Into<String>) -> Self {
        self.up_to_date_marker = Some(marker.into());
        self
    }

    /// Whether `log` says the remaining steps need not run.
    pub fn reports_up_to_date(&self, log: &str) -> bool {
        self.up_to_date_marker
            .as_deref()
            .is_some_and(|marker| log.contains(marker))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Value following a `--flag` argument.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let idx = self.args.iter().position(|a| a == flag)?;
        self.args.get(idx + 1).map(String::as_str)
    }

    /// Space-joined command line, for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.command_line())
    }
}

/// A stage paired with the command that implements it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStage {
    pub stage: BuildStage,
    pub command: StageCommand,
}

/// Terminal result of a build, test or single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildResult {
    Success,
    Warnings,
    Failure,
    Skipped,
    Cancelled,
    Exception,
    /// Never started because an upstream build did not succeed.
    NotStarted,
}

impl BuildResult {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildResult::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildResult::Success => "success",
            BuildResult::Warnings => "warnings",
            BuildResult::Failure => "failure",
            BuildResult::Skipped => "skipped",
            BuildResult::Cancelled => "cancelled",
            BuildResult::Exception => "exception",
            BuildResult::NotStarted => "not_started",
        }
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the executor reports back for one command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub result: BuildResult,
    pub exit_code: Option<i32>,
    pub log: String,
    pub duration_ms: u64,
}

impl StageOutcome {
    pub fn success() -> Self {
        Self {
            result: BuildResult::Success,
            exit_code: Some(0),
            log: String::new(),
            duration_ms: 0,
        }
    }

    pub fn failure(exit_code: i32, log: impl Into<String>) -> Self {
        Self {
            result: BuildResult::Failure,
            exit_code: Some(exit_code),
            log: log.into(),
            duration_ms: 0,
        }
    }
}
